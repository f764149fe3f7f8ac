//! Response models for the admin API
//!
//! Serializable bodies returned by the admin HTTP endpoints.

pub mod responses;

pub use responses::{
    CacheStatsResponse, ErrorResponse, HealthResponse, InvalidateResponse, SessionCounts,
    StatsResponse,
};
