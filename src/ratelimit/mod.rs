//! Rate Limit Module
//!
//! Paces outbound calls to a rate-limited upstream.

mod limiter;

pub use limiter::{LimiterSnapshot, RateLimiter};
