//! botkit - concurrency and lifecycle plumbing for a chat bot
//!
//! Timed caches for upstream responses, per-upstream rate limiting, a bounded
//! connection pool, keyed session registries with idle reaping, and paged
//! messages, all driven by one shared background scheduler.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod paging;
pub mod pool;
pub mod ratelimit;
pub mod session;
pub mod tasks;
pub mod upstream;

pub use api::AppState;
pub use config::Config;
pub use tasks::Scheduler;
pub use upstream::GuardedUpstream;
