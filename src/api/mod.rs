//! API Module
//!
//! Admin HTTP surface of the bot process.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Cache, limiter and session statistics
//! - `DELETE /cache/:key` - Invalidate a memoized upstream response

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
