//! Connection Pool Module
//!
//! Bounded pool of expensive handles (database connections) with validity
//! checks on reuse and reclamation of checkouts that were never returned.

mod bounded;
mod connection;
mod manager;

pub use bounded::{ConnectionPool, PoolStatus};
pub use connection::PooledConnection;
pub use manager::ConnectionManager;
