//! Background Tasks Module
//!
//! Periodic maintenance for every component runs on one shared [`Scheduler`].
//!
//! # Jobs
//! - Cache sweep: removes entries older than the cache's hold time
//! - Pool reclamation: closes connections checked out for too long
//! - Session reaping: destroys handlers idle past their max live time

mod scheduler;

pub(crate) use scheduler::panic_message;
pub use scheduler::{PeriodicTask, Scheduler};
