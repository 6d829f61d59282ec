//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Expiry sweep: drops expired entries on a fixed interval, without
//!   counting them as removals

mod cleanup;

pub use cleanup::spawn_cleanup_task;
