//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside foreground
//! cache traffic.
//!
//! # Tasks
//! - TTL Sweep: Removes expired cache entries at configured intervals

mod cleanup;

pub use cleanup::spawn_cleanup_task;
