//! TSCH schedule support.
//!
//! - [`MemorySchedule`]: an in-memory [`Schedule`](crate::core::Schedule)
//!   for hosts, simulations, and tests
//! - [`ScheduleLock`]: the non-blocking lock shared with the slot engine

mod lock;
mod memory;

pub use lock::{ScheduleLock, ScheduleLockGuard};
pub use memory::MemorySchedule;
