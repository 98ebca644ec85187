//! Retry with bounded exponential backoff
//!
//! [`RetryPolicy`] computes delays; [`RetryExecutor`] runs the loop, suspending
//! the calling task between attempts without blocking other runs.

mod executor;
mod policy;

pub use executor::{AttemptBudget, RetryError, RetryExecutor};
pub use policy::{PolicyError, RetryPolicy};
