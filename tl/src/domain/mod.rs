//! Domain types shared across the pipeline and the conversation store
//!
//! A conversation is an ordered list of [`Turn`]s. The pipeline reads prior
//! turns as read-only history; the store persists them between runs.

mod turn;

pub use turn::{Role, Turn};
