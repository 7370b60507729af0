//! docker-runonce: run a container image once, as if it were a local command.
//!
//! The container gets the caller's stdio, a wall-clock timeout and a memory
//! ceiling, and is always removed when the run ends.

pub mod cli;
pub mod error;
pub mod execution;
pub mod options;
pub mod units;

pub use error::RunError;
pub use options::{RunConfig, RunDefaults};
