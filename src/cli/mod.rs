//! Command-line interface for docker-runonce.
//!
//! Parses flags, handles the image-named-symlink invocation, and maps the
//! run outcome to an exit code.

mod commands;
pub mod exit;

pub use commands::{
    implied_image, parse_cli, run_with_cli, try_parse_cli_from, Cli, DEFAULT_BINARY_NAME,
};
pub use exit::{classify, ExitDisposition};
