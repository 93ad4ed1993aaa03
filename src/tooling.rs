//! Tooling Layer
//!
//! Command-line surface over the trace model and text formatting of its
//! query results.

pub mod cli;
pub mod format;

pub use cli::{Cli, CliContext, Commands};
