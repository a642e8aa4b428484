//! Command-line interface for content-forge.
//!
//! Provides commands for running tasks and the content chain, and for
//! inspecting the artifact store and schema registry.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
