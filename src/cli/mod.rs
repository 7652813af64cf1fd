//! Command-line interface for catalog-fusion.
//!
//! This module provides CLI commands for searching the fused catalog,
//! fetching recommendations and managing provider routing.

mod commands;

pub use commands::{Cli, Commands, run_command};
