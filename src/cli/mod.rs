//! Command-line interface for tagweave.
//!
//! This module provides commands for printing the normalized tags, stream
//! facts and chapter items of media files, and for scanning directories.

mod commands;

pub use commands::{Cli, Commands, run_command};
