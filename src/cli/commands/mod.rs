//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `inspect`: tags, stream facts and chapters of one file
//! - `scan`: parallel probing of a directory tree
//! - `config`: writing the default configuration file

mod config;
mod inspect;
mod scan;

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use crate::reader::MediaReader;

pub use config::cmd_init_config;
pub use inspect::{cmd_chapters, cmd_codec, cmd_tags};
pub use scan::cmd_scan;

/// tagweave CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file to use instead of the default location
    #[arg(long, global = true, env = "TAGWEAVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Show the normalized tag of a file
    Tags {
        /// Path to the media file
        path: PathBuf,
    },
    /// Show codec and stream facts of a file
    Codec {
        /// Path to the media file
        path: PathBuf,
    },
    /// List the chapter items of a multi-chapter file
    Chapters {
        /// Path to the media file
        path: PathBuf,
    },
    /// Probe every media file in a directory
    Scan {
        /// Path to the directory to scan
        path: PathBuf,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },
    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the parsed command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    if let Commands::InitConfig { force } = &cli.command {
        return cmd_init_config(cli.config.as_deref(), *force);
    }

    let config = match &cli.config {
        Some(path) => crate::config::load_from(path),
        None => crate::config::load(),
    };
    let reader = MediaReader::new(config);

    match &cli.command {
        Commands::Tags { path } => cmd_tags(&reader, path, cli.json),
        Commands::Codec { path } => cmd_codec(&reader, path, cli.json),
        Commands::Chapters { path } => cmd_chapters(&reader, path, cli.json),
        Commands::Scan { path, recursive } => cmd_scan(&reader, path, *recursive, cli.json),
        Commands::InitConfig { .. } => Ok(()),
    }
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
