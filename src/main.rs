//! tagweave - inspect tags, stream facts and chapters of media files.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use tagweave::cli;

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging; RUST_LOG wins over -v
    let default_level = if args.verbose { "tagweave=debug" } else { "tagweave=info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    cli::run_command(&args)
}
