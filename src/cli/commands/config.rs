//! Configuration file commands.

use std::path::Path;

use crate::config::{self, Config};

/// Write the default configuration to `path` or the default location
pub fn cmd_init_config(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let target = match path {
        Some(p) => p.to_path_buf(),
        None => config::config_path().ok_or(config::ConfigError::NoConfigDir)?,
    };

    if target.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", target.display());
    }

    config::save_to(&Config::default(), &target)?;
    println!("Wrote default configuration to {}", target.display());
    Ok(())
}
