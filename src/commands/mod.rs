//! Command handlers behind the CLI subcommands

pub mod categories;
pub mod providers;
pub mod run;
pub mod settings;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Settings;

/// Settings file on disk, then `PLUGSORT_*` overrides
pub fn load_settings(config: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::load_or_default(config)?;
    settings.apply_env()?;
    Ok(settings)
}

/// `--config`, or the platform default
pub fn settings_path(config: Option<&Path>) -> Result<PathBuf> {
    config
        .map(Path::to_path_buf)
        .or_else(Settings::default_path)
        .context("No config directory on this platform; pass --config")
}
