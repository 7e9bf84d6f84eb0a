use anyhow::{bail, Result};
use std::path::Path;

use crate::cli::SettingsAction;
use crate::config::Settings;

/// `plugsort settings ...`
pub fn run(config: Option<&Path>, action: SettingsAction) -> Result<()> {
    let path = super::settings_path(config)?;

    match action {
        SettingsAction::Show => {
            let settings = super::load_settings(config)?;
            println!("# {}", path.display());
            println!("{}", serde_json::to_string_pretty(&settings.redacted())?);
        }
        SettingsAction::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Settings::default().save(&path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
