use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::categorize::CategoryVocabulary;
use crate::cli::CategoryAction;
use crate::config::Settings;

/// `plugsort categories ...`
pub fn run(config: Option<&Path>, action: CategoryAction) -> Result<()> {
    let settings = super::load_settings(config)?;
    let path = vocabulary_path(&settings)?;
    let mut vocabulary = CategoryVocabulary::load(&path)?;

    match action {
        CategoryAction::List => {
            for def in vocabulary.categories() {
                if def.aliases.is_empty() {
                    println!("{}", def.label);
                } else {
                    println!("{:<20} {}", def.label.as_str(), def.aliases.join(", "));
                }
            }
            println!("{} categories ({})", vocabulary.len(), path.display());
        }
        CategoryAction::Add { label, aliases } => {
            let added = vocabulary.add(&label, aliases)?.label.clone();
            vocabulary.save(&path)?;
            println!("Added {}", added);
        }
        CategoryAction::Remove { label } => {
            let removed = vocabulary.remove(&label)?;
            vocabulary.save(&path)?;
            println!("Removed {}", removed.label);
        }
    }
    Ok(())
}

fn vocabulary_path(settings: &Settings) -> Result<PathBuf> {
    settings
        .vocabulary_path()
        .context("No config directory on this platform; set vocabulary_file in settings")
}
