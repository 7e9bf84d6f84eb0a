//! Name → category cache
//!
//! Remembers which label each directory name received so a rerun over the
//! same plugins costs no API calls. Persisted as a flat JSON object.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::label::CategoryLabel;
use crate::error::{Result, SorterError};

#[derive(Debug, Default)]
pub struct CategoryCache {
    entries: DashMap<String, CategoryLabel>,
}

impl CategoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a cache file; a missing file yields an empty cache
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path).map_err(|e| SorterError::io(path, e))?;
        let map: BTreeMap<String, CategoryLabel> =
            serde_json::from_str(&content).map_err(|e| SorterError::json(path, e))?;

        let entries = DashMap::new();
        for (name, label) in map {
            entries.insert(cache_key(&name), label);
        }
        Ok(Self { entries })
    }

    /// Write the cache as pretty JSON with sorted keys
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SorterError::io(parent, e))?;
        }
        let map: BTreeMap<String, CategoryLabel> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let json = serde_json::to_string_pretty(&map).map_err(|e| SorterError::json(path, e))?;
        fs::write(path, json).map_err(|e| SorterError::io(path, e))
    }

    pub fn get(&self, name: &str) -> Option<CategoryLabel> {
        self.entries.get(&cache_key(name)).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, name: &str, label: CategoryLabel) {
        self.entries.insert(cache_key(name), label);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn cache_key(name: &str) -> String {
    name.trim().to_lowercase()
}
