//! Settings
//!
//! Layering, lowest to highest precedence:
//!
//! 1. built-in defaults
//! 2. `settings.json` in the platform config directory (or `--config`)
//! 3. `PLUGSORT_*` environment variables
//! 4. command-line flags (applied by the command handlers)
//!
//! API keys never live in source; see [`crate::ai::credentials`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ai::credentials::mask_key;
use crate::ai::providers::ProviderId;
use crate::categorize::CategoryLabel;
use crate::error::{Result, SorterError};
use crate::mover::ConflictPolicy;

const APP_DIR: &str = "plugsort";
const SETTINGS_FILE: &str = "settings.json";
const CACHE_FILE: &str = "categories_cache.json";
const VOCABULARY_FILE: &str = "categories.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per provider call, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source_dir: Option<PathBuf>,
    pub dest_dir: Option<PathBuf>,
    /// Provider ids in priority order
    pub providers_enabled: Vec<String>,
    /// Per-provider budget; Gemini slots fall back to the `gemini` entry
    pub requests_per_minute: BTreeMap<String, u32>,
    /// Concurrent workers
    pub batch_size: usize,
    /// Ceiling on distinct categories, bounds ad hoc label creation
    pub max_total_categories: usize,
    /// Fuzzy-match cutoff in [0, 1]
    pub confidence_threshold: f32,
    pub default_category: String,
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
    pub conflict_policy: ConflictPolicy,
    pub use_cache: bool,
    pub cache_file: Option<PathBuf>,
    pub vocabulary_file: Option<PathBuf>,
    /// Fallback keys by provider id; environment variables take precedence
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub api_keys: HashMap<String, String>,
    /// Model overrides by provider id
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub models: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        let requests_per_minute = [
            ProviderId::Anthropic,
            ProviderId::OpenAi,
            ProviderId::Gemini(1),
            ProviderId::Cohere,
            ProviderId::DuckDuckGo,
        ]
        .into_iter()
        .map(|id| (id.to_string(), id.default_rpm()))
        .collect();

        Self {
            source_dir: None,
            dest_dir: None,
            providers_enabled: vec![
                "anthropic".to_string(),
                "openai".to_string(),
                "gemini".to_string(),
                "cohere".to_string(),
                "duckduckgo".to_string(),
            ],
            requests_per_minute,
            batch_size: 5,
            max_total_categories: 50,
            confidence_threshold: 0.6,
            default_category: "Uncategorized".to_string(),
            request_timeout_secs: 10,
            retry: RetrySettings::default(),
            conflict_policy: ConflictPolicy::AutoRename,
            use_cache: true,
            cache_file: None,
            vocabulary_file: None,
            api_keys: HashMap::new(),
            models: HashMap::new(),
        }
    }
}

impl Settings {
    /// `<config_dir>/plugsort`
    pub fn app_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR))
    }

    /// Get the path to the settings file
    pub fn default_path() -> Option<PathBuf> {
        Self::app_dir().map(|dir| dir.join(SETTINGS_FILE))
    }

    /// Load settings; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path).map_err(|e| SorterError::io(path, e))?;
        serde_json::from_str(&json).map_err(|e| SorterError::json(path, e))
    }

    /// Load from `path`, or from the default location when `None`
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SorterError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| SorterError::json(path, e))?;
        fs::write(path, json).map_err(|e| SorterError::io(path, e))
    }

    /// Apply `PLUGSORT_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(dir) = non_empty("PLUGSORT_SOURCE_DIR") {
            self.source_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = non_empty("PLUGSORT_DEST_DIR") {
            self.dest_dir = Some(PathBuf::from(dir));
        }
        if let Some(size) = non_empty("PLUGSORT_BATCH_SIZE") {
            self.batch_size = size.trim().parse().map_err(|_| {
                SorterError::InvalidConfig(format!("PLUGSORT_BATCH_SIZE is not a number: {:?}", size))
            })?;
        }
        if let Some(list) = non_empty("PLUGSORT_PROVIDERS") {
            self.providers_enabled = parse_provider_list(&list);
        }
        if let Some(category) = non_empty("PLUGSORT_DEFAULT_CATEGORY") {
            self.default_category = category;
        }
        Ok(())
    }

    /// Reject settings that would make a run misbehave
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SorterError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(SorterError::InvalidConfig(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(SorterError::InvalidConfig("request_timeout_secs must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SorterError::InvalidConfig("retry.max_attempts must be at least 1".into()));
        }
        self.default_label()?;

        let mut seen: Vec<ProviderId> = Vec::with_capacity(self.providers_enabled.len());
        for raw in &self.providers_enabled {
            let id = raw.parse::<ProviderId>()?;
            if seen.contains(&id) {
                return Err(SorterError::InvalidConfig(format!(
                    "provider {} is enabled more than once (as {:?})",
                    id, raw
                )));
            }
            seen.push(id);
        }
        for (id, rpm) in &self.requests_per_minute {
            id.parse::<ProviderId>()?;
            if *rpm == 0 {
                return Err(SorterError::InvalidConfig(format!(
                    "requests_per_minute for {} must be positive",
                    id
                )));
            }
        }
        Ok(())
    }

    pub fn default_label(&self) -> Result<CategoryLabel> {
        CategoryLabel::new(&self.default_category)
            .ok_or_else(|| SorterError::InvalidConfig("default_category is empty".into()))
    }

    /// Effective requests-per-minute budget for a provider
    pub fn rate_limit_for(&self, id: ProviderId) -> u32 {
        self.requests_per_minute
            .get(&id.to_string())
            .or_else(|| self.requests_per_minute.get(id.model_key()))
            .copied()
            .unwrap_or_else(|| id.default_rpm())
    }

    pub fn source_dir(&self) -> Result<&Path> {
        self.source_dir
            .as_deref()
            .ok_or(SorterError::MissingSetting("source_dir"))
    }

    pub fn dest_dir(&self) -> Result<&Path> {
        self.dest_dir
            .as_deref()
            .ok_or(SorterError::MissingSetting("dest_dir"))
    }

    /// Cache file, defaulting to the config directory
    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache_file
            .clone()
            .or_else(|| Self::app_dir().map(|dir| dir.join(CACHE_FILE)))
    }

    /// Vocabulary file, defaulting to the config directory
    pub fn vocabulary_path(&self) -> Option<PathBuf> {
        self.vocabulary_file
            .clone()
            .or_else(|| Self::app_dir().map(|dir| dir.join(VOCABULARY_FILE)))
    }

    /// Copy with API keys masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for key in copy.api_keys.values_mut() {
            *key = mask_key(key);
        }
        copy
    }
}

/// Split a comma separated provider list, dropping blanks
pub fn parse_provider_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|id| id.trim().to_lowercase())
        .filter(|id| !id.is_empty())
        .collect()
}
