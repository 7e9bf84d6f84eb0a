//! Provider fallback chain
//!
//! Resolution order for one name:
//!
//! 1. cache hit (when a cache is attached)
//! 2. providers in priority order, first normalizable answer wins
//! 3. keyword match of the name against the alias table
//! 4. the configured default category
//!
//! Every call returns a label. Each provider is tried at most once per call;
//! retries for transient errors happen inside the provider. A provider that
//! fails authentication is disabled for the rest of the run.

use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cache::CategoryCache;
use super::label::CategoryLabel;
use super::normalizer::CategoryNormalizer;
use crate::ai::providers::{truncate_name, CategoryProvider, FailureKind};

/// Where a label came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategorySource {
    Cache,
    Provider(String),
    Keyword,
    Default,
}

impl fmt::Display for CategorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategorySource::Cache => f.write_str("cache"),
            CategorySource::Provider(id) => f.write_str(id),
            CategorySource::Keyword => f.write_str("keyword"),
            CategorySource::Default => f.write_str("default"),
        }
    }
}

/// What happened when one provider was asked
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptResult {
    /// Answer normalized to a label
    Labeled(CategoryLabel),
    /// Answer received but nothing could be derived from it
    Unmatched(String),
    Failed(FailureKind),
}

#[derive(Debug, Clone)]
pub struct ProviderAttempt {
    pub provider_id: String,
    pub result: AttemptResult,
}

/// Final answer for one name
#[derive(Debug, Clone)]
pub struct Categorization {
    pub label: CategoryLabel,
    pub source: CategorySource,
    /// Providers asked, in order
    pub attempts: Vec<ProviderAttempt>,
}

impl Categorization {
    pub fn is_default(&self) -> bool {
        self.source == CategorySource::Default
    }
}

/// Counters for one provider over a run
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    /// Answers that could not be normalized
    pub misses: u64,
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatsEntry {
    pub provider_id: String,
    #[serde(flatten)]
    pub stats: ProviderStats,
}

pub struct ProviderChain {
    providers: Vec<Arc<dyn CategoryProvider>>,
    normalizer: Arc<CategoryNormalizer>,
    default_category: CategoryLabel,
    cache: Option<Arc<CategoryCache>>,
    /// Providers unusable for the rest of the run, with the reason
    disabled: DashMap<String, String>,
    stats: DashMap<String, ProviderStats>,
}

impl ProviderChain {
    pub fn new(
        providers: Vec<Arc<dyn CategoryProvider>>,
        normalizer: Arc<CategoryNormalizer>,
        default_category: CategoryLabel,
    ) -> Self {
        Self {
            providers,
            normalizer,
            default_category,
            cache: None,
            disabled: DashMap::new(),
            stats: DashMap::new(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<CategoryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&Arc<CategoryCache>> {
        self.cache.as_ref()
    }

    pub fn normalizer(&self) -> &CategoryNormalizer {
        &self.normalizer
    }

    pub fn default_category(&self) -> &CategoryLabel {
        &self.default_category
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_string()).collect()
    }

    pub fn is_disabled(&self, provider_id: &str) -> bool {
        self.disabled.contains_key(provider_id)
    }

    /// Resolve a label for `name`; never fails
    pub async fn categorize_with_fallback(&self, name: &str) -> Categorization {
        let name = truncate_name(name);

        if let Some(label) = self.cache.as_ref().and_then(|cache| cache.get(name)) {
            debug!(item = %name, label = %label, "Cache hit");
            return self.finish(label, CategorySource::Cache, Vec::new());
        }

        let mut attempts = Vec::new();
        for provider in &self.providers {
            let id = provider.id();
            if self.is_disabled(id) {
                continue;
            }

            debug!(provider = %id, item = %name, "Asking provider");
            self.stats.entry(id.to_string()).or_default().attempts += 1;

            match provider.categorize(name).await {
                Ok(mut result) => match self.normalizer.normalize(&result.raw_text, name) {
                    Some(label) => {
                        self.stats.entry(id.to_string()).or_default().successes += 1;
                        result.normalized_label = Some(label.clone());
                        debug!(
                            provider = %id,
                            item = %name,
                            raw = %result.raw_text,
                            label = %label,
                            confidence = result.confidence,
                            "Provider answered"
                        );
                        attempts.push(ProviderAttempt {
                            provider_id: id.to_string(),
                            result: AttemptResult::Labeled(label.clone()),
                        });
                        if let Some(cache) = &self.cache {
                            cache.insert(name, label.clone());
                        }
                        return self.finish(label, CategorySource::Provider(id.to_string()), attempts);
                    }
                    None => {
                        self.stats.entry(id.to_string()).or_default().misses += 1;
                        info!(provider = %id, item = %name, raw = %result.raw_text, "Normalization miss");
                        attempts.push(ProviderAttempt {
                            provider_id: id.to_string(),
                            result: AttemptResult::Unmatched(result.raw_text),
                        });
                    }
                },
                Err(failure) => {
                    self.stats.entry(id.to_string()).or_default().failures += 1;
                    warn!(provider = %id, item = %name, kind = %failure.kind, error = %failure.message, "Provider failed");
                    if failure.kind.is_permanent() {
                        self.disable(id, &failure.message);
                    }
                    attempts.push(ProviderAttempt {
                        provider_id: id.to_string(),
                        result: AttemptResult::Failed(failure.kind),
                    });
                }
            }
        }

        if let Some(label) = self.normalizer.vocabulary().match_alias(name).cloned() {
            info!(item = %name, label = %label, "Keyword fallback");
            return self.finish(label, CategorySource::Keyword, attempts);
        }

        warn!(
            item = %name,
            label = %self.default_category,
            attempted = attempts.len(),
            "Exhausted fallback chain, using default category"
        );
        self.finish(self.default_category.clone(), CategorySource::Default, attempts)
    }

    /// Per-provider counters in chain order
    pub fn provider_stats(&self) -> Vec<ProviderStatsEntry> {
        self.providers
            .iter()
            .map(|provider| {
                let id = provider.id();
                let mut stats = self.stats.get(id).map(|s| s.value().clone()).unwrap_or_default();
                stats.disabled = self.is_disabled(id);
                ProviderStatsEntry {
                    provider_id: id.to_string(),
                    stats,
                }
            })
            .collect()
    }

    fn disable(&self, provider_id: &str, reason: &str) {
        if self.disabled.insert(provider_id.to_string(), reason.to_string()).is_none() {
            warn!(provider = %provider_id, reason = %reason, "Provider disabled for the rest of the run");
        }
    }

    fn finish(&self, label: CategoryLabel, source: CategorySource, attempts: Vec<ProviderAttempt>) -> Categorization {
        self.normalizer.register(&label);
        Categorization {
            label,
            source,
            attempts,
        }
    }
}
