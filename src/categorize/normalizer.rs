//! Category normalization
//!
//! Turns whatever a backend said ("Category: search engine optimisation.")
//! into one label. Stages run in a fixed order and the first one that
//! produces a label wins:
//!
//! 1. alias table (exact, then whole-word)
//! 2. fuzzy match of the answer against known labels
//! 3. fuzzy match of the directory name against known labels
//! 4. a new ad hoc label, while the category ceiling allows it

use once_cell::sync::Lazy;
use regex::Regex;
use similar::TextDiff;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::label::{title_case, CategoryLabel};
use super::vocabulary::{normalize_phrase, CategoryVocabulary};
use crate::error::{Result, SorterError};

/// Longest answer still accepted as an ad hoc label
const MAX_AD_HOC_CHARS: usize = 40;
const MAX_AD_HOC_WORDS: usize = 3;

/// Answers that mean "no idea" and must never become a folder
const NON_ANSWERS: &[&str] = &[
    "unknown",
    "none",
    "n a",
    "na",
    "null",
    "other",
    "misc",
    "not sure",
    "i don t know",
    "no category",
];

/// Leading "Category:" / "The category is" style preambles
///
/// The keyword must be a whole word followed by a separator or "is" / "would
/// be", so answers like "Labels" or "Category Management" pass through intact.
static PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:the\s+)?(?:best\s+)?(?:category|answer|label)\b\s*(?:(?:is|would\s+be)\b\s*[:\-=]?|[:\-=])\s*",
    )
    .expect("Invalid regex")
});

/// Maps backend answers onto category labels
pub struct CategoryNormalizer {
    vocabulary: Arc<CategoryVocabulary>,
    /// Labels assigned so far in this run (plus pre-existing folders), in order of first use
    created: Mutex<Vec<CategoryLabel>>,
    threshold: f32,
    max_total_categories: usize,
}

impl CategoryNormalizer {
    pub fn new(vocabulary: Arc<CategoryVocabulary>, threshold: f32, max_total_categories: usize) -> Self {
        Self {
            vocabulary,
            created: Mutex::new(Vec::new()),
            threshold: threshold.clamp(0.0, 1.0),
            max_total_categories,
        }
    }

    pub fn vocabulary(&self) -> &CategoryVocabulary {
        &self.vocabulary
    }

    /// Derive a label from a backend answer, or `None` if nothing fits
    pub fn normalize(&self, raw_text: &str, original_name: &str) -> Option<CategoryLabel> {
        let cleaned = clean_answer(raw_text)?;

        if let Some(label) = self.vocabulary.match_alias(&cleaned) {
            return Some(label.clone());
        }

        let candidates = self.candidates();

        if let Some(label) = best_fuzzy_match(&cleaned, &candidates, self.threshold) {
            debug!(answer = %cleaned, label = %label, "Fuzzy matched answer");
            return Some(label);
        }

        let name_phrase = normalize_phrase(original_name);
        if let Some(label) = best_fuzzy_match(&name_phrase, &candidates, self.threshold) {
            debug!(item = %original_name, label = %label, "Fuzzy matched directory name");
            return Some(label);
        }

        self.create_ad_hoc(&cleaned)
    }

    /// Record a label as used in this run
    pub fn register(&self, label: &CategoryLabel) {
        let mut created = self.lock_created();
        if !created.iter().any(|l| l.key() == label.key()) {
            created.push(label.clone());
        }
    }

    /// Register every category folder already present under `dest_dir`
    ///
    /// Returns how many folders were found. A missing directory counts as empty.
    pub fn seed_existing(&self, dest_dir: &Path) -> Result<usize> {
        if !dest_dir.exists() {
            return Ok(0);
        }

        let entries = fs::read_dir(dest_dir).map_err(|e| SorterError::io(dest_dir, e))?;
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();

        let mut seeded = 0;
        for name in names {
            if let Some(label) = CategoryLabel::new(&name) {
                self.register(&label);
                seeded += 1;
            }
        }
        Ok(seeded)
    }

    /// Number of distinct labels used so far
    pub fn distinct_count(&self) -> usize {
        self.lock_created().len()
    }

    pub fn created_labels(&self) -> Vec<CategoryLabel> {
        self.lock_created().clone()
    }

    /// Created labels first, then canonical ones not already listed
    fn candidates(&self) -> Vec<CategoryLabel> {
        let mut candidates = self.created_labels();
        for label in self.vocabulary.labels() {
            if !candidates.iter().any(|c| c.key() == label.key()) {
                candidates.push(label.clone());
            }
        }
        candidates
    }

    fn create_ad_hoc(&self, cleaned: &str) -> Option<CategoryLabel> {
        let phrase = normalize_phrase(cleaned);
        if phrase.is_empty()
            || NON_ANSWERS.contains(&phrase.as_str())
            || cleaned.chars().count() > MAX_AD_HOC_CHARS
            || cleaned.split_whitespace().count() > MAX_AD_HOC_WORDS
            || !cleaned.chars().any(char::is_alphabetic)
        {
            return None;
        }

        let label = CategoryLabel::new(&title_case(cleaned))?;

        // Check and insert under one lock so concurrent workers cannot overshoot the ceiling
        let mut created = self.lock_created();
        if let Some(existing) = created.iter().find(|l| l.key() == label.key()) {
            return Some(existing.clone());
        }
        if created.len() >= self.max_total_categories {
            debug!(answer = %cleaned, limit = self.max_total_categories, "Category ceiling reached");
            return None;
        }
        created.push(label.clone());
        debug!(label = %label, "Created ad hoc category");
        Some(label)
    }

    fn lock_created(&self) -> MutexGuard<'_, Vec<CategoryLabel>> {
        self.created.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Strip preambles, quotes and trailing punctuation; keep the first line only
fn clean_answer(raw_text: &str) -> Option<String> {
    let first_line = raw_text.lines().map(str::trim).find(|line| !line.is_empty())?;
    let without_prefix = PREFIX_RE.replace(first_line, "");
    let trimmed = without_prefix
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Similarity ratio in [0, 1]: 2 * matches / total length, over characters
fn similarity(a: &str, b: &str) -> f32 {
    TextDiff::from_chars(a, b).ratio()
}

/// Highest scoring candidate at or above `threshold`; earliest wins ties
fn best_fuzzy_match(text: &str, candidates: &[CategoryLabel], threshold: f32) -> Option<CategoryLabel> {
    if text.is_empty() {
        return None;
    }

    let mut best: Option<(f32, &CategoryLabel)> = None;
    for candidate in candidates {
        let score = similarity(text, &candidate.key());
        if score < threshold {
            continue;
        }
        match best {
            Some((best_score, _)) if score <= best_score => {}
            _ => best = Some((score, candidate)),
        }
    }
    best.map(|(_, label)| label.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn normalizer() -> CategoryNormalizer {
        CategoryNormalizer::new(Arc::new(CategoryVocabulary::builtin()), 0.6, 50)
    }

    fn norm(n: &CategoryNormalizer, raw: &str, name: &str) -> Option<String> {
        n.normalize(raw, name).map(|l| l.to_string())
    }

    #[test]
    fn test_clean_answer_strips_preamble() {
        assert_eq!(clean_answer("Category: Security.").as_deref(), Some("security"));
        assert_eq!(clean_answer("  \"SEO\"\n\nbecause...").as_deref(), Some("seo"));
        assert_eq!(clean_answer("The category is - Forms").as_deref(), Some("forms"));
        assert_eq!(clean_answer("Answer = Backup").as_deref(), Some("backup"));
        assert_eq!(clean_answer("The best category would be Media").as_deref(), Some("media"));
        assert_eq!(clean_answer("   "), None);
        assert_eq!(clean_answer("..."), None);
    }

    #[test]
    fn test_clean_answer_keeps_words_starting_with_keywords() {
        assert_eq!(clean_answer("Labels").as_deref(), Some("labels"));
        assert_eq!(clean_answer("Answers").as_deref(), Some("answers"));
        assert_eq!(clean_answer("Category Management").as_deref(), Some("category management"));
        assert_eq!(clean_answer("Categoryless").as_deref(), Some("categoryless"));
        assert_eq!(clean_answer("Category isolation").as_deref(), Some("category isolation"));
    }

    #[test]
    fn test_keyword_led_answers_are_not_truncated() {
        let n = normalizer();
        assert_eq!(norm(&n, "Category Management", "taxonomy-order").as_deref(), Some("Content Management"));
        assert_eq!(norm(&n, "Labels", "x").as_deref(), Some("Labels"));
    }

    #[test]
    fn test_alias_stage_wins_first() {
        let n = normalizer();
        assert_eq!(norm(&n, "SEO", "seo-master").as_deref(), Some("SEO"));
        assert_eq!(norm(&n, "Category: caching", "x").as_deref(), Some("Performance"));
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let n = normalizer();
        let first = norm(&n, "Search Engine Optimization tool", "anything");
        let second = norm(&n, "Search Engine Optimization tool", "anything");
        assert_eq!(first.as_deref(), Some("SEO"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_fuzzy_match_on_typo() {
        let n = normalizer();
        // No alias contains this misspelling
        assert_eq!(norm(&n, "Securty", "x").as_deref(), Some("Security"));
    }

    #[test]
    fn test_fuzzy_prefers_created_labels() {
        let n = normalizer();
        n.register(&CategoryLabel::new("Crypto Wallets").unwrap());
        assert_eq!(norm(&n, "crypto wallet", "x").as_deref(), Some("Crypto Wallets"));
    }

    #[test]
    fn test_ad_hoc_label_is_title_cased_and_reused() {
        let n = normalizer();
        assert_eq!(norm(&n, "quantum widgetry", "x").as_deref(), Some("Quantum Widgetry"));
        assert_eq!(n.distinct_count(), 1);
        assert_eq!(norm(&n, "Quantum Widgetry", "x").as_deref(), Some("Quantum Widgetry"));
        assert_eq!(n.distinct_count(), 1);
    }

    #[test]
    fn test_ad_hoc_rejects_long_and_non_answers() {
        let n = normalizer();
        assert_eq!(norm(&n, "this plugin does many different things", "x"), None);
        assert_eq!(norm(&n, "Unknown", "x"), None);
        assert_eq!(norm(&n, "12345", "x"), None);
        assert_eq!(norm(&n, "", "x"), None);
    }

    #[test]
    fn test_ad_hoc_respects_category_ceiling() {
        let n = CategoryNormalizer::new(Arc::new(CategoryVocabulary::builtin()), 0.6, 1);
        assert_eq!(norm(&n, "quantum", "x").as_deref(), Some("Quantum"));
        assert_eq!(norm(&n, "zebra", "x"), None);
        // Alias matches are not subject to the ceiling
        assert_eq!(norm(&n, "security", "x").as_deref(), Some("Security"));
    }

    #[test]
    fn test_seed_existing_registers_folders() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("Security")).unwrap();
        fs::create_dir(dir.path().join("Odd Stuff")).unwrap();
        fs::create_dir(dir.path().join(".hidden")).unwrap();
        fs::write(dir.path().join("file.txt"), "x").unwrap();

        let n = normalizer();
        assert_eq!(n.seed_existing(dir.path()).unwrap(), 2);
        let labels: Vec<String> = n.created_labels().iter().map(|l| l.to_string()).collect();
        assert_eq!(labels, vec!["Odd Stuff".to_string(), "Security".to_string()]);

        assert_eq!(n.seed_existing(&dir.path().join("missing")).unwrap(), 0);
    }

    #[test]
    fn test_best_fuzzy_match_threshold() {
        let candidates = vec![CategoryLabel::new("Forms").unwrap()];
        assert!(best_fuzzy_match("form", &candidates, 0.6).is_some());
        assert!(best_fuzzy_match("zzzz", &candidates, 0.6).is_none());
        assert!(best_fuzzy_match("", &candidates, 0.0).is_none());
    }
}
