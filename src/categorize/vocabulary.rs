//! Category vocabulary
//!
//! The closed set of canonical labels plus the alias keywords that map onto
//! them. Matching walks the table in declaration order, so the first entry
//! that matches wins and results never depend on hash ordering.
//!
//! The vocabulary is loaded once per run and shared read-only. Users extend or
//! shrink it between runs (`plugsort categories add/remove`), which rewrites
//! the JSON file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::label::CategoryLabel;
use crate::error::{Result, SorterError};

/// Built-in table: (label, aliases). More specific entries come first.
const BUILTIN_CATEGORIES: &[(&str, &[&str])] = &[
    ("SEO", &["seo", "search engine", "search engine optimization", "sitemap", "meta tags", "keywords", "yoast"]),
    ("E-commerce", &["ecommerce", "e commerce", "woocommerce", "woo commerce", "woo", "shop", "store", "cart", "checkout", "products"]),
    ("Payment", &["payment", "payments", "gateway", "stripe", "paypal", "invoice", "invoices"]),
    ("Security", &["security", "firewall", "malware", "antispam", "anti spam", "spam", "captcha", "2fa", "two factor"]),
    ("Performance", &["performance", "optimization", "optimize", "cache", "caching", "speed", "minify", "lazy load", "compress"]),
    ("Backup", &["backup", "backups", "restore", "migration", "migrate", "clone", "duplicator"]),
    ("Social Media", &["social media", "socialmedia", "social", "share", "sharing", "facebook", "twitter", "instagram"]),
    ("Analytics", &["analytics", "statistics", "stats", "tracking", "metrics"]),
    ("Forms", &["form", "forms", "contact form", "survey", "contact"]),
    ("Email", &["email", "mail", "smtp", "newsletter", "mailing list", "mailchimp"]),
    ("Marketing", &["marketing", "advertising", "ads", "popup", "lead", "leads", "affiliate"]),
    ("Media", &["media", "gallery", "image", "images", "photo", "photos", "video", "audio", "slider", "carousel"]),
    ("Membership", &["membership", "memberships", "subscription", "subscriptions", "paywall"]),
    ("User Management", &["user management", "users", "user", "login", "registration", "profile", "roles", "authentication"]),
    ("Content Management", &["content management", "category management", "taxonomy", "cms", "content", "blog", "posts", "custom post", "editor"]),
    ("Customization", &["customization", "customize", "theme", "themes", "page builder", "layout", "design"]),
    ("Widgets", &["widget", "widgets", "sidebar"]),
    ("Translation", &["translation", "translate", "multilingual", "localization", "i18n", "language"]),
    ("Events", &["events", "event", "calendar", "booking", "appointment", "reservation"]),
    ("Accessibility", &["accessibility", "a11y", "wcag", "aria"]),
    ("Compliance", &["gdpr", "privacy", "cookie", "cookies", "consent", "compliance"]),
    ("Development Tools", &["development", "developer", "debug", "debugging", "code", "api", "devtools"]),
    ("Administration", &["admin", "dashboard", "management"]),
    ("Support", &["support", "help desk", "helpdesk", "ticket", "live chat", "chat"]),
];

/// One canonical category and its alias keywords
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDef {
    pub label: CategoryLabel,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl CategoryDef {
    /// Does the normalized phrase equal the label or one of the aliases?
    fn matches_exactly(&self, phrase: &str) -> bool {
        normalize_phrase(self.label.as_str()) == phrase
            || self.aliases.iter().any(|a| normalize_phrase(a) == phrase)
    }

    /// Does the label or an alias occur as whole words inside the phrase?
    fn matches_within(&self, padded_phrase: &str) -> bool {
        std::iter::once(self.label.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .map(normalize_phrase)
            .filter(|alias| !alias.is_empty())
            .any(|alias| padded_phrase.contains(&format!(" {} ", alias)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VocabularyFile {
    categories: Vec<CategoryDef>,
}

/// Ordered set of canonical categories
#[derive(Debug, Clone)]
pub struct CategoryVocabulary {
    categories: Vec<CategoryDef>,
}

impl CategoryVocabulary {
    /// The built-in plugin vocabulary
    pub fn builtin() -> Self {
        let categories = BUILTIN_CATEGORIES
            .iter()
            .filter_map(|(label, aliases)| {
                CategoryLabel::new(label).map(|label| CategoryDef {
                    label,
                    aliases: aliases.iter().map(|a| a.to_string()).collect(),
                })
            })
            .collect();
        Self { categories }
    }

    pub fn from_defs(categories: Vec<CategoryDef>) -> Self {
        Self { categories }
    }

    /// Load from a JSON file; a missing file yields the built-in vocabulary
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::builtin());
        }
        let content = fs::read_to_string(path).map_err(|e| SorterError::io(path, e))?;
        let file: VocabularyFile =
            serde_json::from_str(&content).map_err(|e| SorterError::json(path, e))?;
        Ok(Self::from_defs(file.categories))
    }

    /// Load from `path` when given, otherwise use the built-in table
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SorterError::io(parent, e))?;
        }
        let file = VocabularyFile {
            categories: self.categories.clone(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| SorterError::json(path, e))?;
        fs::write(path, json).map_err(|e| SorterError::io(path, e))
    }

    pub fn categories(&self) -> &[CategoryDef] {
        &self.categories
    }

    /// Canonical labels in declaration order
    pub fn labels(&self) -> impl Iterator<Item = &CategoryLabel> {
        self.categories.iter().map(|c| &c.label)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Find a category by label, ignoring case
    pub fn get(&self, label: &str) -> Option<&CategoryDef> {
        let key = label.trim().to_lowercase();
        self.categories.iter().find(|c| c.label.key() == key)
    }

    /// Append a new category at the end of the table
    pub fn add(&mut self, label: &str, aliases: Vec<String>) -> Result<&CategoryDef> {
        let label = CategoryLabel::new(label)
            .ok_or_else(|| SorterError::InvalidConfig(format!("invalid category label: {:?}", label)))?;
        if self.get(label.as_str()).is_some() {
            return Err(SorterError::DuplicateCategory(label.to_string()));
        }

        let aliases = aliases
            .into_iter()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        self.categories.push(CategoryDef { label, aliases });
        Ok(&self.categories[self.categories.len() - 1])
    }

    /// Remove a category by label, ignoring case
    pub fn remove(&mut self, label: &str) -> Result<CategoryDef> {
        let key = label.trim().to_lowercase();
        let index = self
            .categories
            .iter()
            .position(|c| c.label.key() == key)
            .ok_or_else(|| SorterError::CategoryNotFound(label.to_string()))?;
        Ok(self.categories.remove(index))
    }

    /// Map free text onto a canonical label via the alias table
    ///
    /// An exact pass over the whole table runs before the substring pass, so
    /// "Security" lands on Security even if an earlier entry lists a word that
    /// also appears in longer phrases. Within each pass the first entry wins.
    pub fn match_alias(&self, text: &str) -> Option<&CategoryLabel> {
        let phrase = normalize_phrase(text);
        if phrase.is_empty() {
            return None;
        }

        if let Some(def) = self.categories.iter().find(|c| c.matches_exactly(&phrase)) {
            return Some(&def.label);
        }

        let padded = format!(" {} ", phrase);
        self.categories
            .iter()
            .find(|c| c.matches_within(&padded))
            .map(|c| &c.label)
    }
}

impl Default for CategoryVocabulary {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lower-case and turn every run of non-alphanumeric characters into a single space
pub fn normalize_phrase(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn label_of(vocab: &CategoryVocabulary, text: &str) -> Option<String> {
        vocab.match_alias(text).map(|l| l.to_string())
    }

    #[test]
    fn test_exact_label_match() {
        let vocab = CategoryVocabulary::builtin();
        assert_eq!(label_of(&vocab, "Security").as_deref(), Some("Security"));
        assert_eq!(label_of(&vocab, "  e-commerce ").as_deref(), Some("E-commerce"));
    }

    #[test]
    fn test_alias_within_phrase() {
        let vocab = CategoryVocabulary::builtin();
        assert_eq!(
            label_of(&vocab, "Search Engine Optimization tool").as_deref(),
            Some("SEO")
        );
        assert_eq!(label_of(&vocab, "seo-master").as_deref(), Some("SEO"));
        assert_eq!(
            label_of(&vocab, "woocommerce-stripe-gateway").as_deref(),
            Some("E-commerce")
        );
    }

    #[test]
    fn test_alias_requires_whole_words() {
        let vocab = CategoryVocabulary::builtin();
        // "rapid" contains "api" but not as a word
        assert_eq!(label_of(&vocab, "rapid"), None);
        assert_eq!(label_of(&vocab, "random-plugin-42"), None);
        assert_eq!(label_of(&vocab, "xyz123"), None);
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let vocab = CategoryVocabulary::from_defs(vec![
            CategoryDef {
                label: CategoryLabel::new("First").unwrap(),
                aliases: vec!["shared".into()],
            },
            CategoryDef {
                label: CategoryLabel::new("Second").unwrap(),
                aliases: vec!["shared".into()],
            },
        ]);
        for _ in 0..10 {
            assert_eq!(label_of(&vocab, "a shared word").as_deref(), Some("First"));
        }
    }

    #[test]
    fn test_add_and_remove() {
        let mut vocab = CategoryVocabulary::builtin();
        let before = vocab.len();

        vocab.add("Crypto", vec!["Bitcoin".into(), " ".into()]).unwrap();
        assert_eq!(vocab.len(), before + 1);
        assert_eq!(vocab.get("crypto").unwrap().aliases, vec!["bitcoin".to_string()]);
        assert_eq!(label_of(&vocab, "bitcoin-wallet").as_deref(), Some("Crypto"));

        assert!(matches!(
            vocab.add("crypto", vec![]),
            Err(SorterError::DuplicateCategory(_))
        ));

        vocab.remove("CRYPTO").unwrap();
        assert_eq!(vocab.len(), before);
        assert!(matches!(
            vocab.remove("Crypto"),
            Err(SorterError::CategoryNotFound(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vocab").join("categories.json");

        let mut vocab = CategoryVocabulary::builtin();
        vocab.add("Crypto", vec!["wallet".into()]).unwrap();
        vocab.save(&path).unwrap();

        let loaded = CategoryVocabulary::load(&path).unwrap();
        assert_eq!(loaded.len(), vocab.len());
        assert_eq!(
            loaded.labels().last().map(|l| l.as_str()),
            Some("Crypto")
        );
    }

    #[test]
    fn test_load_missing_file_is_builtin() {
        let dir = tempdir().unwrap();
        let loaded = CategoryVocabulary::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(loaded.len(), CategoryVocabulary::builtin().len());
    }

    #[test]
    fn test_normalize_phrase() {
        assert_eq!(normalize_phrase("Seo-Master_Pro!"), "seo master pro");
        assert_eq!(normalize_phrase("---"), "");
    }
}
