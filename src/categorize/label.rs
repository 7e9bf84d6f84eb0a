//! Category labels
//!
//! A label doubles as a folder name under the destination root, so it is
//! sanitized on construction and can never contain path separators or be a
//! relative path component.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest label accepted, in characters
pub const MAX_LABEL_CHARS: usize = 64;

/// A short category name, safe to use as a directory name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CategoryLabel(String);

impl CategoryLabel {
    /// Sanitize `raw` into a label; `None` if nothing usable is left
    pub fn new(raw: &str) -> Option<Self> {
        let sanitized = sanitize_label(raw);
        if sanitized.is_empty() {
            None
        } else {
            Some(Self(sanitized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison key
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for CategoryLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CategoryLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CategoryLabel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value).ok_or_else(|| format!("invalid category label: {:?}", value))
    }
}

impl From<CategoryLabel> for String {
    fn from(label: CategoryLabel) -> Self {
        label.0
    }
}

/// Replace characters that are invalid in folder names and collapse whitespace
fn sanitize_label(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c == '.' || c == '-' || c.is_whitespace());

    trimmed.chars().take(MAX_LABEL_CHARS).collect::<String>().trim_end().to_string()
}

/// Title-case each whitespace separated word: "social media" -> "Social Media"
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
