/// System prompt for plugin categorization
pub const CATEGORIZE_SYSTEM_PROMPT: &str = r#"You are a librarian for WordPress plugins. Your task is to place a plugin into a single category based only on its directory name.

RULES:
1. Output ONLY the category name, one or two words
2. Prefer one of the suggested categories when any of them fits
3. Invent a new short category only when none fits
4. No explanation, no punctuation, no quotes

EXAMPLES:
- wordpress-seo -> SEO
- woocommerce-gateway-stripe -> E-commerce
- wordfence -> Security
- contact-form-7 -> Forms
- w3-total-cache -> Performance"#;

/// Build user prompt for one directory name
pub fn build_categorize_prompt(name: &str, suggestions: &[String]) -> String {
    let mut prompt = format!(
        "What category would you put the WordPress plugin '{}' in?",
        name
    );

    if !suggestions.is_empty() {
        prompt.push_str(&format!(
            "\n\nSUGGESTED CATEGORIES: {}",
            suggestions.join(", ")
        ));
    }

    prompt.push_str("\n\nRespond with ONLY the category name.");

    prompt
}

/// Query string for the web-search backend
pub fn build_search_query(name: &str) -> String {
    let words = name.replace(['-', '_'], " ");
    format!("{} wordpress plugin", words.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_includes_name_and_suggestions() {
        let prompt = build_categorize_prompt(
            "seo-master",
            &["SEO".to_string(), "Security".to_string()],
        );
        assert!(prompt.contains("'seo-master'"));
        assert!(prompt.contains("SUGGESTED CATEGORIES: SEO, Security"));
    }

    #[test]
    fn test_prompt_without_suggestions() {
        let prompt = build_categorize_prompt("x", &[]);
        assert!(!prompt.contains("SUGGESTED"));
    }

    #[test]
    fn test_search_query() {
        assert_eq!(build_search_query("contact-form_7"), "contact form 7 wordpress plugin");
    }
}
