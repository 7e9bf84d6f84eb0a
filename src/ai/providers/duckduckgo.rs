//! DuckDuckGo Instant Answer lookup
//!
//! Keyless. Used last in the chain as a descriptive-text source for the normalizer.

use async_trait::async_trait;
use serde::Deserialize;

use super::{non_empty, parse_json, send_request, CategoryProvider, ProviderContext, ProviderFailure, ProviderId, ProviderResult};
use crate::ai::http_client::search_client;
use crate::ai::prompts::build_search_query;

const DUCKDUCKGO_API_URL: &str = "https://api.duckduckgo.com";

/// Related topics to fall back on when there is no abstract
const MAX_TOPICS: usize = 3;

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "Abstract")]
    abstract_html: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

/// Either a topic with text or a named group of topics
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RelatedTopic {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    topics: Vec<RelatedTopic>,
}

/// DuckDuckGo Instant Answer API
///
/// Returns descriptive text rather than a category; the normalizer's alias
/// pass picks the category words out of it. Needs no key.
pub struct DuckDuckGoProvider {
    base_url: String,
    context: ProviderContext,
}

impl DuckDuckGoProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self {
            base_url: DUCKDUCKGO_API_URL.to_string(),
            context,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request_once(&self, query: &str) -> Result<String, ProviderFailure> {
        let body = send_request(
            search_client()
                .get(format!("{}/", self.base_url))
                .timeout(self.context.timeout)
                .query(&[
                    ("q", query),
                    ("format", "json"),
                    ("no_html", "1"),
                    ("skip_disambig", "1"),
                ]),
        )
        .await?;

        parse_response(&body)
    }
}

#[async_trait]
impl CategoryProvider for DuckDuckGoProvider {
    fn id(&self) -> &str {
        "duckduckgo"
    }

    fn priority_weight(&self) -> f32 {
        ProviderId::DuckDuckGo.priority_weight()
    }

    async fn categorize(&self, name: &str) -> Result<ProviderResult, ProviderFailure> {
        let query = build_search_query(name);
        let text = self.context.run(self.id(), || self.request_once(&query)).await?;
        Ok(ProviderResult::new(self.id(), text, self.priority_weight()))
    }
}

/// Abstract first, otherwise the first few related topics on one line
fn parse_response(body: &str) -> Result<String, ProviderFailure> {
    let answer: InstantAnswer = parse_json(body)?;

    let abstract_text = if answer.abstract_text.trim().is_empty() {
        answer.abstract_html
    } else {
        answer.abstract_text
    };
    if !abstract_text.trim().is_empty() {
        return non_empty(single_line(&abstract_text));
    }

    let mut texts = Vec::new();
    collect_topic_texts(&answer.related_topics, &mut texts);
    non_empty(single_line(&texts.join(" ")))
}

fn collect_topic_texts(topics: &[RelatedTopic], texts: &mut Vec<String>) {
    for topic in topics {
        if texts.len() >= MAX_TOPICS {
            return;
        }
        match &topic.text {
            Some(text) if !text.trim().is_empty() => texts.push(text.trim().to_string()),
            _ => collect_topic_texts(&topic.topics, texts),
        }
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
