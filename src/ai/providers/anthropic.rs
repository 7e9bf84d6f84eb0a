//! Anthropic Messages API backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{non_empty, parse_json, send_request, CategoryProvider, ProviderContext, ProviderFailure, ProviderId, ProviderResult};
use crate::ai::http_client::provider_client;
use crate::ai::prompts::{build_categorize_prompt, CATEGORIZE_SYSTEM_PROMPT};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const MAX_TOKENS: u32 = 20;

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// API request body
#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

/// Content block in API response
#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

/// API response body
#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

/// Anthropic Messages API
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    base_url: String,
    context: ProviderContext,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String, context: ProviderContext) -> Self {
        Self {
            api_key,
            model,
            base_url: ANTHROPIC_API_URL.to_string(),
            context,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request_once(&self, prompt: &str) -> Result<String, ProviderFailure> {
        let request = ApiRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: CATEGORIZE_SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let body = send_request(
            provider_client()
                .post(format!("{}/v1/messages", self.base_url))
                .timeout(self.context.timeout)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&request),
        )
        .await?;

        parse_response(&body)
    }
}

#[async_trait]
impl CategoryProvider for AnthropicProvider {
    fn id(&self) -> &str {
        "anthropic"
    }

    fn priority_weight(&self) -> f32 {
        ProviderId::Anthropic.priority_weight()
    }

    async fn categorize(&self, name: &str) -> Result<ProviderResult, ProviderFailure> {
        let prompt = build_categorize_prompt(name, &self.context.suggestions);
        let text = self.context.run(self.id(), || self.request_once(&prompt)).await?;
        Ok(ProviderResult::new(self.id(), text, self.priority_weight()))
    }
}

/// Concatenate the text blocks of a response
fn parse_response(body: &str) -> Result<String, ProviderFailure> {
    let response: ApiResponse = parse_json(body)?;
    let text = response
        .content
        .into_iter()
        .filter(|block| block.content_type == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");
    non_empty(text)
}
