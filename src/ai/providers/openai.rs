//! OpenAI chat completions backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{non_empty, parse_json, send_request, CategoryProvider, FailureKind, ProviderContext, ProviderFailure, ProviderId, ProviderResult};
use crate::ai::http_client::provider_client;
use crate::ai::prompts::{build_categorize_prompt, CATEGORIZE_SYSTEM_PROMPT};

const OPENAI_API_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const MAX_TOKENS: u32 = 20;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// OpenAI Chat Completions API
pub struct OpenAiProvider {
    api_key: String,
    model: String,
    base_url: String,
    context: ProviderContext,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, context: ProviderContext) -> Self {
        Self {
            api_key,
            model,
            base_url: OPENAI_API_URL.to_string(),
            context,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request_once(&self, prompt: &str) -> Result<String, ProviderFailure> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: CATEGORIZE_SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
        };

        let body = send_request(
            provider_client()
                .post(format!("{}/v1/chat/completions", self.base_url))
                .timeout(self.context.timeout)
                .bearer_auth(&self.api_key)
                .json(&request),
        )
        .await?;

        parse_response(&body)
    }
}

#[async_trait]
impl CategoryProvider for OpenAiProvider {
    fn id(&self) -> &str {
        "openai"
    }

    fn priority_weight(&self) -> f32 {
        ProviderId::OpenAi.priority_weight()
    }

    async fn categorize(&self, name: &str) -> Result<ProviderResult, ProviderFailure> {
        let prompt = build_categorize_prompt(name, &self.context.suggestions);
        let text = self.context.run(self.id(), || self.request_once(&prompt)).await?;
        Ok(ProviderResult::new(self.id(), text, self.priority_weight()))
    }
}

fn parse_response(body: &str) -> Result<String, ProviderFailure> {
    let response: ChatResponse = parse_json(body)?;
    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderFailure::new(FailureKind::EmptyResponse, "no choices in response"))?
        .message
        .content
        .unwrap_or_default();
    non_empty(content)
}
