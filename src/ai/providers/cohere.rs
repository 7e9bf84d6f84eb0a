//! Cohere v2 chat backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{non_empty, parse_json, send_request, CategoryProvider, FailureKind, ProviderContext, ProviderFailure, ProviderId, ProviderResult};
use crate::ai::http_client::provider_client;
use crate::ai::prompts::{build_categorize_prompt, CATEGORIZE_SYSTEM_PROMPT};

const COHERE_API_URL: &str = "https://api.cohere.com";
pub const DEFAULT_MODEL: &str = "command-r";
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
    message: Option<AssistantMessage>,
}

#[derive(Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Vec<ContentItem>,
}

#[derive(Deserialize)]
struct ContentItem {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

/// Cohere v2 Chat API
pub struct CohereProvider {
    api_key: String,
    model: String,
    base_url: String,
    context: ProviderContext,
}

impl CohereProvider {
    pub fn new(api_key: String, model: String, context: ProviderContext) -> Self {
        Self {
            api_key,
            model,
            base_url: COHERE_API_URL.to_string(),
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
                .post(format!("{}/v2/chat", self.base_url))
                .timeout(self.context.timeout)
                .bearer_auth(&self.api_key)
                .json(&request),
        )
        .await?;

        parse_response(&body)
    }
}

#[async_trait]
impl CategoryProvider for CohereProvider {
    fn id(&self) -> &str {
        "cohere"
    }

    fn priority_weight(&self) -> f32 {
        ProviderId::Cohere.priority_weight()
    }

    async fn categorize(&self, name: &str) -> Result<ProviderResult, ProviderFailure> {
        let prompt = build_categorize_prompt(name, &self.context.suggestions);
        let text = self.context.run(self.id(), || self.request_once(&prompt)).await?;
        Ok(ProviderResult::new(self.id(), text, self.priority_weight()))
    }
}

fn parse_response(body: &str) -> Result<String, ProviderFailure> {
    let response: ChatResponse = parse_json(body)?;
    let message = response
        .message
        .ok_or_else(|| ProviderFailure::new(FailureKind::EmptyResponse, "no message in response"))?;
    let text = message
        .content
        .into_iter()
        .filter(|item| item.content_type == "text")
        .filter_map(|item| item.text)
        .collect::<Vec<_>>()
        .join("");
    non_empty(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::providers::test_context;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_message_content() {
        let body = r#"{"id":"x","message":{"role":"assistant","content":[{"type":"text","text":"Backup"}]},"finish_reason":"COMPLETE"}"#;
        assert_eq!(parse_response(body).unwrap(), "Backup");
    }

    #[test]
    fn test_parse_missing_message() {
        assert_eq!(parse_response("{}").unwrap_err().kind, FailureKind::EmptyResponse);
    }

    #[tokio::test]
    async fn test_categorize_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/chat"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": [{"type": "text", "text": "Backup"}]},
                "finish_reason": "COMPLETE"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = CohereProvider::new("test-key".to_string(), DEFAULT_MODEL.to_string(), test_context())
            .with_base_url(server.uri());
        let result = provider.categorize("duplicator").await.unwrap();
        assert_eq!(result.raw_text, "Backup");
    }

    #[tokio::test]
    async fn test_malformed_body_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = CohereProvider::new("k".to_string(), DEFAULT_MODEL.to_string(), test_context())
            .with_base_url(server.uri());
        assert_eq!(provider.categorize("x").await.unwrap_err().kind, FailureKind::Malformed);
    }
}
