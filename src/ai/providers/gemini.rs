//! Google Gemini `generateContent` backend, one instance per key slot

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{non_empty, parse_json, send_request, CategoryProvider, FailureKind, ProviderContext, ProviderFailure, ProviderId, ProviderResult};
use crate::ai::http_client::provider_client;
use crate::ai::prompts::{build_categorize_prompt, CATEGORIZE_SYSTEM_PROMPT};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const MAX_OUTPUT_TOKENS: u32 = 20;

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

/// Google Gemini `generateContent`
///
/// Each key slot is its own provider with its own rate budget, so several
/// free-tier keys can be chained one after another.
pub struct GeminiProvider {
    id: String,
    slot: u8,
    api_key: String,
    model: String,
    base_url: String,
    context: ProviderContext,
}

impl GeminiProvider {
    pub fn new(slot: u8, api_key: String, model: String, context: ProviderContext) -> Self {
        Self {
            id: ProviderId::Gemini(slot).to_string(),
            slot,
            api_key,
            model,
            base_url: GEMINI_API_URL.to_string(),
            context,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request_once(&self, prompt: &str) -> Result<String, ProviderFailure> {
        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(CATEGORIZE_SYSTEM_PROMPT.to_string()),
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: MAX_OUTPUT_TOKENS,
                temperature: 0.0,
            },
        };

        let body = send_request(
            provider_client()
                .post(format!(
                    "{}/v1beta/models/{}:generateContent",
                    self.base_url, self.model
                ))
                .timeout(self.context.timeout)
                .header("x-goog-api-key", &self.api_key)
                .json(&request),
        )
        .await?;

        parse_response(&body)
    }
}

#[async_trait]
impl CategoryProvider for GeminiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority_weight(&self) -> f32 {
        ProviderId::Gemini(self.slot).priority_weight()
    }

    async fn categorize(&self, name: &str) -> Result<ProviderResult, ProviderFailure> {
        let prompt = build_categorize_prompt(name, &self.context.suggestions);
        let text = self.context.run(&self.id, || self.request_once(&prompt)).await?;
        Ok(ProviderResult::new(&self.id, text, self.priority_weight()))
    }
}

/// Text of the first candidate; a blocked prompt has no candidates
fn parse_response(body: &str) -> Result<String, ProviderFailure> {
    let response: GenerateResponse = parse_json(body)?;
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderFailure::new(FailureKind::EmptyResponse, "no candidates in response"))?;
    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
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
    fn test_parse_candidate_parts() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Perfor"},{"text":"mance"}]},"finishReason":"STOP"}]}"#;
        assert_eq!(parse_response(body).unwrap(), "Performance");
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert_eq!(parse_response(body).unwrap_err().kind, FailureKind::EmptyResponse);
    }

    #[test]
    fn test_slot_ids() {
        let context = ProviderContext::new(20, crate::ai::retry::RetryPolicy::none(), std::time::Duration::from_secs(1));
        let provider = GeminiProvider::new(3, "k".into(), DEFAULT_MODEL.into(), context);
        assert_eq!(provider.id(), "gemini_3");
    }

    #[tokio::test]
    async fn test_categorize_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/v1beta/models/{}:generateContent", DEFAULT_MODEL)))
            .and(header("x-goog-api-key", "slot-two-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "Performance"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(2, "slot-two-key".to_string(), DEFAULT_MODEL.to_string(), test_context())
            .with_base_url(server.uri());
        let result = provider.categorize("litespeed-cache").await.unwrap();

        assert_eq!(result.raw_text, "Performance");
        assert_eq!(result.provider_id, "gemini_2");
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("model not found"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(1, "k".to_string(), "missing".to_string(), test_context())
            .with_base_url(server.uri());
        let failure = provider.categorize("x").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::InvalidRequest);
        assert!(failure.message.contains("model not found"));
    }
}
