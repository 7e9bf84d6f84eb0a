//! Category providers
//!
//! A provider wraps one external backend and answers a single question: which
//! category does this directory name belong to? Every backend sits behind the
//! same [`CategoryProvider`] trait, and the registry at the bottom of this
//! module builds the enabled ones in priority order from settings.
//!
//! # Failures
//!
//! Providers never panic and never decide what happens next. They report a
//! [`ProviderFailure`] with a [`FailureKind`]; the chain decides whether to
//! move on, and the retry policy decides whether to try again.

mod anthropic;
mod cohere;
mod duckduckgo;
mod gemini;
mod openai;

pub use self::anthropic::AnthropicProvider;
pub use self::cohere::CohereProvider;
pub use self::duckduckgo::DuckDuckGoProvider;
pub use self::gemini::GeminiProvider;
pub use self::openai::OpenAiProvider;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::credentials::CredentialManager;
use super::retry::RetryPolicy;
use crate::categorize::CategoryLabel;
use crate::categorize::CategoryVocabulary;
use crate::config::Settings;
use crate::error::{Result, SorterError};
use crate::rate_limit::RateLimiter;

/// Names longer than this are truncated before any provider sees them
pub const MAX_NAME_CHARS: usize = 200;

/// Number of Gemini key slots (`gemini`, `gemini_2` ... `gemini_5`)
pub const MAX_GEMINI_SLOTS: u8 = 5;

/// Longest error body kept in a failure message
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Known backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    Anthropic,
    OpenAi,
    /// Gemini key slot, 1-based
    Gemini(u8),
    Cohere,
    DuckDuckGo,
}

impl ProviderId {
    /// Every provider id, in default priority order
    pub fn all() -> Vec<ProviderId> {
        let mut ids = vec![ProviderId::Anthropic, ProviderId::OpenAi];
        ids.extend((1..=MAX_GEMINI_SLOTS).map(ProviderId::Gemini));
        ids.extend([ProviderId::Cohere, ProviderId::DuckDuckGo]);
        ids
    }

    /// Environment variable holding this provider's key
    pub fn env_var(&self) -> Option<String> {
        match self {
            ProviderId::Anthropic => Some("ANTHROPIC_API_KEY".to_string()),
            ProviderId::OpenAi => Some("OPENAI_API_KEY".to_string()),
            ProviderId::Gemini(1) => Some("GEMINI_API_KEY".to_string()),
            ProviderId::Gemini(slot) => Some(format!("GEMINI_API_KEY_{}", slot)),
            ProviderId::Cohere => Some("COHERE_API_KEY".to_string()),
            ProviderId::DuckDuckGo => None,
        }
    }

    pub fn requires_key(&self) -> bool {
        !matches!(self, ProviderId::DuckDuckGo)
    }

    /// Static priority weight reported as `ProviderResult::confidence`
    ///
    /// A ranking heuristic, not a measured probability.
    pub fn priority_weight(&self) -> f32 {
        match self {
            ProviderId::Anthropic => 0.9,
            ProviderId::OpenAi => 0.85,
            ProviderId::Gemini(_) => 0.8,
            ProviderId::Cohere => 0.7,
            ProviderId::DuckDuckGo => 0.5,
        }
    }

    /// Requests per minute when settings do not say otherwise
    pub fn default_rpm(&self) -> u32 {
        match self {
            ProviderId::Anthropic => 3,
            ProviderId::OpenAi => 10,
            ProviderId::Gemini(_) => 20,
            ProviderId::Cohere => 30,
            ProviderId::DuckDuckGo => 30,
        }
    }

    /// Key used for the `models` settings map; all Gemini slots share one
    pub fn model_key(&self) -> &'static str {
        match self {
            ProviderId::Anthropic => "anthropic",
            ProviderId::OpenAi => "openai",
            ProviderId::Gemini(_) => "gemini",
            ProviderId::Cohere => "cohere",
            ProviderId::DuckDuckGo => "duckduckgo",
        }
    }

    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            ProviderId::Anthropic => Some(anthropic::DEFAULT_MODEL),
            ProviderId::OpenAi => Some(openai::DEFAULT_MODEL),
            ProviderId::Gemini(_) => Some(gemini::DEFAULT_MODEL),
            ProviderId::Cohere => Some(cohere::DEFAULT_MODEL),
            ProviderId::DuckDuckGo => None,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderId::Gemini(1) => f.write_str("gemini"),
            ProviderId::Gemini(slot) => write!(f, "gemini_{}", slot),
            other => f.write_str(other.model_key()),
        }
    }
}

impl FromStr for ProviderId {
    type Err = SorterError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let id = s.trim().to_lowercase();
        match id.as_str() {
            "anthropic" | "claude" => Ok(ProviderId::Anthropic),
            "openai" => Ok(ProviderId::OpenAi),
            "gemini" | "gemini_1" => Ok(ProviderId::Gemini(1)),
            "cohere" => Ok(ProviderId::Cohere),
            "duckduckgo" | "ddg" => Ok(ProviderId::DuckDuckGo),
            other => other
                .strip_prefix("gemini_")
                .and_then(|slot| slot.parse::<u8>().ok())
                .filter(|slot| (2..=MAX_GEMINI_SLOTS).contains(slot))
                .map(ProviderId::Gemini)
                .ok_or_else(|| SorterError::UnknownProvider(s.to_string())),
        }
    }
}

/// Why a provider call produced no answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection refused, DNS, TLS, reset
    Transport,
    Timeout,
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    Server,
    /// HTTP 401/403: bad or missing credentials
    Auth,
    /// Any other 4xx
    InvalidRequest,
    /// The backend answered with nothing usable
    EmptyResponse,
    /// The body did not have the expected shape
    Malformed,
}

impl FailureKind {
    /// Worth retrying after a backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FailureKind::Transport | FailureKind::Timeout | FailureKind::RateLimited | FailureKind::Server
        )
    }

    /// The provider should not be called again this run
    pub fn is_permanent(&self) -> bool {
        matches!(self, FailureKind::Auth)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::Timeout => "timeout",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Server => "server",
            FailureKind::Auth => "auth",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::EmptyResponse => "empty_response",
            FailureKind::Malformed => "malformed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed provider failure
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ProviderFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Server-requested wait before the next attempt
    pub retry_after: Option<Duration>,
}

impl ProviderFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    fn from_transport(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            FailureKind::Timeout
        } else {
            FailureKind::Transport
        };
        Self::new(kind, error.to_string())
    }
}

/// One provider answer
#[derive(Debug, Clone)]
pub struct ProviderResult {
    /// Verbatim text returned by the backend
    pub raw_text: String,
    /// Filled in by the chain after normalization
    pub normalized_label: Option<CategoryLabel>,
    pub provider_id: String,
    /// Static priority weight of the provider, see [`ProviderId::priority_weight`]
    pub confidence: f32,
}

impl ProviderResult {
    pub fn new(provider_id: &str, raw_text: impl Into<String>, confidence: f32) -> Self {
        Self {
            raw_text: raw_text.into(),
            normalized_label: None,
            provider_id: provider_id.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// A backend that can suggest a category for a directory name
#[async_trait]
pub trait CategoryProvider: Send + Sync {
    /// Stable identifier used in logs, settings and reports
    fn id(&self) -> &str;

    fn priority_weight(&self) -> f32;

    /// Ask the backend once (with retries for transient failures)
    async fn categorize(&self, name: &str) -> std::result::Result<ProviderResult, ProviderFailure>;
}

/// Per-provider request plumbing: rate budget, retries, timeout and prompt hints
pub struct ProviderContext {
    pub limiter: RateLimiter,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    /// Category names offered to language models as suggestions
    pub suggestions: Arc<Vec<String>>,
}

impl ProviderContext {
    pub fn new(requests_per_minute: u32, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            limiter: RateLimiter::per_minute(requests_per_minute),
            retry,
            timeout,
            suggestions: Arc::new(Vec::new()),
        }
    }

    pub fn with_suggestions(mut self, suggestions: Arc<Vec<String>>) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// Run one logical request under the rate limiter and retry policy
    pub async fn run<T, F, Fut>(&self, provider_id: &str, operation: F) -> std::result::Result<T, ProviderFailure>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, ProviderFailure>>,
    {
        self.retry.execute(provider_id, &self.limiter, operation).await
    }
}

/// Send a request and return the body of a successful response
pub(crate) async fn send_request(request: RequestBuilder) -> std::result::Result<String, ProviderFailure> {
    let response = request.send().await.map_err(ProviderFailure::from_transport)?;
    let status = response.status();
    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.map_err(ProviderFailure::from_transport)?;

    match classify_status(status) {
        None => Ok(body),
        Some(kind) => Err(ProviderFailure {
            kind,
            message: format!("HTTP {}: {}", status.as_u16(), truncate(&body, MAX_ERROR_BODY_CHARS)),
            retry_after,
        }),
    }
}

/// Map a non-success status onto a failure kind; `None` means success
pub fn classify_status(status: StatusCode) -> Option<FailureKind> {
    if status.is_success() {
        return None;
    }
    let kind = match status.as_u16() {
        401 | 403 => FailureKind::Auth,
        408 => FailureKind::Timeout,
        429 => FailureKind::RateLimited,
        500..=599 => FailureKind::Server,
        _ => FailureKind::InvalidRequest,
    };
    Some(kind)
}

/// `Retry-After` in delta-seconds form; HTTP-date values are ignored
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

pub(crate) fn parse_json<T: DeserializeOwned>(body: &str) -> std::result::Result<T, ProviderFailure> {
    serde_json::from_str(body).map_err(|e| ProviderFailure::new(FailureKind::Malformed, e.to_string()))
}

/// Reject answers that are empty after trimming
pub(crate) fn non_empty(text: String) -> std::result::Result<String, ProviderFailure> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(ProviderFailure::new(FailureKind::EmptyResponse, "backend returned no text"))
    } else {
        Ok(trimmed.to_string())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

/// Cut a directory name down to [`MAX_NAME_CHARS`]
pub fn truncate_name(name: &str) -> &str {
    match name.char_indices().nth(MAX_NAME_CHARS) {
        Some((index, _)) => &name[..index],
        None => name,
    }
}

/// Build the enabled providers in configured priority order
///
/// Providers without a credential are skipped with a warning. An unknown id
/// is a configuration error.
pub fn build_providers(
    settings: &Settings,
    credentials: &CredentialManager,
    vocabulary: &CategoryVocabulary,
) -> Result<Vec<Arc<dyn CategoryProvider>>> {
    let suggestions: Arc<Vec<String>> = Arc::new(vocabulary.labels().map(|l| l.to_string()).collect());
    let retry = RetryPolicy::from_settings(&settings.retry);
    let timeout = Duration::from_secs(settings.request_timeout_secs.max(1));

    let mut providers: Vec<Arc<dyn CategoryProvider>> = Vec::new();
    let mut built: Vec<ProviderId> = Vec::new();
    for raw_id in &settings.providers_enabled {
        let id: ProviderId = raw_id.parse()?;
        // One provider per backend key, so each owns the only budget for it
        if built.contains(&id) {
            warn!(provider = %id, configured = %raw_id, "Provider listed twice, ignoring duplicate");
            continue;
        }
        built.push(id);
        let context = ProviderContext::new(settings.rate_limit_for(id), retry.clone(), timeout)
            .with_suggestions(Arc::clone(&suggestions));
        let model = settings
            .models
            .get(&id.to_string())
            .or_else(|| settings.models.get(id.model_key()))
            .cloned()
            .or_else(|| id.default_model().map(str::to_string))
            .unwrap_or_default();

        let api_key = match (id.requires_key(), credentials.get_api_key(id)) {
            (false, _) => String::new(),
            (true, Some(key)) => key.to_string(),
            (true, None) => {
                warn!(provider = %id, "No API key configured, provider disabled");
                continue;
            }
        };

        let provider: Arc<dyn CategoryProvider> = match id {
            ProviderId::Anthropic => Arc::new(AnthropicProvider::new(api_key, model, context)),
            ProviderId::OpenAi => Arc::new(OpenAiProvider::new(api_key, model, context)),
            ProviderId::Gemini(slot) => Arc::new(GeminiProvider::new(slot, api_key, model, context)),
            ProviderId::Cohere => Arc::new(CohereProvider::new(api_key, model, context)),
            ProviderId::DuckDuckGo => Arc::new(DuckDuckGoProvider::new(context)),
        };
        providers.push(provider);
    }

    info!(
        count = providers.len(),
        providers = %providers.iter().map(|p| p.id()).collect::<Vec<_>>().join(","),
        "Providers ready"
    );
    Ok(providers)
}

/// Short backoff and a large budget so HTTP tests stay fast
#[cfg(test)]
pub(crate) fn test_context() -> ProviderContext {
    ProviderContext::new(
        1000,
        RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(50)),
        Duration::from_secs(5),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use std::collections::HashMap;

    #[test]
    fn test_provider_id_round_trip() {
        for id in ProviderId::all() {
            let parsed: ProviderId = id.to_string().parse().unwrap();
            assert_eq!(parsed, id);
        }
        assert_eq!("Claude".parse::<ProviderId>().unwrap(), ProviderId::Anthropic);
        assert!("gemini_6".parse::<ProviderId>().is_err());
        assert!("gemini_x".parse::<ProviderId>().is_err());
        assert!(matches!(
            "bogus".parse::<ProviderId>(),
            Err(SorterError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_gemini_slot_env_vars() {
        assert_eq!(ProviderId::Gemini(1).env_var().as_deref(), Some("GEMINI_API_KEY"));
        assert_eq!(ProviderId::Gemini(3).env_var().as_deref(), Some("GEMINI_API_KEY_3"));
        assert_eq!(ProviderId::DuckDuckGo.env_var(), None);
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::OK), None);
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), Some(FailureKind::Auth));
        assert_eq!(classify_status(StatusCode::FORBIDDEN), Some(FailureKind::Auth));
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), Some(FailureKind::RateLimited));
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), Some(FailureKind::Server));
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), Some(FailureKind::InvalidRequest));
        assert_eq!(classify_status(StatusCode::REQUEST_TIMEOUT), Some(FailureKind::Timeout));
    }

    #[test]
    fn test_failure_kind_classes() {
        assert!(FailureKind::RateLimited.is_transient());
        assert!(FailureKind::Server.is_transient());
        assert!(!FailureKind::Auth.is_transient());
        assert!(FailureKind::Auth.is_permanent());
        assert!(!FailureKind::EmptyResponse.is_transient());
        assert!(!FailureKind::EmptyResponse.is_permanent());
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty("  SEO \n".to_string()).unwrap(), "SEO");
        assert_eq!(non_empty("  ".to_string()).unwrap_err().kind, FailureKind::EmptyResponse);
    }

    #[test]
    fn test_truncate_name() {
        let long = "é".repeat(MAX_NAME_CHARS + 10);
        assert_eq!(truncate_name(&long).chars().count(), MAX_NAME_CHARS);
        assert_eq!(truncate_name("short"), "short");
    }

    #[test]
    fn test_build_providers_skips_missing_keys() {
        let mut settings = Settings::default();
        settings.providers_enabled = vec![
            "anthropic".to_string(),
            "cohere".to_string(),
            "duckduckgo".to_string(),
        ];
        let credentials = CredentialManager::from_maps(
            HashMap::from([(ProviderId::Cohere, "key".to_string())]),
            HashMap::new(),
            HashMap::new(),
        );

        let providers =
            build_providers(&settings, &credentials, &CategoryVocabulary::builtin()).unwrap();
        let ids: Vec<&str> = providers.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["cohere", "duckduckgo"]);
    }

    #[test]
    fn test_build_providers_keeps_one_provider_per_backend() {
        let mut settings = Settings::default();
        settings.providers_enabled = vec![
            "gemini".to_string(),
            "duckduckgo".to_string(),
            "gemini_1".to_string(),
            "ddg".to_string(),
            "gemini_2".to_string(),
        ];
        let credentials = CredentialManager::from_maps(
            HashMap::from([
                (ProviderId::Gemini(1), "key-1".to_string()),
                (ProviderId::Gemini(2), "key-2".to_string()),
            ]),
            HashMap::new(),
            HashMap::new(),
        );

        let providers =
            build_providers(&settings, &credentials, &CategoryVocabulary::builtin()).unwrap();
        let ids: Vec<&str> = providers.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["gemini", "duckduckgo", "gemini_2"]);
    }

    #[test]
    fn test_build_providers_rejects_unknown_id() {
        let mut settings = Settings::default();
        settings.providers_enabled = vec!["nope".to_string()];
        let result = build_providers(
            &settings,
            &CredentialManager::default(),
            &CategoryVocabulary::builtin(),
        );
        assert!(result.is_err());
    }
}
