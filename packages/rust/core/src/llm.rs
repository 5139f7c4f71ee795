//! Text-completion client for OpenAI-compatible chat endpoints.
//!
//! Optional service: nothing in LV generation calls it. The CLI exposes it
//! for ad-hoc completions and reports its availability in `status`.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use lvkit_shared::{LlmConfig, LvkitError, Result};

/// User-Agent string for completion requests.
const USER_AGENT: &str = concat!("lvkit/", env!("CARGO_PKG_VERSION"));

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }
}

/// A completion call. Unset fields fall back to the provider's defaults.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Prepended as a `system` message when set.
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// A single user message.
    pub fn prompt(content: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(content)],
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// A synchronous-contract text-completion service.
#[allow(async_fn_in_trait)]
pub trait TextCompletion {
    /// Whether the service can be called at all (e.g. credentials present).
    fn is_available(&self) -> bool;

    /// The completion text for `request`.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// [`TextCompletion`] against `<base_url>/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiProvider {
    /// Provider configured from `config`, reading the key from its env var.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(config, config.api_key())
    }

    /// Provider configured from `config` with an explicit key.
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self> {
        let base = config.endpoint()?;
        let endpoint = Url::parse(&format!(
            "{}/chat/completions",
            base.as_str().trim_end_matches('/')
        ))
        .map_err(|e| LvkitError::config(format!("invalid completion endpoint: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LvkitError::Llm(format!("failed to build HTTP client: {e}")))?;

        if api_key.is_none() {
            warn!(env = %config.api_key_env, "no API key set, completion provider unavailable");
        }

        Ok(Self {
            client,
            endpoint,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl TextCompletion for OpenAiProvider {
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let Some(api_key) = &self.api_key else {
            return Err(LvkitError::Llm(
                "no API key configured for the completion provider".into(),
            ));
        };

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system_prompt.filter(|s| !s.trim().is_empty()) {
            messages.push(ChatMessage::system(system));
        }
        messages.extend(request.messages);

        let model = request.model.unwrap_or_else(|| self.model.clone());
        let body = ChatRequestBody {
            model: &model,
            messages,
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            temperature: request.temperature.unwrap_or(self.temperature),
        };

        debug!(%model, messages = body.messages.len(), "sending completion request");

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LvkitError::Llm(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LvkitError::Llm(format!(
                "{}: HTTP {status}: {}",
                self.endpoint,
                detail.trim()
            )));
        }

        let parsed: ChatResponseBody = response
            .json()
            .await
            .map_err(|e| LvkitError::Llm(format!("invalid completion response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LvkitError::Llm("completion response contained no message".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> LlmConfig {
        LlmConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn completes_with_system_prompt() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "Du bist Bauleiter."},
                    {"role": "user", "content": "Was kostet ein WC?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Etwa 350 €."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&config(&server.uri()), Some("test-key".into())).unwrap();
        assert!(provider.is_available());

        let text = provider
            .complete(CompletionRequest::prompt("Was kostet ein WC?").with_system("Du bist Bauleiter."))
            .await
            .unwrap();
        assert_eq!(text, "Etwa 350 €.");
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&config(&server.uri()), Some("k".into())).unwrap();
        let err = provider.complete(CompletionRequest::prompt("hi")).await.unwrap_err();
        assert!(matches!(err, LvkitError::Llm(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn empty_choices_are_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&config(&server.uri()), Some("k".into())).unwrap();
        assert!(provider.complete(CompletionRequest::prompt("hi")).await.is_err());
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&config(&server.uri()), None).unwrap();
        assert!(!provider.is_available());
        let err = provider.complete(CompletionRequest::prompt("hi")).await.unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn endpoint_joins_base_path() {
        let provider =
            OpenAiProvider::new(&config("https://api.example.com/v1/"), None).unwrap();
        assert_eq!(provider.endpoint().as_str(), "https://api.example.com/v1/chat/completions");
        assert_eq!(provider.model(), "gpt-4o-mini");
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(OpenAiProvider::new(&config("ftp://example.com"), None).is_err());
    }
}
