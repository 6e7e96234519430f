//! Client for provider completion endpoints (OpenAI-style chat completions).

use {
    serde::{Deserialize, Serialize},
    std::time::Duration,
    thiserror::Error,
    tracing::debug,
};

/// Per-request deadline; a hung provider fails the instruction instead of
/// stalling the worker forever.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("API call failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion endpoint returned no choices")]
    NoChoices,
}

/// One turn of conversation history as the endpoint expects it.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
}

#[derive(Deserialize)]
struct CompletionPayload {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Shared HTTP client; the endpoint and key come from the provider record on
/// every call.
#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { http: reqwest::Client::new(), timeout }
    }

    /// POST the model name and conversation, returning the first choice's
    /// content. Non-2xx statuses and malformed bodies are completion errors.
    pub async fn complete(
        &self,
        endpoint: &str,
        api_key: Option<&str>,
        model: &str,
        messages: &[ChatTurn],
    ) -> Result<String, CompletionError> {
        debug!(endpoint, model, turns = messages.len(), "requesting completion");
        let mut request = self
            .http
            .post(endpoint)
            .timeout(self.timeout)
            .json(&CompletionRequest { model, messages });
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        let payload: CompletionPayload =
            request.send().await?.error_for_status()?.json().await?;
        payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(CompletionError::NoChoices)
    }
}

impl Default for CompletionClient {
    fn default() -> Self {
        Self::new()
    }
}
