//! Mistral and Codestral chat completions client.
//!
//! Both services speak the same API; only the base URL and model differ. A
//! client may carry agent ids, in which case requests for the matching hint go
//! to the agents endpoint instead of the plain chat endpoint.

use std::fmt;

use reqwest::Client;
use scribe_types::{ContentPart, ModelHint};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::response_types::mistral::Response;
use crate::retry::{RetryConfig, send_with_retry};
use crate::{MISTRAL_API_BASE_URL, ProviderError, into_success};

#[derive(Clone)]
pub struct MistralClient {
    http: Client,
    api_key: String,
    model_id: String,
    base_url: String,
    code_agent: Option<String>,
    architect_agent: Option<String>,
    retry: RetryConfig,
}

/// Where a request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target<'a> {
    Model(&'a str),
    Agent(&'a str),
}

impl fmt::Debug for MistralClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MistralClient")
            .field("api_key", &"<redacted>")
            .field("model_id", &self.model_id)
            .field("base_url", &self.base_url)
            .field("code_agent", &self.code_agent)
            .field("architect_agent", &self.architect_agent)
            .finish_non_exhaustive()
    }
}

impl MistralClient {
    pub fn new(http: Client, api_key: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model_id: model_id.into(),
            base_url: MISTRAL_API_BASE_URL.to_string(),
            code_agent: None,
            architect_agent: None,
            retry: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Route `code` hints to `code_agent` and `conversation` hints to `architect_agent`.
    #[must_use]
    pub fn with_agents(mut self, code_agent: Option<String>, architect_agent: Option<String>) -> Self {
        self.code_agent = code_agent.filter(|id| !id.trim().is_empty());
        self.architect_agent = architect_agent.filter(|id| !id.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn target(&self, hint: ModelHint) -> Target<'_> {
        let agent = match hint {
            ModelHint::Code => self.code_agent.as_deref(),
            ModelHint::Conversation => self.architect_agent.as_deref(),
        };
        match agent {
            Some(id) => Target::Agent(id),
            None => Target::Model(&self.model_id),
        }
    }

    pub async fn generate(
        &self,
        parts: &[ContentPart],
        hint: ModelHint,
        temperature: f64,
    ) -> Result<String, ProviderError> {
        let target = self.target(hint);
        let (url, body) = match target {
            Target::Agent(id) => {
                info!(agent = id, hint = hint.as_str(), "Routing to Mistral agent");
                (
                    format!("{}/v1/agents/completions", self.base_url),
                    json!({ "agent_id": id, "messages": self.messages(parts)? }),
                )
            }
            Target::Model(model) => (
                format!("{}/v1/chat/completions", self.base_url),
                json!({
                    "model": model,
                    "messages": self.messages(parts)?,
                    "temperature": temperature,
                }),
            ),
        };

        let outcome = send_with_retry(
            || {
                self.http
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .header("content-type", "application/json")
                    .json(&body)
            },
            &self.retry,
        )
        .await;

        let response = into_success(outcome).await?;
        let parsed: Response = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let Some(choice) = parsed.choices.into_iter().next() else {
            warn!(model = %self.model_id, "Response had no choices");
            return Err(ProviderError::Malformed(
                "AI response was empty or malformed (no choices)".to_string(),
            ));
        };
        Ok(choice
            .message
            .and_then(|m| m.content)
            .map(|c| c.into_text())
            .unwrap_or_default())
    }

    /// One user message holding every text part, newline-joined. Images are dropped.
    fn messages(&self, parts: &[ContentPart]) -> Result<Value, ProviderError> {
        let mut text = String::new();
        for part in parts {
            match part {
                ContentPart::Text(t) => {
                    text.push_str(t);
                    text.push('\n');
                }
                ContentPart::Image { .. } => {
                    warn!(model = %self.model_id, "Image part ignored; this client is text-only");
                }
            }
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ProviderError::NoTextInput {
                model: self.model_id.clone(),
            });
        }
        Ok(json!([{ "role": "user", "content": text }]))
    }
}
