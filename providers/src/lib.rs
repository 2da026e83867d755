//! Model collaborator for Scribe.
//!
//! - [`ChatBackend`]: the blocking `chat(parts, model, hint)` seam the core talks to
//! - [`ModelRegistry`]: named models in registration order, each backed by a provider client
//! - [`gemini`]: Google Gemini `generateContent`
//! - [`mistral`]: Mistral / Codestral chat completions, with optional agent routing
//!
//! Provider calls are async internally; the registry drives them on its own
//! current-thread runtime so callers stay synchronous.

pub mod gemini;
pub mod mistral;
pub mod response_types;
pub mod retry;

use std::env::consts;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};
use scribe_types::{ContentPart, ModelHint};
use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

pub use gemini::GeminiClient;
pub use mistral::MistralClient;

/// Canonical Gemini API base URL.
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Canonical Mistral API base URL.
pub const MISTRAL_API_BASE_URL: &str = "https://api.mistral.ai";
/// Canonical Codestral API base URL.
pub const CODESTRAL_API_BASE_URL: &str = "https://codestral.mistral.ai";

/// Model names the registry knows how to build, in registration order.
pub const SUPPORTED_MODELS: [&str; 3] = ["gemini", "mistral", "codestral"];

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_MISTRAL_MODEL: &str = "mistral-large-latest";
pub const DEFAULT_CODESTRAL_MODEL: &str = "codestral-latest";

/// Prefix that marks a reply as a failure rather than content.
pub const ERROR_PREFIX: &str = "Error:";

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Client for AI system '{model}' is not available. Available clients: {}", .available.join(", "))]
    ModelUnavailable {
        model: String,
        available: Vec<String>,
    },
    #[error("API error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Request failed after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },
    #[error("AI response blocked or empty (Reason: {reason}).{}", .detail.as_deref().map(|m| format!(" Message: {m}")).unwrap_or_default())]
    Blocked {
        reason: String,
        detail: Option<String>,
    },
    #[error("AI returned no text. Finish Reason: {finish_reason}.")]
    EmptyReply { finish_reason: String },
    #[error("No text content provided for model '{model}'.")]
    NoTextInput { model: String },
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("{0}")]
    Setup(String),
}

/// The model collaborator seam.
pub trait ChatBackend {
    /// Registered model names, in registration order.
    fn available_models(&self) -> Vec<String>;

    fn chat(
        &mut self,
        parts: &[ContentPart],
        model: &str,
        hint: ModelHint,
        temperature: f64,
    ) -> Result<String, ProviderError>;

    fn is_available(&self, model: &str) -> bool {
        self.available_models().iter().any(|m| m == model)
    }

    fn first_available(&self) -> Option<String> {
        self.available_models().into_iter().next()
    }
}

/// Failure message for a chat result, or `None` if it carries content.
///
/// Replies whose text starts with `Error:` count as failures; the prefix is
/// stripped from the returned message.
#[must_use]
pub fn reply_failure(result: &Result<String, ProviderError>) -> Option<String> {
    match result {
        Err(e) => Some(e.to_string()),
        Ok(text) => text
            .trim_start()
            .strip_prefix(ERROR_PREFIX)
            .map(|rest| rest.trim().to_string()),
    }
}

/// Provider client behind a registered model name.
#[derive(Debug)]
pub enum ModelClient {
    Gemini(GeminiClient),
    Mistral(MistralClient),
}

impl ModelClient {
    async fn generate(
        &self,
        parts: &[ContentPart],
        hint: ModelHint,
        temperature: f64,
    ) -> Result<String, ProviderError> {
        match self {
            ModelClient::Gemini(client) => client.generate(parts, temperature).await,
            ModelClient::Mistral(client) => client.generate(parts, hint, temperature).await,
        }
    }
}

/// [`ChatBackend`] over named provider clients.
pub struct ModelRegistry {
    runtime: Runtime,
    models: Vec<(String, ModelClient)>,
}

impl ModelRegistry {
    pub fn new() -> Result<Self, ProviderError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ProviderError::Setup(format!("failed to start runtime: {e}")))?;
        Ok(Self {
            runtime,
            models: Vec::new(),
        })
    }

    /// Register `client` under `name`, replacing an earlier registration of the same name.
    pub fn register(&mut self, name: impl Into<String>, client: ModelClient) {
        let name = name.into().to_ascii_lowercase();
        info!(model = %name, "Registered model client");
        if let Some(slot) = self.models.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = client;
        } else {
            self.models.push((name, client));
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    fn client(&self, model: &str) -> Option<&ModelClient> {
        let wanted = model.to_ascii_lowercase();
        self.models
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, client)| client)
    }
}

impl ChatBackend for ModelRegistry {
    fn available_models(&self) -> Vec<String> {
        self.models.iter().map(|(name, _)| name.clone()).collect()
    }

    fn chat(
        &mut self,
        parts: &[ContentPart],
        model: &str,
        hint: ModelHint,
        temperature: f64,
    ) -> Result<String, ProviderError> {
        let Some(client) = self.client(model) else {
            return Err(ProviderError::ModelUnavailable {
                model: model.to_string(),
                available: self.available_models(),
            });
        };
        debug!(model, hint = hint.as_str(), parts = parts.len(), "Sending chat request");
        self.runtime
            .block_on(client.generate(parts, hint, temperature))
    }
}

fn base_client_builder() -> ClientBuilder {
    let mut default_headers = HeaderMap::new();
    default_headers.insert("X-Client-OS", HeaderValue::from_static(consts::OS));
    default_headers.insert("X-Client-Arch", HeaderValue::from_static(consts::ARCH));

    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(Policy::none())
        .https_only(true)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .default_headers(default_headers)
}

/// Hardened HTTPS client for provider calls. No total timeout on the request.
pub fn http_client() -> Result<Client, ProviderError> {
    base_client_builder()
        .build()
        .map_err(|e| ProviderError::Setup(format!("failed to build HTTP client: {e}")))
}

/// Response body for error reporting, capped at 32 KiB.
pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// Map a finished retry loop onto a 2xx response or a [`ProviderError`].
pub(crate) async fn into_success(
    outcome: retry::RetryOutcome,
) -> Result<reqwest::Response, ProviderError> {
    match outcome {
        retry::RetryOutcome::Success(response) => Ok(response),
        retry::RetryOutcome::HttpError(response) => {
            let status = response.status().as_u16();
            let body = read_capped_error_body(response).await;
            Err(ProviderError::Http { status, body })
        }
        retry::RetryOutcome::Transport { attempts, source } => Err(ProviderError::Transport {
            attempts,
            message: source.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_failure_detects_error_prefix() {
        assert_eq!(
            reply_failure(&Ok("Error: quota exceeded".to_string())),
            Some("quota exceeded".to_string())
        );
        assert_eq!(reply_failure(&Ok("All good".to_string())), None);
        assert_eq!(reply_failure(&Ok("An Error: inside".to_string())), None);
    }

    #[test]
    fn reply_failure_renders_provider_errors() {
        let err = ProviderError::Http {
            status: 401,
            body: "bad key".to_string(),
        };
        assert_eq!(reply_failure(&Err(err)), Some("API error 401: bad key".to_string()));
    }

    #[test]
    fn registry_keeps_registration_order() {
        let http = Client::new();
        let mut registry = ModelRegistry::new().expect("registry");
        registry.register(
            "gemini",
            ModelClient::Gemini(GeminiClient::new(http.clone(), "k", DEFAULT_GEMINI_MODEL)),
        );
        registry.register(
            "Mistral",
            ModelClient::Mistral(MistralClient::new(http, "k", DEFAULT_MISTRAL_MODEL)),
        );
        assert_eq!(registry.available_models(), ["gemini", "mistral"]);
        assert!(registry.is_available("mistral"));
        assert_eq!(registry.first_available().as_deref(), Some("gemini"));
    }

    #[test]
    fn unknown_model_is_unavailable() {
        let mut registry = ModelRegistry::new().expect("registry");
        let err = registry
            .chat(&[ContentPart::text("hi")], "gpt", ModelHint::Code, 0.25)
            .expect_err("unavailable");
        assert!(matches!(err, ProviderError::ModelUnavailable { .. }));
        assert!(err.to_string().contains("'gpt'"));
    }

    #[test]
    fn blocked_error_includes_message() {
        let err = ProviderError::Blocked {
            reason: "SAFETY".to_string(),
            detail: Some("policy".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "AI response blocked or empty (Reason: SAFETY). Message: policy"
        );
    }
}
