//! Google Gemini `generateContent` client.

use std::fmt;

use reqwest::Client;
use scribe_types::ContentPart;
use serde_json::{Value, json};
use tracing::warn;

use crate::response_types::gemini::Response;
use crate::retry::{RetryConfig, send_with_retry};
use crate::{GEMINI_API_BASE_URL, ProviderError, into_success};

/// Finish reasons that still count as a normal (possibly empty) reply.
const BENIGN_FINISH_REASONS: [&str; 2] = ["STOP", "MAX_TOKENS"];

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model_id: String,
    base_url: String,
    retry: RetryConfig,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &"<redacted>")
            .field("model_id", &self.model_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(http: Client, api_key: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model_id: model_id.into(),
            base_url: GEMINI_API_BASE_URL.to_string(),
            retry: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        let model = self
            .model_id
            .strip_prefix("models/")
            .unwrap_or(&self.model_id);
        format!("{}/models/{model}:generateContent", self.base_url)
    }

    pub async fn generate(
        &self,
        parts: &[ContentPart],
        temperature: f64,
    ) -> Result<String, ProviderError> {
        let body = build_request_body(parts, temperature);
        let url = self.endpoint();
        let outcome = send_with_retry(
            || {
                self.http
                    .post(&url)
                    .header("x-goog-api-key", &self.api_key)
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
        extract_reply(parsed, parts.iter().any(ContentPart::is_image))
    }
}

fn build_request_body(parts: &[ContentPart], temperature: f64) -> Value {
    let api_parts: Vec<Value> = parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => json!({ "text": text }),
            ContentPart::Image {
                mime_type,
                data_base64,
            } => json!({
                "inlineData": { "mimeType": mime_type, "data": data_base64 }
            }),
        })
        .collect();

    json!({
        "contents": [{ "role": "user", "parts": api_parts }],
        "generationConfig": { "temperature": temperature },
    })
}

/// Concatenated text of the first candidate, or the reason there is none.
fn extract_reply(response: Response, multimodal: bool) -> Result<String, ProviderError> {
    if let Some(error) = response.error {
        return Err(ProviderError::Http {
            status: u16::try_from(error.code).unwrap_or(500),
            body: error.message,
        });
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        let (reason, detail) = response
            .prompt_feedback
            .map(|f| (f.block_reason, f.block_reason_message))
            .unwrap_or_default();
        let reason = reason.unwrap_or_else(|| "Unknown".to_string());
        warn!(%reason, "Gemini response blocked or empty");
        return Err(ProviderError::Blocked { reason, detail });
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() && !multimodal {
        let finish_reason = candidate
            .finish_reason
            .unwrap_or_else(|| "N/A".to_string());
        if !BENIGN_FINISH_REASONS.contains(&finish_reason.as_str()) {
            warn!(%finish_reason, "Gemini returned no text");
            return Err(ProviderError::EmptyReply { finish_reason });
        }
    }
    Ok(text)
}
