//! HTTP retry policy with exponential backoff.
//!
//! - Max retries: 2 (3 total attempts)
//! - Delay: 500ms doubling per attempt, capped at 8s, with down-jitter up to 25%
//! - Retryable: HTTP 408, 409, 429, 5xx, and connection errors
//! - `Retry-After` / `Retry-After-Ms` override the computed delay when under 60s
//!
//! Every attempt carries the same `X-Client-Request-Id` and an
//! `X-Retry-Count` header (0 for the first attempt).

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, Response, StatusCode};
use tokio::time;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Down-jitter factor (0.25 = up to 25% shorter).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.25,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts.
    #[must_use]
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }
}

/// Server-requested delay, if present and within `(0, 60s)`.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let in_range = |d: Duration| d > Duration::ZERO && d < Duration::from_secs(60);

    let millis = headers
        .get("retry-after-ms")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|ms| ms.is_finite() && *ms > 0.0)
        .map(|ms| Duration::from_secs_f64(ms / 1000.0));
    if let Some(delay) = millis.filter(|d| in_range(*d)) {
        return Some(delay);
    }

    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .filter(|d| in_range(*d))
}

#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 409 | 429) || status.is_server_error()
}

/// Delay before retry number `attempt` (0-based).
#[must_use]
pub fn retry_delay(attempt: u32, config: &RetryConfig, headers: Option<&HeaderMap>) -> Duration {
    if let Some(delay) = headers.and_then(parse_retry_after) {
        return delay;
    }
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(attempt as i32);
    let capped = base.min(config.max_delay.as_secs_f64());
    let jitter = 1.0 - rand::random::<f64>() * config.jitter_factor;
    Duration::from_secs_f64(capped * jitter)
}

/// Result of a retried request.
#[derive(Debug)]
pub enum RetryOutcome {
    /// 2xx response.
    Success(Response),
    /// Non-2xx response, either non-retryable or after exhausting retries.
    HttpError(Response),
    /// Transport failure on the final attempt, or a non-retryable one.
    Transport { attempts: u32, source: reqwest::Error },
}

/// Send the request built by `build_request`, retrying per `config`.
pub async fn send_with_retry<F>(build_request: F, config: &RetryConfig) -> RetryOutcome
where
    F: Fn() -> RequestBuilder,
{
    let request_id = Uuid::new_v4().to_string();
    let mut attempt = 0;

    loop {
        let is_last = attempt >= config.max_retries;
        let request = build_request()
            .header("X-Client-Request-Id", &request_id)
            .header("X-Retry-Count", attempt.to_string());

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                return RetryOutcome::Success(response);
            }
            Ok(response) => {
                let status = response.status();
                if is_last || !is_retryable_status(status) {
                    return RetryOutcome::HttpError(response);
                }
                let delay = retry_delay(attempt, config, Some(response.headers()));
                debug!(%status, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Retrying after error status");
                time::sleep(delay).await;
            }
            Err(source) => {
                if is_last || !is_retryable_error(&source) {
                    return RetryOutcome::Transport {
                        attempts: attempt + 1,
                        source,
                    };
                }
                let delay = retry_delay(attempt, config, None);
                debug!(error = %source, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Retrying after connection error");
                time::sleep(delay).await;
            }
        }
        attempt += 1;
    }
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}
