//! Retry with exponential backoff for summarization calls.
//!
//! A failed summarization is not fatal (the compactor falls back to a
//! placeholder summary), but a placeholder loses the whole summarized span.
//! Transient provider errors (429, 5xx, dropped connections) are therefore
//! worth a few retries before giving up. Client errors (400, 401, 403, 404,
//! 422) never are.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = a single attempt).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Backoff multiplier applied per attempt.
    pub multiplier: f64,
    /// Scale delays by a per-attempt factor to spread out concurrent retries.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No retries: the first failure is returned as-is.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Default backoff with the given number of retries.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Set the delay before the first retry.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Disable jitter (deterministic delays).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        if !self.jitter {
            return Duration::from_secs_f64(capped);
        }
        // Deterministic jitter; no RNG dependency for four factors.
        let factor = [0.75, 0.90, 0.60, 0.85][(attempt % 4) as usize];
        Duration::from_secs_f64(capped * factor)
    }
}

/// How an error string should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    /// Rate limits, server errors, network failures.
    Transient,
    /// Client-side errors that will fail identically on every attempt.
    Permanent,
    /// Anything else. Not retried.
    Unknown,
}

/// Classify an error string produced by [`OpenRouterClient`](crate::OpenRouterClient).
///
/// An HTTP status, when present, decides on its own: `"HTTP 400: request
/// timed out upstream"` is permanent and `"HTTP 503: invalid upstream
/// response"` is transient. Free-text markers only apply to errors without one.
pub fn classify_error(error: &str) -> Retryability {
    const PERMANENT_TEXT: [&str; 3] = ["invalid", "bad request", "unauthorized"];
    const TRANSIENT_TEXT: [&str; 7] = [
        "request failed:",
        "connection reset",
        "connection refused",
        "timed out",
        "timeout",
        "broken pipe",
        "network",
    ];

    if let Some(status) = http_status(error) {
        return match status {
            429 | 500 | 502 | 503 | 504 => Retryability::Transient,
            400 | 401 | 403 | 404 | 422 => Retryability::Permanent,
            _ => Retryability::Unknown,
        };
    }
    let lower = error.to_lowercase();
    if PERMANENT_TEXT.iter().any(|p| lower.contains(p)) {
        Retryability::Permanent
    } else if TRANSIENT_TEXT.iter().any(|p| lower.contains(p)) {
        Retryability::Transient
    } else {
        Retryability::Unknown
    }
}

/// The status code following `"HTTP "`, if the error carries one.
fn http_status(error: &str) -> Option<u16> {
    let (_, rest) = error.split_once("HTTP ")?;
    rest.get(..3)?.parse().ok()
}

/// Run `call` until it succeeds, fails permanently, or retries run out.
pub async fn retry_async<T, F, Fut>(config: &RetryConfig, mut call: F) -> Result<T, String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, String>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(e)
                if attempt < config.max_retries
                    && classify_error(&e) == Retryability::Transient =>
            {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "Transient summarization error (attempt {}/{}): {e}. Retrying in {delay:?}...",
                    attempt + 1,
                    config.max_retries,
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
