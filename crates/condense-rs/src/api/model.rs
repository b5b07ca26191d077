//! The summarization model seam.
//!
//! [`SummaryModel`] is the only thing the compactor needs from a language
//! model: turn a prompt into text. It is dyn-compatible (boxed futures, like
//! the framework's other async traits) and offers both a non-blocking and a
//! blocking entry point so synchronous and event-driven turn loops can share
//! one implementation.

use crate::api::retry::{RetryConfig, retry_async};
use crate::{ChatMessage, ChatRequest, DEFAULT_MODEL, OpenRouterClient};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future returned by [`SummaryModel::complete_async`].
pub type ModelFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

/// Context limits a model reports about itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelProfile {
    pub max_input_tokens: Option<usize>,
    pub max_output_tokens: Option<usize>,
}

/// A language model that can produce a summary from a prompt.
pub trait SummaryModel: Send + Sync {
    /// Complete `prompt`, returning the raw response text.
    fn complete_async<'a>(&'a self, prompt: &'a str) -> ModelFuture<'a>;

    /// Blocking variant of [`complete_async`](Self::complete_async), giving
    /// up with an error once `timeout` elapses.
    ///
    /// The default drives the async path on a private current-thread tokio
    /// runtime. Calling it from inside a runtime returns an error instead of
    /// panicking; async callers should use the async path.
    fn complete(&self, prompt: &str, timeout: Option<Duration>) -> Result<String, String> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(
                "blocking summarization called from inside an async runtime; use the async path"
                    .to_string(),
            );
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("failed to start runtime: {e}"))?;
        runtime.block_on(with_timeout(self.complete_async(prompt), timeout))
    }

    /// Context limits reported by the model. Unknown by default.
    fn profile(&self) -> ModelProfile {
        ModelProfile::default()
    }
}

/// Await `call`, failing with a "timed out" error if `limit` elapses first.
pub async fn with_timeout(
    call: ModelFuture<'_>,
    limit: Option<Duration>,
) -> Result<String, String> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(format!("summarization timed out after {limit:?}"))),
        None => call.await,
    }
}

/// Default response budget for a summary.
pub const DEFAULT_SUMMARY_MAX_TOKENS: u32 = 4096;

/// [`SummaryModel`] backed by the OpenRouter chat completions API.
pub struct OpenRouterSummaryModel {
    client: OpenRouterClient,
    model: String,
    max_tokens: u32,
    temperature: f32,
    retry: RetryConfig,
    profile: ModelProfile,
}

impl OpenRouterSummaryModel {
    pub fn new(client: OpenRouterClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens: DEFAULT_SUMMARY_MAX_TOKENS,
            temperature: 0.2,
            retry: RetryConfig::default(),
            profile: ModelProfile::default(),
        }
    }

    /// Use [`DEFAULT_MODEL`].
    pub fn with_default_model(client: OpenRouterClient) -> Self {
        Self::new(client, DEFAULT_MODEL)
    }

    /// Maximum tokens for the summary response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Declare the model's context limits so fractional triggers can resolve
    /// them without explicit configuration.
    pub fn with_profile(mut self, profile: ModelProfile) -> Self {
        self.profile = profile;
        self
    }

    fn request_for(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: Some(self.model.clone()),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

impl SummaryModel for OpenRouterSummaryModel {
    fn complete_async<'a>(&'a self, prompt: &'a str) -> ModelFuture<'a> {
        Box::pin(async move {
            let request = self.request_for(prompt);
            let completion = retry_async(&self.retry, || self.client.chat(&request)).await?;
            completion
                .content
                .ok_or_else(|| "empty LLM response".to_string())
        })
    }

    fn profile(&self) -> ModelProfile {
        self.profile
    }
}
