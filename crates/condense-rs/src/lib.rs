//! Context-window compaction for turn-based LLM agents.
//!
//! `condense-rs` decides when a conversation is about to outgrow a model's
//! input budget and replaces the oldest part of the history with a compact,
//! structured summary. Recent messages survive verbatim, the leading system
//! prompt is never touched, and no tool call is ever separated from the tool
//! result that answers it. The core abstraction is the
//! [`Compactor`](context::compactor::Compactor), a pre-model hook that the host
//! agent loop calls once per turn, before the model is invoked.
//!
//! # Getting started
//!
//! ```ignore
//! use condense_rs::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api_key = std::env::var("OPENROUTER_KEY")?;
//!     let client = OpenRouterClient::new(api_key)?;
//!     let model = Arc::new(OpenRouterSummaryModel::new(client, "deepseek/deepseek-chat"));
//!
//!     let config = CompactionConfig::default()
//!         .with_trigger(ContextSize::Fraction(0.8))
//!         .with_keep(ContextSize::MessageCount(5))
//!         .with_max_input_tokens(128_000)
//!         .with_max_output_tokens(8192);
//!
//!     let compactor = Compactor::new(config, model)?;
//!
//!     let mut conversation = vec![
//!         Message::system("You are a helpful coding assistant."),
//!         Message::user("Read src/main.rs and summarize it."),
//!     ];
//!
//!     // Once per turn, before calling the model:
//!     if let CompactionOutcome::Replace { messages, result } =
//!         compactor.before_model_async(&conversation).await
//!     {
//!         println!("saved {} tokens", result.tokens_saved());
//!         conversation = messages;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Decide when to compact:** [`ContextSize`](context::trigger::ContextSize)
//!   and [`TriggerEvaluator`](context::trigger::TriggerEvaluator), fed by
//!   [`TokenUsageTracker`](context::usage::TokenUsageTracker) and
//!   [`ContextBudget`](context::budget::ContextBudget).
//!
//! - **Decide how much to keep:** [`CutoffSelector`](context::cutoff::CutoffSelector)
//!   and [`PairSafetyIndex`](context::cutoff::PairSafetyIndex), then
//!   [`partition`](context::partition::partition).
//!
//! - **Produce the summary:** [`SummaryGenerator`](context::summarizer::SummaryGenerator)
//!   over any [`SummaryModel`](api::model::SummaryModel). The bundled
//!   [`OpenRouterSummaryModel`](api::model::OpenRouterSummaryModel) talks to the
//!   OpenRouter chat completions API with retry and backoff.
//!
//! - **Observe decisions:** implement
//!   [`CompactionObserver`](context::events::CompactionObserver), or use
//!   [`LoggingObserver`](context::events::LoggingObserver) for `tracing` output.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Budget, usage tracking, triggers, cutoff selection, partitioning, summarization, the compactor |
//! | [`api`] | The summarization model seam, OpenRouter adapter, retry with backoff |
//! | [`error`] | Construction-time configuration errors |
//!
//! # Design principles
//!
//! 1. **Structure before savings.** A cutoff that would orphan a tool result
//!    is never chosen, even if it would free more tokens.
//!
//! 2. **Provider numbers beat estimates.** The token count reported with the
//!    newest model response is used whenever it exists; the local estimator
//!    is only a fallback.
//!
//! 3. **Compaction never fails a turn.** Configuration errors surface at
//!    construction time. Once built, every summarization failure degrades to
//!    a placeholder summary and the turn proceeds.
//!
//! 4. **All-or-nothing replacement.** The host sees either the untouched
//!    conversation or a complete replacement, never a partial edit.

pub mod api;
pub mod context;
pub mod error;
pub mod prelude;

use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for summarization calls.
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-chat";

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// Role-specific part of a message.
///
/// Serialized as an internally tagged `role` field, so OpenAI-style payloads
/// such as `{"role": "tool", "tool_call_id": "c1", "content": "..."}` map
/// directly onto the matching variant.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum MessageKind {
    System,
    User,
    Assistant {
        /// Tool calls requested by this response. Empty for plain text turns.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        /// The call this message answers.
        tool_call_id: String,
        /// Name of the tool that produced the result, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

/// Message body: plain text or a structured (multimodal) payload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<serde_json::Value>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl MessageContent {
    /// Render the content as text. Structured parts are rendered as compact JSON.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            MessageContent::Text(text) => Cow::Borrowed(text),
            MessageContent::Parts(parts) => Cow::Owned(
                serde_json::to_string(parts).unwrap_or_else(|_| "[unrenderable content]".into()),
            ),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

/// Assistant responses commonly carry `"content": null` alongside tool calls.
fn content_or_empty<'de, D>(deserializer: D) -> Result<MessageContent, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<MessageContent>::deserialize(deserializer)?.unwrap_or_default())
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    /// Unique identifier. Assigned by [`ensure_ids`] when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub kind: MessageKind,
    #[serde(default, deserialize_with = "content_or_empty")]
    pub content: MessageContent,
    /// Provider-reported token usage. Only set on assistant messages that
    /// came directly from a model response.
    #[serde(
        default,
        alias = "usage_metadata",
        skip_serializing_if = "Option::is_none"
    )]
    pub usage: Option<UsageInfo>,
}

impl Message {
    fn new(kind: MessageKind, content: MessageContent) -> Self {
        Self {
            id: None,
            kind,
            content,
            usage: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageKind::System, MessageContent::Text(content.into()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageKind::User, MessageContent::Text(content.into()))
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::new(
            MessageKind::Assistant { tool_calls: vec![] },
            MessageContent::Text(content.into()),
        )
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::new(
            MessageKind::Assistant { tool_calls: calls },
            MessageContent::default(),
        )
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            MessageKind::Tool {
                tool_call_id: call_id.into(),
                name: None,
            },
            MessageContent::Text(content.into()),
        )
    }

    /// Set the identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach provider-reported usage metadata.
    pub fn with_usage(mut self, usage: UsageInfo) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Name the tool that produced a tool result. No effect on other roles.
    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        if let MessageKind::Tool { ref mut name, .. } = self.kind {
            *name = Some(tool_name.into());
        }
        self
    }

    pub fn role(&self) -> MessageRole {
        match self.kind {
            MessageKind::System => MessageRole::System,
            MessageKind::User => MessageRole::User,
            MessageKind::Assistant { .. } => MessageRole::Assistant,
            MessageKind::Tool { .. } => MessageRole::Tool,
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self.kind, MessageKind::System)
    }

    /// Whether this is a synthetic summary inserted by a compaction.
    pub fn is_compaction_summary(&self) -> bool {
        self.is_system() && self.text().starts_with(context::compactor::SUMMARY_PREFIX)
    }

    /// Content rendered as text.
    pub fn text(&self) -> Cow<'_, str> {
        self.content.as_text()
    }

    /// Tool calls requested by an assistant message. Empty for other roles.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self.kind {
            MessageKind::Assistant { ref tool_calls } => tool_calls,
            _ => &[],
        }
    }

    /// The call identifier a tool message answers.
    pub fn answered_call_id(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Tool {
                ref tool_call_id, ..
            } => Some(tool_call_id),
            _ => None,
        }
    }

    /// Total tokens reported by the provider, if this is an assistant
    /// message with non-zero usage.
    pub fn reported_total_tokens(&self) -> Option<usize> {
        match self.kind {
            MessageKind::Assistant { .. } => self
                .usage
                .as_ref()
                .map(UsageInfo::total)
                .filter(|total| *total > 0),
            _ => None,
        }
    }
}

/// Return a copy of `messages` where every message has an identifier.
///
/// Messages that already carry an id are cloned unchanged; the rest get a
/// fresh UUIDv4. The input slice is never mutated.
pub fn ensure_ids(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .map(|msg| match msg.id {
            Some(_) => msg.clone(),
            None => msg.clone().with_id(uuid::Uuid::new_v4().to_string()),
        })
        .collect()
}

// ── Tool types ─────────────────────────────────────────────────────

/// The type of a tool call. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A tool call returned by the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub function: FunctionCallData,
}

impl ToolCall {
    /// Create a function tool call.
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: CallType::Function,
            function: FunctionCallData {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}

// ── Usage ──────────────────────────────────────────────────────────

/// Token usage statistics attached to a model response.
///
/// Accepts both the `input/output` naming and the OpenAI-style
/// `prompt/completion` naming.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageInfo {
    #[serde(default, alias = "prompt_tokens", skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    #[serde(
        default,
        alias = "completion_tokens",
        skip_serializing_if = "Option::is_none"
    )]
    pub output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

impl UsageInfo {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens: Some(input_tokens),
            output_tokens: Some(output_tokens),
            total_tokens: Some(input_tokens.saturating_add(output_tokens)),
        }
    }

    /// Reported total, or input + output when the provider omits the total.
    pub fn total(&self) -> usize {
        match self.total_tokens {
            Some(total) => total as usize,
            None => {
                self.input_tokens.unwrap_or(0) as usize + self.output_tokens.unwrap_or(0) as usize
            }
        }
    }
}

// ── Request / response types ───────────────────────────────────────

/// A message on the chat-completions wire. Only used for outgoing requests.
#[derive(Serialize, Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Chat completion request body.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from `OpenRouterClient::chat()`.
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) referer: String,
    pub(crate) title: String,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(api_key, "https://github.com/condense-rs", "condense-rs")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("condense-rs/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
        })
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model.as_deref().unwrap_or("(none)"),
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("OpenRouter API HTTP {status}: {text}"));
        }

        parse_chat_response(&text)
    }
}

/// Parse a raw chat-completions response body.
fn parse_chat_response(text: &str) -> Result<ChatCompletion, String> {
    let parsed: RawChatResponse =
        serde_json::from_str(text).map_err(|e| format!("failed to parse response: {e}"))?;

    if let Some(err) = parsed.error {
        return Err(format!("OpenRouter API error: {}", err.message));
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.input_tokens.unwrap_or(0),
            usage.output_tokens.unwrap_or(0),
            usage.total(),
        );
    }

    match parsed.choices.and_then(|c| c.into_iter().next()) {
        Some(c) => Ok(ChatCompletion {
            content: c.message.content,
            usage: parsed.usage,
            finish_reason: c.finish_reason,
        }),
        None => Ok(ChatCompletion {
            content: None,
            usage: parsed.usage,
            finish_reason: None,
        }),
    }
}
