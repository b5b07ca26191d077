//! Configuration for the [`Compactor`](super::compactor::Compactor).
//!
//! Compaction is **disabled by default**: without at least one trigger the
//! compactor never acts. Everything else has working defaults, so the
//! smallest useful configuration is a single trigger:
//!
//! ```ignore
//! let config = CompactionConfig::default()
//!     .with_trigger(ContextSize::MessageCount(50));
//! ```
//!
//! A fuller configuration for a model with a known context window:
//!
//! ```ignore
//! let config = CompactionConfig::default()
//!     .with_trigger(ContextSize::Fraction(0.8))
//!     .with_trigger(ContextSize::MessageCount(200))
//!     .with_keep(ContextSize::Tokens(20_000))
//!     .with_max_input_tokens(128_000)
//!     .with_max_output_tokens(8192)
//!     .with_summary_timeout(Duration::from_secs(60));
//! ```
//!
//! Values are range-checked when the compactor is built, not here.

use super::budget::{TokenCounter, approximate_counter};
use super::cutoff::{DEFAULT_MESSAGES_TO_KEEP, DEFAULT_PAIR_SEARCH_WINDOW};
use super::summarizer::{COMPACTION_PROMPT, DEFAULT_TRIM_TOKENS, SummarizerConfig};
use super::trigger::ContextSize;
use crate::Message;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Settings for one compactor.
#[derive(Clone)]
pub struct CompactionConfig {
    /// Conditions that start a compaction, OR-combined. Empty disables compaction.
    pub triggers: Vec<ContextSize>,
    /// How much recent history survives verbatim.
    pub keep: ContextSize,
    /// Model input ceiling. Overrides the model's profile.
    pub max_input_tokens: Option<usize>,
    /// Tokens reserved for the model's reply. Overrides the model's profile.
    pub max_output_tokens: Option<usize>,
    /// Token counter used when no provider usage is available, and for cutoff search.
    pub token_counter: TokenCounter,
    /// Summarization prompt template.
    pub prompt: String,
    /// Cap on tokens of history fed to the summarizer. `None` disables trimming.
    pub trim_tokens: Option<usize>,
    /// Look-around distance for tool-pair safety checks.
    pub pair_search_window: usize,
    /// Time limit on the summarization call, on both the blocking and async paths.
    pub summary_timeout: Option<Duration>,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            triggers: Vec::new(),
            keep: ContextSize::MessageCount(DEFAULT_MESSAGES_TO_KEEP),
            max_input_tokens: None,
            max_output_tokens: None,
            token_counter: approximate_counter(),
            prompt: COMPACTION_PROMPT.to_string(),
            trim_tokens: Some(DEFAULT_TRIM_TOKENS),
            pair_search_window: DEFAULT_PAIR_SEARCH_WINDOW,
            summary_timeout: None,
        }
    }
}

impl fmt::Debug for CompactionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompactionConfig")
            .field("triggers", &self.triggers)
            .field("keep", &self.keep)
            .field("max_input_tokens", &self.max_input_tokens)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("prompt_len", &self.prompt.len())
            .field("trim_tokens", &self.trim_tokens)
            .field("pair_search_window", &self.pair_search_window)
            .field("summary_timeout", &self.summary_timeout)
            .finish_non_exhaustive()
    }
}

impl CompactionConfig {
    /// Add a trigger condition.
    pub fn with_trigger(mut self, trigger: ContextSize) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Replace all trigger conditions.
    pub fn with_triggers(mut self, triggers: impl IntoIterator<Item = ContextSize>) -> Self {
        self.triggers = triggers.into_iter().collect();
        self
    }

    pub fn with_keep(mut self, keep: ContextSize) -> Self {
        self.keep = keep;
        self
    }

    pub fn with_max_input_tokens(mut self, tokens: usize) -> Self {
        self.max_input_tokens = Some(tokens);
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: usize) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Use a custom token counter. Must be monotonic in the message suffix.
    pub fn with_token_counter<F>(mut self, counter: F) -> Self
    where
        F: Fn(&[Message]) -> usize + Send + Sync + 'static,
    {
        self.token_counter = Arc::new(counter);
        self
    }

    /// Replace the summarization prompt. `{messages}` marks where the
    /// rendered history goes; without it the history is appended.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Set the summarizer input cap. `None` sends the full span.
    pub fn with_trim_tokens(mut self, tokens: Option<usize>) -> Self {
        self.trim_tokens = tokens;
        self
    }

    pub fn with_pair_search_window(mut self, window: usize) -> Self {
        self.pair_search_window = window;
        self
    }

    pub fn with_summary_timeout(mut self, timeout: Duration) -> Self {
        self.summary_timeout = Some(timeout);
        self
    }

    /// Whether any trigger is configured.
    pub fn is_enabled(&self) -> bool {
        !self.triggers.is_empty()
    }

    pub(crate) fn summarizer_config(&self) -> SummarizerConfig {
        SummarizerConfig {
            prompt: self.prompt.clone(),
            trim_tokens: self.trim_tokens,
            timeout: self.summary_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_disabled_and_keep_five() {
        let config = CompactionConfig::default();
        assert!(!config.is_enabled());
        assert_eq!(config.keep, ContextSize::MessageCount(5));
        assert_eq!(config.trim_tokens, Some(8192));
        assert_eq!(config.pair_search_window, 5);
        assert!(config.summary_timeout.is_none());
        assert!(config.prompt.contains("{messages}"));
    }

    #[test]
    fn builders_accumulate_and_replace_triggers() {
        let config = CompactionConfig::default()
            .with_trigger(ContextSize::Tokens(3000))
            .with_trigger(ContextSize::MessageCount(50));
        assert_eq!(config.triggers.len(), 2);

        let config = config.with_triggers([ContextSize::Fraction(0.8)]);
        assert_eq!(config.triggers, vec![ContextSize::Fraction(0.8)]);
        assert!(config.is_enabled());
    }

    #[test]
    fn custom_counter_is_used() {
        let config = CompactionConfig::default().with_token_counter(|m: &[Message]| m.len() * 7);
        assert_eq!((config.token_counter)(&[Message::user("a"), Message::user("b")]), 14);
    }

    #[test]
    fn summarizer_config_carries_settings() {
        let config = CompactionConfig::default()
            .with_prompt("Short: {messages}")
            .with_trim_tokens(None)
            .with_summary_timeout(Duration::from_secs(3));
        let summarizer = config.summarizer_config();
        assert_eq!(summarizer.prompt, "Short: {messages}");
        assert_eq!(summarizer.trim_tokens, None);
        assert_eq!(summarizer.timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn debug_omits_counter() {
        let rendered = format!("{:?}", CompactionConfig::default());
        assert!(rendered.starts_with("CompactionConfig"));
        assert!(rendered.contains("pair_search_window: 5"));
    }
}
