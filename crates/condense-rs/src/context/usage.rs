//! Current token usage of a conversation.
//!
//! The most reliable number is the one the provider reported with its last
//! response: it already includes tokenizer details, multimodal content, and
//! provider-side prompt formatting that no local estimate sees. Model
//! responses carry usage on nearly every turn, so scanning backwards for the
//! newest tagged assistant message usually stops after one or two steps.

use super::budget::{ContextBudget, TokenCounter};
use crate::Message;

/// Where a usage figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageSource {
    /// Reported by the provider on the newest usage-tagged assistant message.
    Reported,
    /// Computed by the configured token counter.
    Estimated,
}

/// Snapshot of context usage at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextUsage {
    pub tokens: usize,
    pub source: UsageSource,
}

impl ContextUsage {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self, budget: &ContextBudget) -> String {
        let marker = match self.source {
            UsageSource::Reported => "",
            UsageSource::Estimated => "~",
        };
        match (budget.usage_pct(self.tokens), budget.available_input_tokens()) {
            (Some(pct), Some(available)) => format!(
                "context: {marker}{} tokens ({:.0}% of {available})",
                self.tokens,
                pct * 100.0,
            ),
            _ => format!("context: {marker}{} tokens", self.tokens),
        }
    }
}

/// Best-known token count for a conversation.
#[derive(Clone)]
pub struct TokenUsageTracker {
    counter: TokenCounter,
}

impl TokenUsageTracker {
    pub fn new(counter: TokenCounter) -> Self {
        Self { counter }
    }

    /// Usage from the newest assistant message with non-zero reported usage,
    /// or the counter applied to the whole conversation.
    pub fn current_usage(&self, messages: &[Message]) -> ContextUsage {
        match messages.iter().rev().find_map(Message::reported_total_tokens) {
            Some(tokens) => ContextUsage {
                tokens,
                source: UsageSource::Reported,
            },
            None => ContextUsage {
                tokens: (self.counter)(messages),
                source: UsageSource::Estimated,
            },
        }
    }

    pub fn total_tokens(&self, messages: &[Message]) -> usize {
        self.current_usage(messages).tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UsageInfo;
    use std::sync::Arc;

    fn per_message(n: usize) -> TokenCounter {
        Arc::new(move |messages: &[Message]| messages.len() * n)
    }

    #[test]
    fn newest_reported_usage_wins() {
        let tracker = TokenUsageTracker::new(per_message(10));
        let messages = vec![
            Message::user("a"),
            Message::assistant_text("b").with_usage(UsageInfo::new(100, 20)),
            Message::user("c"),
            Message::assistant_text("d").with_usage(UsageInfo::new(300, 40)),
            Message::user("e"),
        ];
        let usage = tracker.current_usage(&messages);
        assert_eq!(usage.tokens, 340);
        assert_eq!(usage.source, UsageSource::Reported);
    }

    #[test]
    fn zero_usage_is_skipped() {
        let tracker = TokenUsageTracker::new(per_message(10));
        let messages = vec![
            Message::assistant_text("old").with_usage(UsageInfo::new(50, 5)),
            Message::assistant_text("new").with_usage(UsageInfo::default()),
        ];
        assert_eq!(tracker.total_tokens(&messages), 55);
    }

    #[test]
    fn falls_back_to_counter() {
        let tracker = TokenUsageTracker::new(per_message(10));
        let messages = vec![Message::system("s"), Message::user("u")];
        let usage = tracker.current_usage(&messages);
        assert_eq!(usage.tokens, 20);
        assert_eq!(usage.source, UsageSource::Estimated);
    }

    #[test]
    fn empty_conversation_is_zero() {
        let tracker = TokenUsageTracker::new(per_message(10));
        assert_eq!(tracker.total_tokens(&[]), 0);
    }

    #[test]
    fn log_string_marks_estimates() {
        let budget = ContextBudget::new(Some(1000), Some(200));
        let estimated = ContextUsage {
            tokens: 400,
            source: UsageSource::Estimated,
        };
        assert_eq!(
            estimated.to_log_string(&budget),
            "context: ~400 tokens (50% of 800)"
        );

        let reported = ContextUsage {
            tokens: 400,
            source: UsageSource::Reported,
        };
        assert_eq!(
            reported.to_log_string(&ContextBudget::default()),
            "context: 400 tokens"
        );
    }
}
