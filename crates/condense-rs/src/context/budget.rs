//! Context budget resolution and approximate token counting.
//!
//! [`ContextBudget`] answers two questions for the rest of the pipeline: how
//! many input tokens the model accepts, and how many of those must be kept
//! free for the model's own reply. Each limit comes from explicit
//! configuration first, then from what the model reports about itself, and
//! is otherwise unknown. An unknown output reservation is treated as zero.

use crate::Message;
use crate::api::model::ModelProfile;
use std::sync::Arc;

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Per-message framing overhead (role markers, separators).
const MESSAGE_OVERHEAD_TOKENS: usize = 3;

/// Counts the tokens in a run of messages.
///
/// Must be monotonic: removing messages from the front of a run never
/// increases its count. The cutoff search relies on this.
pub type TokenCounter = Arc<dyn Fn(&[Message]) -> usize + Send + Sync>;

/// Estimate tokens for a run of messages from character counts.
///
/// Counts message text, tool-call names and arguments, and tool names, plus
/// a small fixed overhead per message.
pub fn approximate_token_count(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|msg| {
            let mut chars = msg.text().chars().count();
            for call in msg.tool_calls() {
                chars += call.function.name.len() + call.function.arguments.len();
            }
            if let crate::MessageKind::Tool {
                name: Some(ref name),
                ..
            } = msg.kind
            {
                chars += name.len();
            }
            (chars as f64 / DEFAULT_CHARS_PER_TOKEN).ceil() as usize + MESSAGE_OVERHEAD_TOKENS
        })
        .sum()
}

/// The default [`TokenCounter`], backed by [`approximate_token_count`].
pub fn approximate_counter() -> TokenCounter {
    Arc::new(approximate_token_count)
}

/// Resolved input ceiling and output reservation for one model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextBudget {
    max_input_tokens: Option<usize>,
    max_output_tokens: Option<usize>,
}

impl ContextBudget {
    /// Budget with explicitly known limits.
    pub fn new(max_input_tokens: Option<usize>, max_output_tokens: Option<usize>) -> Self {
        Self {
            max_input_tokens,
            max_output_tokens,
        }
    }

    /// Resolve limits: explicit values win, then the model's profile.
    pub fn resolve(
        explicit_input: Option<usize>,
        explicit_output: Option<usize>,
        profile: ModelProfile,
    ) -> Self {
        Self {
            max_input_tokens: explicit_input.or(profile.max_input_tokens),
            max_output_tokens: explicit_output.or(profile.max_output_tokens),
        }
    }

    /// Maximum input tokens, if known.
    pub fn max_input_tokens(&self) -> Option<usize> {
        self.max_input_tokens
    }

    /// Tokens reserved for the model's reply. Unknown counts as 0.
    pub fn max_output_tokens(&self) -> usize {
        self.max_output_tokens.unwrap_or(0)
    }

    /// Input ceiling minus the output reservation, if the ceiling is known.
    pub fn available_input_tokens(&self) -> Option<usize> {
        self.max_input_tokens
            .map(|max| max.saturating_sub(self.max_output_tokens()))
    }

    /// `floor(available × fraction)`, never below 1.
    ///
    /// `None` when the input ceiling is unknown.
    pub fn fraction_of_available(&self, fraction: f64) -> Option<usize> {
        self.available_input_tokens()
            .map(|available| ((available as f64 * fraction).floor() as usize).max(1))
    }

    /// Share of the available input budget used by `tokens`, if the ceiling is known.
    pub fn usage_pct(&self, tokens: usize) -> Option<f64> {
        self.available_input_tokens().map(|available| {
            if available > 0 {
                tokens as f64 / available as f64
            } else {
                1.0
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ToolCall, UsageInfo};

    #[test]
    fn explicit_limits_override_profile() {
        let profile = ModelProfile {
            max_input_tokens: Some(200_000),
            max_output_tokens: Some(8192),
        };
        let budget = ContextBudget::resolve(Some(128_000), None, profile);
        assert_eq!(budget.max_input_tokens(), Some(128_000));
        assert_eq!(budget.max_output_tokens(), 8192);
    }

    #[test]
    fn unknown_limits_resolve_to_none_and_zero() {
        let budget = ContextBudget::resolve(None, None, ModelProfile::default());
        assert_eq!(budget.max_input_tokens(), None);
        assert_eq!(budget.max_output_tokens(), 0);
        assert_eq!(budget.available_input_tokens(), None);
        assert_eq!(budget.fraction_of_available(0.5), None);
    }

    #[test]
    fn fraction_subtracts_output_reservation() {
        let budget = ContextBudget::new(Some(1000), Some(200));
        assert_eq!(budget.available_input_tokens(), Some(800));
        assert_eq!(budget.fraction_of_available(0.8), Some(640));
    }

    #[test]
    fn fraction_never_drops_below_one() {
        let budget = ContextBudget::new(Some(100), Some(500));
        assert_eq!(budget.available_input_tokens(), Some(0));
        assert_eq!(budget.fraction_of_available(0.5), Some(1));
    }

    #[test]
    fn usage_pct_against_available() {
        let budget = ContextBudget::new(Some(1000), Some(200));
        assert_eq!(budget.usage_pct(400), Some(0.5));
        assert_eq!(ContextBudget::default().usage_pct(400), None);
    }

    #[test]
    fn approximate_count_grows_with_content() {
        let short = approximate_token_count(&[Message::user("hi")]);
        let long = approximate_token_count(&[Message::user("x".repeat(3500))]);
        assert_eq!(short, 1 + MESSAGE_OVERHEAD_TOKENS);
        assert_eq!(long, 1000 + MESSAGE_OVERHEAD_TOKENS);
        assert_eq!(approximate_token_count(&[]), 0);
    }

    #[test]
    fn approximate_count_includes_tool_calls() {
        let plain = Message::assistant_tool_calls(vec![]);
        let with_call = Message::assistant_tool_calls(vec![ToolCall::function(
            "c1",
            "read_file",
            r#"{"path": "src/main.rs"}"#,
        )]);
        assert!(approximate_token_count(&[with_call]) > approximate_token_count(&[plain]));
    }

    #[test]
    fn approximate_count_ignores_usage_metadata() {
        let bare = Message::assistant_text("hello");
        let tagged = bare.clone().with_usage(UsageInfo::new(10_000, 500));
        assert_eq!(
            approximate_token_count(&[bare]),
            approximate_token_count(&[tagged])
        );
    }
}
