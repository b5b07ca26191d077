//! Structured summarization of the messages being compacted away.
//!
//! The span is rendered as numbered, role-labelled lines, trimmed to a token
//! cap (newest messages win), wrapped in an eight-section prompt, and sent
//! to a [`SummaryModel`]. Any failure (transport error, timeout, empty
//! response) produces a short fallback summary instead of an error, so a
//! compaction always completes.

use super::budget::TokenCounter;
use crate::api::model::{SummaryModel, with_timeout};
use crate::{Message, MessageKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Placeholder in the prompt template replaced by the rendered messages.
pub const MESSAGES_PLACEHOLDER: &str = "{messages}";

/// Default cap on tokens fed into the summarizer.
pub const DEFAULT_TRIM_TOKENS: usize = 8192;

/// Summary used when there is nothing to summarize.
pub const NO_HISTORY_SUMMARY: &str = "No previous conversation history.";

/// Prefix of the fallback summary produced when the model call fails.
pub const FALLBACK_PREFIX: &str = "[Compaction failed:";

/// The default summarization prompt. Requests an eight-section structured
/// summary tuned for coding and tool-use sessions.
pub const COMPACTION_PROMPT: &str = "\
Your task is to create a detailed summary of the conversation so far, paying close \
attention to the user's explicit requests and the assistant's previous actions. The \
summary replaces the conversation, so it must capture every technical detail, code \
pattern, and decision needed to continue the work without losing context.

Your summary must contain these sections:

1. Primary Request and Intent: all of the user's explicit requests and intents, in detail.
2. Key Technical Concepts: important technologies, frameworks, and concepts discussed.
3. Files and Code Sections: files and code sections examined, modified, or created. \
Pay special attention to the most recent messages and include code snippets where useful.
4. Errors and Fixes: every error encountered and how it was fixed, including user feedback.
5. Problem Solving: problems solved and any troubleshooting still in progress.
6. All User Messages: every user message that is not a tool result, verbatim.
7. Pending Tasks: tasks the assistant was explicitly asked to do that are not done yet.
8. Current Work and Next Step: precisely what was being worked on immediately before \
this summary, and the next step directly in line with it.

Rules:
- Only include facts stated in the messages. Do not infer or extrapolate.
- Preserve file paths, function names, and error messages verbatim.
- Respond ONLY with the structured summary, without any other commentary.

<messages>
{messages}
</messages>
";

/// Configuration for the summary generator.
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// Prompt template. [`MESSAGES_PLACEHOLDER`] is replaced by the rendered
    /// messages; if absent, the messages are appended.
    pub prompt: String,
    /// Maximum tokens of rendered history sent to the model. `None` sends everything.
    pub trim_tokens: Option<usize>,
    /// Time limit for the model call. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            prompt: COMPACTION_PROMPT.to_string(),
            trim_tokens: Some(DEFAULT_TRIM_TOKENS),
            timeout: None,
        }
    }
}

/// A generated summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Summary text. A fallback marker if generation failed.
    pub text: String,
    /// The failure that produced a fallback, if any.
    pub failure: Option<String>,
}

impl Summary {
    fn generated(text: String) -> Self {
        Self {
            text,
            failure: None,
        }
    }

    fn fallback(error: String) -> Self {
        Self {
            text: format!("{FALLBACK_PREFIX} {error}. Retaining recent context only.]"),
            failure: Some(error),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.failure.is_some()
    }
}

/// Produces summaries of message spans via a [`SummaryModel`].
pub struct SummaryGenerator {
    model: Arc<dyn SummaryModel>,
    counter: TokenCounter,
    config: SummarizerConfig,
}

impl SummaryGenerator {
    pub fn new(
        model: Arc<dyn SummaryModel>,
        counter: TokenCounter,
        config: SummarizerConfig,
    ) -> Self {
        Self {
            model,
            counter,
            config,
        }
    }

    /// Summarize `messages`, blocking the current thread on the model call.
    pub fn summarize(&self, messages: &[Message]) -> Summary {
        let Some(prompt) = self.prompt_for(messages) else {
            return Summary::generated(NO_HISTORY_SUMMARY.to_string());
        };
        finish(self.model.complete(&prompt, self.config.timeout))
    }

    /// Summarize `messages` without blocking. Same semantics as [`summarize`](Self::summarize).
    ///
    /// Dropping the returned future cancels the model call.
    pub async fn summarize_async(&self, messages: &[Message]) -> Summary {
        let Some(prompt) = self.prompt_for(messages) else {
            return Summary::generated(NO_HISTORY_SUMMARY.to_string());
        };
        finish(with_timeout(self.model.complete_async(&prompt), self.config.timeout).await)
    }

    /// The full prompt for `messages`, or `None` if there is nothing to summarize.
    pub fn prompt_for(&self, messages: &[Message]) -> Option<String> {
        if messages.is_empty() {
            return None;
        }
        let rendered = self.render_trimmed(messages);
        Some(if self.config.prompt.contains(MESSAGES_PLACEHOLDER) {
            self.config.prompt.replace(MESSAGES_PLACEHOLDER, &rendered)
        } else {
            format!("{}\n\n<messages>\n{rendered}\n</messages>", self.config.prompt)
        })
    }

    /// Render `messages`, keeping only the newest ones that fit the token cap.
    pub fn render_trimmed(&self, messages: &[Message]) -> String {
        let Some(cap) = self.config.trim_tokens else {
            return render_messages(messages);
        };
        if (self.counter)(messages) <= cap {
            return render_messages(messages);
        }

        let mut used = 0;
        let mut start = messages.len();
        for (i, msg) in messages.iter().enumerate().rev() {
            let tokens = (self.counter)(std::slice::from_ref(msg));
            if used + tokens > cap {
                break;
            }
            used += tokens;
            start = i;
        }
        // Keep at least the newest message, even if it alone exceeds the cap.
        if start == messages.len() {
            start = messages.len() - 1;
        }

        let kept = &messages[start..];
        if start == 0 {
            return render_messages(kept);
        }
        debug!(
            "Summarizer input trimmed: kept {} of {} messages (cap {cap} tokens)",
            kept.len(),
            messages.len()
        );
        format!(
            "[{start} earlier messages omitted]\n\n{}",
            render_messages(kept)
        )
    }
}

/// Render messages as numbered `[i] Role: content` blocks.
pub fn render_messages(messages: &[Message]) -> String {
    messages
        .iter()
        .enumerate()
        .map(|(i, msg)| format!("[{}] {}: {}", i + 1, role_label(msg), body(msg)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn role_label(msg: &Message) -> String {
    match msg.kind {
        MessageKind::System => "System".to_string(),
        MessageKind::User => "User".to_string(),
        MessageKind::Assistant { .. } => "Assistant".to_string(),
        MessageKind::Tool { ref name, .. } => {
            format!("Tool({})", name.as_deref().unwrap_or("unknown"))
        }
    }
}

fn body(msg: &Message) -> String {
    let text = msg.text();
    let calls = msg.tool_calls();
    if calls.is_empty() {
        return text.into_owned();
    }
    let listed = calls
        .iter()
        .map(|c| format!("{}({})", c.function.name, c.function.arguments))
        .collect::<Vec<_>>()
        .join(", ");
    if text.is_empty() {
        format!("[tool calls: {listed}]")
    } else {
        format!("{text}\n[tool calls: {listed}]")
    }
}

fn finish(response: Result<String, String>) -> Summary {
    match response {
        Ok(text) if !text.trim().is_empty() => Summary::generated(text.trim().to_string()),
        Ok(_) => {
            warn!("Summarization returned an empty response");
            Summary::fallback("empty summary response".to_string())
        }
        Err(e) => {
            warn!("Summarization failed: {e}");
            Summary::fallback(e)
        }
    }
}
