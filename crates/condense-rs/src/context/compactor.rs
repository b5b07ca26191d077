//! The pre-model compaction hook.
//!
//! [`Compactor`] ties the pipeline together. Once per turn, before the model
//! is called, the host hands it the live conversation:
//!
//! 1. backfill message ids ([`ensure_ids`]),
//! 2. measure usage ([`TokenUsageTracker`]) and evaluate triggers ([`TriggerEvaluator`]),
//! 3. pick a safe cutoff ([`CutoffSelector`]) and split the conversation ([`partition`]),
//! 4. summarize the old run ([`SummaryGenerator`]) and assemble the replacement.
//!
//! The result is either [`CompactionOutcome::NoOp`] or a complete replacement
//! conversation. Nothing is applied until the summary text exists, so a
//! cancelled async call leaves the host's conversation untouched.

use super::budget::ContextBudget;
use super::config::CompactionConfig;
use super::cutoff::CutoffSelector;
use super::events::{CompactionEvent, CompactionObserver, LoggingObserver, SkipReason};
use super::partition::{Partition, partition};
use super::summarizer::{Summary, SummaryGenerator};
use super::trigger::{ContextSize, TriggerEvaluator};
use super::usage::{ContextUsage, TokenUsageTracker};
use crate::api::model::SummaryModel;
use crate::error::ConfigError;
use crate::{Message, ensure_ids};
use std::sync::Arc;

/// Marker that opens the synthetic summary message.
pub const SUMMARY_PREFIX: &str = "[Context Summary]";

/// Statistics for one compaction. Informational only.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionResult {
    pub summary: String,
    /// Estimated tokens in the summarized run.
    pub tokens_before: usize,
    /// Estimated tokens in the summary message that replaced it.
    pub tokens_after: usize,
    /// `tokens_after / tokens_before`, or 0 when nothing was counted.
    pub ratio: f64,
}

impl CompactionResult {
    pub fn tokens_saved(&self) -> usize {
        self.tokens_before.saturating_sub(self.tokens_after)
    }
}

/// What the host should do with its conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum CompactionOutcome {
    /// Leave the conversation unchanged.
    NoOp,
    /// Clear the conversation and replace it with `messages`.
    Replace {
        messages: Vec<Message>,
        result: CompactionResult,
    },
}

impl CompactionOutcome {
    pub fn is_noop(&self) -> bool {
        matches!(self, CompactionOutcome::NoOp)
    }
}

/// The decision half of a pass: everything up to, but not including, the
/// model call.
#[derive(Debug, Clone)]
pub struct CompactionPlan {
    /// The conversation with every id filled in.
    pub messages: Vec<Message>,
    pub usage: ContextUsage,
    /// The trigger condition that fired, if any.
    pub triggered: Option<ContextSize>,
    /// Effective cutoff after partitioning. 0 when not triggered.
    pub cutoff: usize,
    /// Why the pass will not compact, if it won't.
    pub skip: Option<SkipReason>,
}

impl CompactionPlan {
    pub fn will_compact(&self) -> bool {
        self.skip.is_none()
    }

    pub fn partition(&self) -> Partition<'_> {
        partition(&self.messages, self.cutoff)
    }
}

/// Context-window compactor, invoked before each model turn.
pub struct Compactor {
    config: CompactionConfig,
    budget: ContextBudget,
    tracker: TokenUsageTracker,
    trigger: TriggerEvaluator,
    selector: CutoffSelector,
    summarizer: SummaryGenerator,
    observer: Box<dyn CompactionObserver>,
}

impl Compactor {
    /// Build a compactor, validating the configuration.
    ///
    /// Limits not set in `config` are taken from the model's
    /// [`profile`](SummaryModel::profile).
    pub fn new(
        config: CompactionConfig,
        model: Arc<dyn SummaryModel>,
    ) -> Result<Self, ConfigError> {
        for trigger in &config.triggers {
            trigger.validate("trigger")?;
        }
        config.keep.validate("keep")?;
        if config.pair_search_window == 0 {
            return Err(ConfigError::NonPositiveThreshold {
                parameter: "pair_search_window",
                value: 0,
            });
        }
        if config.trim_tokens == Some(0) {
            return Err(ConfigError::NonPositiveThreshold {
                parameter: "trim_tokens",
                value: 0,
            });
        }

        let budget = ContextBudget::resolve(
            config.max_input_tokens,
            config.max_output_tokens,
            model.profile(),
        );
        let needs_input = config
            .triggers
            .iter()
            .chain(std::iter::once(&config.keep))
            .any(ContextSize::requires_max_input);
        if needs_input && budget.max_input_tokens().is_none() {
            return Err(ConfigError::MissingMaxInputTokens);
        }

        let counter = config.token_counter.clone();
        Ok(Self {
            budget,
            tracker: TokenUsageTracker::new(counter.clone()),
            trigger: TriggerEvaluator::new(config.triggers.clone(), budget),
            selector: CutoffSelector::new(
                config.keep,
                budget,
                counter.clone(),
                config.pair_search_window,
            ),
            summarizer: SummaryGenerator::new(model, counter, config.summarizer_config()),
            observer: Box::new(LoggingObserver),
            config,
        })
    }

    /// Replace the default [`LoggingObserver`].
    pub fn with_observer(mut self, observer: impl CompactionObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    /// The resolved input ceiling and output reservation.
    pub fn budget(&self) -> ContextBudget {
        self.budget
    }

    /// Evaluate the conversation without calling the model.
    pub fn plan(&self, messages: &[Message]) -> CompactionPlan {
        let messages = ensure_ids(messages);
        let usage = self.tracker.current_usage(&messages);
        let triggered = self.trigger.matching_condition(messages.len(), usage.tokens);
        self.observer.on_event(&CompactionEvent::Evaluated {
            usage: &usage,
            budget: &self.budget,
            message_count: messages.len(),
            triggered,
        });

        let (cutoff, skip) = if !self.trigger.is_enabled() {
            (0, Some(SkipReason::Disabled))
        } else if triggered.is_none() {
            (0, Some(SkipReason::BelowThreshold))
        } else {
            let selected = self.selector.select(&messages);
            let part = partition(&messages, selected);
            // A zero cutoff means no safe split exists.
            let skip =
                (selected == 0 || part.is_noop()).then_some(SkipReason::NothingToSummarize);
            (part.cutoff, skip)
        };
        if let Some(reason) = skip {
            self.observer.on_event(&CompactionEvent::Skipped { reason });
        }

        CompactionPlan {
            messages,
            usage,
            triggered,
            cutoff,
            skip,
        }
    }

    /// Run one pass, blocking on the summarization call if one is needed.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`before_model_async`](Self::before_model_async) there.
    pub fn before_model(&self, messages: &[Message]) -> CompactionOutcome {
        let plan = self.plan(messages);
        if !plan.will_compact() {
            return CompactionOutcome::NoOp;
        }
        let part = plan.partition();
        let summary = self.summarizer.summarize(part.to_summarize);
        self.assemble(part, summary)
    }

    /// Run one pass without blocking.
    ///
    /// Dropping the future before it completes leaves the caller's
    /// conversation as it was.
    pub async fn before_model_async(&self, messages: &[Message]) -> CompactionOutcome {
        let plan = self.plan(messages);
        if !plan.will_compact() {
            return CompactionOutcome::NoOp;
        }
        let part = plan.partition();
        let summary = self.summarizer.summarize_async(part.to_summarize).await;
        self.assemble(part, summary)
    }

    fn assemble(&self, part: Partition<'_>, summary: Summary) -> CompactionOutcome {
        if let Some(ref error) = summary.failure {
            self.observer
                .on_event(&CompactionEvent::SummaryFailed { error: error.as_str() });
        }

        let summary_message = Message::system(format!("{SUMMARY_PREFIX}\n\n{}", summary.text))
            .with_id(uuid::Uuid::new_v4().to_string());

        let counter = &self.config.token_counter;
        let tokens_before = counter(part.to_summarize);
        let tokens_after = counter(std::slice::from_ref(&summary_message));
        let ratio = if tokens_before > 0 {
            tokens_after as f64 / tokens_before as f64
        } else {
            0.0
        };
        let result = CompactionResult {
            summary: summary.text,
            tokens_before,
            tokens_after,
            ratio,
        };

        let mut messages = Vec::with_capacity(part.preserved.len() + 2);
        messages.extend(part.system.cloned());
        messages.push(summary_message);
        messages.extend_from_slice(part.preserved);

        self.observer.on_event(&CompactionEvent::Compacted {
            result: &result,
            summarized: part.to_summarize.len(),
            preserved: part.preserved.len(),
        });
        CompactionOutcome::Replace { messages, result }
    }
}
