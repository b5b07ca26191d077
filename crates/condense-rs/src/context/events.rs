//! Events emitted by the [`Compactor`](super::compactor::Compactor) and the
//! observers that consume them.
//!
//! | Observer | Use case |
//! |----------|----------|
//! | [`NoopObserver`] | Tests, or hosts that do their own reporting |
//! | [`LoggingObserver`] | Structured logging via `tracing` (the default) |
//! | [`FnObserver`] | Quick closures for metrics or UI updates |
//! | Custom `impl CompactionObserver` | Full control |

use super::budget::ContextBudget;
use super::compactor::CompactionResult;
use super::trigger::ContextSize;
use super::usage::ContextUsage;
use tracing::{debug, info, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Why a turn passed without compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No trigger conditions are configured.
    Disabled,
    /// Usage is below every trigger threshold.
    BelowThreshold,
    /// A trigger fired, but the safe cutoff leaves nothing to summarize.
    NothingToSummarize,
}

/// Events emitted during one pre-model pass.
#[derive(Debug)]
pub enum CompactionEvent<'a> {
    /// Usage was measured and the triggers were evaluated.
    Evaluated {
        usage: &'a ContextUsage,
        budget: &'a ContextBudget,
        message_count: usize,
        /// The first condition that matched, if any.
        triggered: Option<ContextSize>,
    },
    /// The conversation is left unchanged.
    Skipped { reason: SkipReason },
    /// The summarization call failed; a fallback summary is used instead.
    SummaryFailed { error: &'a str },
    /// The conversation was compacted.
    Compacted {
        result: &'a CompactionResult,
        summarized: usize,
        preserved: usize,
    },
}

// ── Observers ──────────────────────────────────────────────────────

/// Receives [`CompactionEvent`]s.
///
/// Observers only watch; they cannot change the outcome of a pass.
pub trait CompactionObserver: Send + Sync {
    fn on_event(&self, event: &CompactionEvent<'_>) {
        let _ = event;
    }
}

/// Ignores every event.
pub struct NoopObserver;
impl CompactionObserver for NoopObserver {}

/// An observer backed by a closure.
///
/// ```ignore
/// let observer = FnObserver::new(|event: &CompactionEvent<'_>| {
///     if let CompactionEvent::Compacted { result, .. } = event {
///         metrics.record(result.tokens_saved());
///     }
/// });
/// ```
pub struct FnObserver<F>(F)
where
    F: Fn(&CompactionEvent<'_>) + Send + Sync;

impl<F> FnObserver<F>
where
    F: Fn(&CompactionEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> CompactionObserver for FnObserver<F>
where
    F: Fn(&CompactionEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &CompactionEvent<'_>) {
        (self.0)(event)
    }
}

/// Logs events via `tracing`. Completed compactions are logged at `info`,
/// failures at `warn`, everything else at `debug`.
pub struct LoggingObserver;

impl CompactionObserver for LoggingObserver {
    fn on_event(&self, event: &CompactionEvent<'_>) {
        match event {
            CompactionEvent::Evaluated {
                usage,
                budget,
                message_count,
                triggered,
            } => match triggered {
                Some(condition) => debug!(
                    "{} over {message_count} messages, trigger {condition} fired",
                    usage.to_log_string(budget)
                ),
                None => debug!(
                    "{} over {message_count} messages",
                    usage.to_log_string(budget)
                ),
            },
            CompactionEvent::Skipped { reason } => {
                debug!("Compaction skipped: {reason:?}");
            }
            CompactionEvent::SummaryFailed { error } => {
                warn!("Summary generation failed, using fallback: {error}");
            }
            CompactionEvent::Compacted {
                result,
                summarized,
                preserved,
            } => {
                info!(
                    "Compacted {summarized} messages ({preserved} kept): {} → {} tokens \
                     ({:.0}% of original, saved {})",
                    result.tokens_before,
                    result.tokens_after,
                    result.ratio * 100.0,
                    result.tokens_saved()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::usage::UsageSource;
    use std::sync::Mutex;

    #[test]
    fn fn_observer_receives_events() {
        let seen = Mutex::new(Vec::new());
        let observer = FnObserver::new(|event: &CompactionEvent<'_>| {
            if let CompactionEvent::Skipped { reason } = event {
                seen.lock().unwrap().push(*reason);
            }
        });
        observer.on_event(&CompactionEvent::Skipped {
            reason: SkipReason::BelowThreshold,
        });
        observer.on_event(&CompactionEvent::SummaryFailed { error: "boom" });
        assert_eq!(*seen.lock().unwrap(), vec![SkipReason::BelowThreshold]);
    }

    #[test]
    fn builtin_observers_accept_every_event() {
        let usage = ContextUsage {
            tokens: 900,
            source: UsageSource::Estimated,
        };
        let budget = ContextBudget::new(Some(1000), Some(100));
        let result = CompactionResult {
            summary: "s".into(),
            tokens_before: 900,
            tokens_after: 300,
            ratio: 1.0 / 3.0,
        };
        let events = [
            CompactionEvent::Evaluated {
                usage: &usage,
                budget: &budget,
                message_count: 12,
                triggered: Some(ContextSize::Fraction(0.8)),
            },
            CompactionEvent::Skipped {
                reason: SkipReason::Disabled,
            },
            CompactionEvent::SummaryFailed { error: "timeout" },
            CompactionEvent::Compacted {
                result: &result,
                summarized: 7,
                preserved: 5,
            },
        ];
        for event in &events {
            NoopObserver.on_event(event);
            LoggingObserver.on_event(event);
        }
    }
}
