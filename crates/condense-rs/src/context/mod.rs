//! Context window management: deciding when to compact, how much to keep,
//! and what replaces the rest.
//!
//! One pass of the [`Compactor`] runs these stages in order:
//!
//! 1. **[`usage`]**: [`TokenUsageTracker`] takes the provider-reported total
//!    from the newest tagged assistant message, or estimates with the
//!    configured counter.
//!
//! 2. **[`budget`]** and **[`trigger`]**: [`ContextBudget`] resolves the input
//!    ceiling and output reservation; [`TriggerEvaluator`] checks the
//!    OR-combined [`ContextSize`] conditions against it.
//!
//! 3. **[`cutoff`]**: [`CutoffSelector`] picks the split point from the keep
//!    target, walking back until [`PairSafetyIndex`] confirms no tool call is
//!    cut off from its result.
//!
//! 4. **[`partition`]**: holds out the leading system message and splits the
//!    rest into a run to summarize and a tail kept verbatim.
//!
//! 5. **[`summarizer`]**: [`SummaryGenerator`] renders, trims, and summarizes
//!    the old run, falling back to a marker on failure.
//!
//! Configuration lives in [`config`]; progress is reported through [`events`].

pub mod budget;
pub mod compactor;
pub mod config;
pub mod cutoff;
pub mod events;
pub mod partition;
pub mod summarizer;
pub mod trigger;
pub mod usage;

pub use budget::{
    ContextBudget, DEFAULT_CHARS_PER_TOKEN, TokenCounter, approximate_counter,
    approximate_token_count,
};
pub use compactor::{
    CompactionOutcome, CompactionPlan, CompactionResult, Compactor, SUMMARY_PREFIX,
};
pub use config::CompactionConfig;
pub use cutoff::{CutoffSelector, PairSafetyIndex};
pub use events::{
    CompactionEvent, CompactionObserver, FnObserver, LoggingObserver, NoopObserver, SkipReason,
};
pub use summarizer::{SummarizerConfig, Summary, SummaryGenerator};
pub use trigger::{ContextSize, TriggerEvaluator};
pub use usage::{ContextUsage, TokenUsageTracker, UsageSource};
