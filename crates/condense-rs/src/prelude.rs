//! Convenience re-exports for common `condense-rs` types.
//!
//! ```ignore
//! use condense_rs::prelude::*;
//! ```
//!
//! Covers what a host agent loop needs to wire in compaction: messages, the
//! compactor and its configuration, the model seam, and observers. Pipeline
//! internals (cutoff selection, partitioning, the summary generator) are
//! left out; import those from [`crate::context`] directly.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Message, MessageKind, OpenRouterClient, ToolCall, UsageInfo};

// ── Compaction ──────────────────────────────────────────────────────
pub use crate::context::{
    CompactionConfig, CompactionEvent, CompactionObserver, CompactionOutcome, CompactionResult,
    Compactor, ContextSize, FnObserver, LoggingObserver, NoopObserver,
};
pub use crate::error::ConfigError;

// ── Models ──────────────────────────────────────────────────────────
pub use crate::api::{ModelProfile, OpenRouterSummaryModel, RetryConfig, SummaryModel};
