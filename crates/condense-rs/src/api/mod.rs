//! Model interaction layer: the summarization seam and its OpenRouter adapter.
//!
//! - [`model`]: the [`SummaryModel`] trait used by the summarizer, model
//!   context profiles, and [`OpenRouterSummaryModel`].
//! - [`retry`]: transient error classification (429, 5xx, network failures)
//!   with exponential backoff. Never retries 400/401 errors.

pub mod model;
pub mod retry;

// Re-export commonly used items at the module level.
pub use model::{ModelFuture, ModelProfile, OpenRouterSummaryModel, SummaryModel};
pub use retry::RetryConfig;
