//! Configuration error types.
//!
//! Every variant is raised while building a
//! [`Compactor`](crate::context::compactor::Compactor). Once construction
//! succeeds, compaction itself never returns an error.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("fractional {parameter} values must be in (0, 1], got {value}")]
    InvalidFraction { parameter: &'static str, value: f64 },

    #[error("{parameter} thresholds must be greater than 0, got {value}")]
    NonPositiveThreshold { parameter: &'static str, value: usize },

    #[error(
        "max input tokens are required for fractional limits: set them explicitly, \
         use absolute token counts, or use a model that reports its context window"
    )]
    MissingMaxInputTokens,

    #[error("invalid context size '{0}': expected fraction:<f>, tokens:<n> or messages:<n>")]
    InvalidContextSize(String),
}
