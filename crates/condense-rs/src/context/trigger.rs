//! Trigger conditions: deciding *when* to compact.
//!
//! Conditions are OR-combined. Token-based conditions subtract the output
//! reservation first, so a compaction is never skipped only to leave the
//! model no room for its reply.

use super::budget::ContextBudget;
use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

/// A context size: a fraction of the available input budget, an absolute
/// token count, or a message count.
///
/// Used both for trigger conditions and for the amount of history to keep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContextSize {
    /// Fraction of the available input budget, in (0, 1].
    Fraction(f64),
    /// Absolute token count, > 0.
    Tokens(usize),
    /// Message count, > 0.
    MessageCount(usize),
}

impl ContextSize {
    /// Check the value is in range. `parameter` names the setting in errors.
    pub fn validate(&self, parameter: &'static str) -> Result<(), ConfigError> {
        match *self {
            ContextSize::Fraction(value) if !(value > 0.0 && value <= 1.0) => {
                Err(ConfigError::InvalidFraction { parameter, value })
            }
            ContextSize::Tokens(0) | ContextSize::MessageCount(0) => {
                Err(ConfigError::NonPositiveThreshold {
                    parameter,
                    value: 0,
                })
            }
            _ => Ok(()),
        }
    }

    /// Whether resolving this size needs the model's input ceiling.
    pub fn requires_max_input(&self) -> bool {
        matches!(self, ContextSize::Fraction(_))
    }
}

impl fmt::Display for ContextSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextSize::Fraction(v) => write!(f, "fraction:{v}"),
            ContextSize::Tokens(n) => write!(f, "tokens:{n}"),
            ContextSize::MessageCount(n) => write!(f, "messages:{n}"),
        }
    }
}

impl FromStr for ContextSize {
    type Err = ConfigError;

    /// Parse `fraction:<f>`, `tokens:<n>` or `messages:<n>`.
    ///
    /// Only the syntax is checked here; ranges are checked by [`validate`](Self::validate).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidContextSize(s.to_string());
        let (kind, value) = s.split_once(':').ok_or_else(invalid)?;
        let value = value.trim();
        match kind.trim().to_ascii_lowercase().as_str() {
            "fraction" => value
                .parse()
                .map(ContextSize::Fraction)
                .map_err(|_| invalid()),
            "tokens" => value.parse().map(ContextSize::Tokens).map_err(|_| invalid()),
            "messages" => value
                .parse()
                .map(ContextSize::MessageCount)
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

/// Evaluates the configured trigger conditions against current usage.
#[derive(Debug, Clone)]
pub struct TriggerEvaluator {
    conditions: Vec<ContextSize>,
    budget: ContextBudget,
}

impl TriggerEvaluator {
    pub fn new(conditions: Vec<ContextSize>, budget: ContextBudget) -> Self {
        Self { conditions, budget }
    }

    /// No conditions means compaction is disabled.
    pub fn is_enabled(&self) -> bool {
        !self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[ContextSize] {
        &self.conditions
    }

    /// Whether any condition matches.
    pub fn should_compact(&self, message_count: usize, total_tokens: usize) -> bool {
        self.matching_condition(message_count, total_tokens).is_some()
    }

    /// The first condition that matches, if any.
    pub fn matching_condition(
        &self,
        message_count: usize,
        total_tokens: usize,
    ) -> Option<ContextSize> {
        self.conditions
            .iter()
            .copied()
            .find(|condition| self.matches(*condition, message_count, total_tokens))
    }

    fn matches(&self, condition: ContextSize, message_count: usize, total_tokens: usize) -> bool {
        match condition {
            ContextSize::MessageCount(n) => message_count >= n,
            ContextSize::Tokens(n) => match n.checked_sub(self.budget.max_output_tokens()) {
                Some(available) if available > 0 => total_tokens >= available,
                _ => false,
            },
            ContextSize::Fraction(f) => self
                .budget
                .fraction_of_available(f)
                .is_some_and(|threshold| total_tokens >= threshold),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator(
        conditions: Vec<ContextSize>,
        input: Option<usize>,
        output: Option<usize>,
    ) -> TriggerEvaluator {
        TriggerEvaluator::new(conditions, ContextBudget::new(input, output))
    }

    #[test]
    fn fraction_threshold_reserves_output() {
        let eval = evaluator(vec![ContextSize::Fraction(0.8)], Some(1000), Some(200));
        assert!(!eval.should_compact(10, 639));
        assert!(eval.should_compact(10, 640));
    }

    #[test]
    fn tokens_threshold_reserves_output() {
        let eval = evaluator(vec![ContextSize::Tokens(1000)], None, Some(200));
        assert!(!eval.should_compact(1, 799));
        assert!(eval.should_compact(1, 800));
    }

    #[test]
    fn tokens_threshold_never_fires_when_reservation_exceeds_it() {
        let eval = evaluator(vec![ContextSize::Tokens(200)], None, Some(200));
        assert!(!eval.should_compact(1, 1_000_000));
    }

    #[test]
    fn message_count_threshold() {
        let eval = evaluator(vec![ContextSize::MessageCount(5)], None, None);
        assert!(!eval.should_compact(4, 0));
        assert!(eval.should_compact(5, 0));
    }

    #[test]
    fn conditions_are_or_combined() {
        let eval = evaluator(
            vec![ContextSize::MessageCount(50), ContextSize::Tokens(1000)],
            None,
            None,
        );
        assert_eq!(
            eval.matching_condition(3, 1500),
            Some(ContextSize::Tokens(1000))
        );
        assert_eq!(
            eval.matching_condition(60, 10),
            Some(ContextSize::MessageCount(50))
        );
        assert_eq!(eval.matching_condition(3, 10), None);
    }

    #[test]
    fn no_conditions_disables() {
        let eval = evaluator(vec![], Some(1000), None);
        assert!(!eval.is_enabled());
        assert!(!eval.should_compact(1_000, 1_000_000));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        assert!(ContextSize::Fraction(0.0).validate("trigger").is_err());
        assert!(ContextSize::Fraction(1.5).validate("trigger").is_err());
        assert!(ContextSize::Fraction(f64::NAN).validate("trigger").is_err());
        assert!(ContextSize::Fraction(1.0).validate("trigger").is_ok());
        assert_eq!(
            ContextSize::MessageCount(0).validate("keep"),
            Err(ConfigError::NonPositiveThreshold {
                parameter: "keep",
                value: 0
            })
        );
        assert!(ContextSize::Tokens(0).validate("keep").is_err());
    }

    #[test]
    fn parses_and_displays() {
        assert_eq!(
            "fraction:0.8".parse::<ContextSize>().unwrap(),
            ContextSize::Fraction(0.8)
        );
        assert_eq!(
            "Tokens: 3000".parse::<ContextSize>().unwrap(),
            ContextSize::Tokens(3000)
        );
        assert_eq!(
            "messages:5".parse::<ContextSize>().unwrap(),
            ContextSize::MessageCount(5)
        );
        assert!("bytes:5".parse::<ContextSize>().is_err());
        assert!("messages".parse::<ContextSize>().is_err());
        assert!("tokens:-3".parse::<ContextSize>().is_err());
        assert_eq!(ContextSize::MessageCount(5).to_string(), "messages:5");
    }
}
