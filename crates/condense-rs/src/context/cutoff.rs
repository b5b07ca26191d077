//! Cutoff selection: deciding *how much* history survives a compaction.
//!
//! A cutoff index `c` splits the conversation into `messages[..c]` (to be
//! summarized) and `messages[c..]` (kept verbatim). A cutoff is *safe* when
//! no assistant tool call ends up on a different side from the tool message
//! that answers it. Providers reject orphaned tool results, so an unsafe
//! cutoff would break the very next model call.
//!
//! Safety is checked over a bounded window around the candidate. Assistant
//! messages further than the window from the candidate are not inspected, so
//! a call and its result separated by more than the window are unprotected.
//! Widen the window with
//! [`CompactionConfig::with_pair_search_window`](super::config::CompactionConfig::with_pair_search_window)
//! if your tools can interleave that much.

use super::budget::{ContextBudget, TokenCounter};
use super::trigger::ContextSize;
use crate::{Message, MessageKind};
use std::collections::HashMap;

/// Default look-around distance, in messages, for tool-pair safety checks.
pub const DEFAULT_PAIR_SEARCH_WINDOW: usize = 5;

/// Messages kept when a token-based keep target cannot be resolved.
pub const DEFAULT_MESSAGES_TO_KEEP: usize = 5;

/// Answers "would cutting here sever a tool call from its result?".
pub struct PairSafetyIndex<'a> {
    messages: &'a [Message],
    /// Call id → indices of tool messages answering it.
    answers: HashMap<&'a str, Vec<usize>>,
    window: usize,
}

impl<'a> PairSafetyIndex<'a> {
    pub fn new(messages: &'a [Message], window: usize) -> Self {
        let mut answers: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for (i, msg) in messages.iter().enumerate() {
            match msg.kind {
                MessageKind::Tool {
                    ref tool_call_id, ..
                } => answers.entry(tool_call_id.as_str()).or_default().push(i),
                MessageKind::System | MessageKind::User | MessageKind::Assistant { .. } => {}
            }
        }
        Self {
            messages,
            answers,
            window,
        }
    }

    /// Whether splitting at `cutoff` keeps every tool pair near it intact.
    pub fn is_safe(&self, cutoff: usize) -> bool {
        if cutoff >= self.messages.len() {
            return true;
        }
        let start = cutoff.saturating_sub(self.window);
        let end = (cutoff + self.window).min(self.messages.len());
        (start..end).all(|i| !self.severs(i, cutoff))
    }

    /// The largest safe index `<= candidate`. Index 0 is always safe.
    pub fn nearest_safe_at_or_below(&self, candidate: usize) -> usize {
        (0..=candidate.min(self.messages.len()))
            .rev()
            .find(|&i| self.is_safe(i))
            .unwrap_or(0)
    }

    fn severs(&self, index: usize, cutoff: usize) -> bool {
        let calls = match self.messages[index].kind {
            MessageKind::Assistant { ref tool_calls } => tool_calls,
            MessageKind::System | MessageKind::User | MessageKind::Tool { .. } => return false,
        };
        let assistant_before = index < cutoff;
        calls
            .iter()
            .filter_map(|call| self.answers.get(call.id.as_str()))
            .flatten()
            .any(|&answer| (answer < cutoff) != assistant_before)
    }
}

/// Chooses the split point for a compaction.
#[derive(Clone)]
pub struct CutoffSelector {
    keep: ContextSize,
    budget: ContextBudget,
    counter: TokenCounter,
    window: usize,
}

impl CutoffSelector {
    pub fn new(
        keep: ContextSize,
        budget: ContextBudget,
        counter: TokenCounter,
        window: usize,
    ) -> Self {
        Self {
            keep,
            budget,
            counter,
            window,
        }
    }

    /// Select a safe cutoff. `0` means nothing should be summarized.
    pub fn select(&self, messages: &[Message]) -> usize {
        if messages.is_empty() {
            return 0;
        }
        let safety = PairSafetyIndex::new(messages, self.window);
        match self.keep {
            ContextSize::MessageCount(keep) => count_cutoff(messages, &safety, keep),
            ContextSize::Tokens(_) | ContextSize::Fraction(_) => match self.token_target() {
                Some(target) => self.token_cutoff(messages, &safety, target),
                None => count_cutoff(messages, &safety, DEFAULT_MESSAGES_TO_KEEP),
            },
        }
    }

    /// Token budget for the preserved tail, for token and fraction keep specs.
    pub fn token_target(&self) -> Option<usize> {
        match self.keep {
            ContextSize::Tokens(n) => Some(n.max(1)),
            ContextSize::Fraction(f) => self.budget.fraction_of_available(f),
            ContextSize::MessageCount(_) => None,
        }
    }

    /// Smallest `i` in `0..=len` with `count(messages[i..]) <= target`.
    ///
    /// Binary search; relies on the counter being monotonic in the suffix.
    pub fn search_token_cutoff(&self, messages: &[Message], target: usize) -> usize {
        let (mut lo, mut hi) = (0, messages.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if (self.counter)(&messages[mid..]) <= target {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    fn token_cutoff(
        &self,
        messages: &[Message],
        safety: &PairSafetyIndex<'_>,
        target: usize,
    ) -> usize {
        if (self.counter)(messages) <= target {
            return 0;
        }
        let mut candidate = self.search_token_cutoff(messages, target);
        // Always keep at least the newest message, even if it alone exceeds the target.
        if candidate >= messages.len() {
            candidate = messages.len().saturating_sub(1);
        }
        safety.nearest_safe_at_or_below(candidate)
    }
}

fn count_cutoff(messages: &[Message], safety: &PairSafetyIndex<'_>, keep: usize) -> usize {
    if messages.len() <= keep {
        return 0;
    }
    safety.nearest_safe_at_or_below(messages.len() - keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolCall;
    use std::sync::Arc;

    fn call(id: &str) -> ToolCall {
        ToolCall::function(id, "search", "{}")
    }

    fn per_message(n: usize) -> TokenCounter {
        Arc::new(move |messages: &[Message]| messages.len() * n)
    }

    fn by_chars() -> TokenCounter {
        Arc::new(|messages: &[Message]| messages.iter().map(|m| m.text().len()).sum())
    }

    fn selector(keep: ContextSize, counter: TokenCounter) -> CutoffSelector {
        CutoffSelector::new(
            keep,
            ContextBudget::new(Some(1000), Some(200)),
            counter,
            DEFAULT_PAIR_SEARCH_WINDOW,
        )
    }

    fn users(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::user(format!("u{i}"))).collect()
    }

    #[test]
    fn keeps_last_messages_when_no_tools() {
        let sel = selector(ContextSize::MessageCount(2), per_message(10));
        let messages = vec![
            Message::system("sys"),
            Message::user("A"),
            Message::assistant_tool_calls(vec![call("1")]),
            Message::tool_result("1", "B"),
            Message::user("C"),
            Message::assistant_text("D"),
        ];
        assert_eq!(sel.select(&messages), 4);
    }

    #[test]
    fn walks_back_to_avoid_splitting_pair() {
        let sel = selector(ContextSize::MessageCount(2), per_message(10));
        let messages = vec![
            Message::user("go"),
            Message::assistant_tool_calls(vec![call("c1")]),
            Message::tool_result("c1", "result"),
            Message::assistant_text("done"),
        ];
        // Candidate 2 would separate the call at 1 from its result at 2.
        assert_eq!(sel.select(&messages), 1);
    }

    #[test]
    fn parallel_calls_stay_together() {
        let sel = selector(ContextSize::MessageCount(1), per_message(10));
        let messages = vec![
            Message::user("go"),
            Message::assistant_tool_calls(vec![call("c1"), call("c2")]),
            Message::tool_result("c1", "r1"),
            Message::tool_result("c2", "r2"),
        ];
        assert_eq!(sel.select(&messages), 1);
    }

    #[test]
    fn short_conversation_is_left_alone() {
        let sel = selector(ContextSize::MessageCount(5), per_message(10));
        assert_eq!(sel.select(&users(5)), 0);
        assert_eq!(sel.select(&[]), 0);
    }

    #[test]
    fn pairs_beyond_window_are_not_protected() {
        let mut messages = vec![Message::assistant_tool_calls(vec![call("far")])];
        messages.extend(users(7));
        messages.push(Message::tool_result("far", "late result"));
        messages.extend(users(2));
        // 11 messages: call at 0, result at 8.

        let narrow = PairSafetyIndex::new(&messages, DEFAULT_PAIR_SEARCH_WINDOW);
        assert!(narrow.is_safe(7), "call at 0 is outside the window of 7");

        let wide = PairSafetyIndex::new(&messages, 10);
        assert!(!wide.is_safe(7));
        assert_eq!(wide.nearest_safe_at_or_below(7), 0);
    }

    #[test]
    fn boundaries_are_always_safe() {
        let messages = vec![
            Message::assistant_tool_calls(vec![call("c1")]),
            Message::tool_result("c1", "r"),
        ];
        let safety = PairSafetyIndex::new(&messages, DEFAULT_PAIR_SEARCH_WINDOW);
        assert!(safety.is_safe(0));
        assert!(!safety.is_safe(1));
        assert!(safety.is_safe(2));
        assert!(safety.is_safe(10));
    }

    #[test]
    fn token_keep_finds_smallest_fitting_suffix() {
        let sel = selector(ContextSize::Tokens(35), per_message(10));
        // 100 tokens total; a suffix of 3 messages (30 tokens) fits.
        assert_eq!(sel.select(&users(10)), 7);
    }

    #[test]
    fn token_keep_noop_when_everything_fits() {
        let sel = selector(ContextSize::Tokens(500), per_message(10));
        assert_eq!(sel.select(&users(10)), 0);
    }

    #[test]
    fn fraction_keep_uses_available_budget() {
        // available = 800, 5% = 40 tokens → 4 messages of 10.
        let sel = selector(ContextSize::Fraction(0.05), per_message(10));
        assert_eq!(sel.token_target(), Some(40));
        assert_eq!(sel.select(&users(10)), 6);
    }

    #[test]
    fn oversized_last_message_is_still_kept() {
        let sel = selector(ContextSize::Tokens(10), by_chars());
        let messages = vec![Message::user("a"), Message::user("b".repeat(1000))];
        assert_eq!(sel.search_token_cutoff(&messages, 10), 2);
        assert_eq!(sel.select(&messages), 1);
    }

    #[test]
    fn token_cutoff_respects_pairs() {
        let sel = selector(ContextSize::Tokens(25), per_message(10));
        let mut messages = users(4);
        messages.push(Message::assistant_tool_calls(vec![call("c1")]));
        messages.push(Message::tool_result("c1", "r"));
        messages.push(Message::assistant_text("done"));
        // Search lands on 5 (tool result); walking back to 4 keeps the pair.
        assert_eq!(sel.search_token_cutoff(&messages, 25), 5);
        assert_eq!(sel.select(&messages), 4);
    }

    #[test]
    fn search_is_monotonic_in_target() {
        let sel = selector(ContextSize::Tokens(1), by_chars());
        let messages: Vec<Message> = (1..=12).map(|n| Message::user("x".repeat(n * 3))).collect();
        let total: usize = messages.iter().map(|m| m.text().len()).sum();

        let mut previous = 0;
        for target in (0..=total + 1).rev() {
            let cutoff = sel.search_token_cutoff(&messages, target);
            let suffix: usize = messages[cutoff..].iter().map(|m| m.text().len()).sum();
            assert!(suffix <= target, "suffix must fit target {target}");
            if cutoff > 0 {
                let longer: usize = messages[cutoff - 1..].iter().map(|m| m.text().len()).sum();
                assert!(longer > target, "cutoff {cutoff} is not the smallest");
            }
            assert!(cutoff >= previous, "lower target must not lower the cutoff");
            previous = cutoff;
        }
    }
}
