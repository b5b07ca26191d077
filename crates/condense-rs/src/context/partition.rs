//! Splitting a conversation around a cutoff.

use crate::Message;

/// The three runs of a conversation split at a cutoff.
#[derive(Debug, Clone, Copy)]
pub struct Partition<'a> {
    /// The leading system message, if the conversation starts with one.
    pub system: Option<&'a Message>,
    /// Messages to fold into the summary.
    pub to_summarize: &'a [Message],
    /// Messages kept verbatim after the summary.
    pub preserved: &'a [Message],
    /// Effective cutoff after clamping.
    pub cutoff: usize,
}

impl Partition<'_> {
    /// True when there is nothing to summarize and compaction should be skipped.
    pub fn is_noop(&self) -> bool {
        self.to_summarize.is_empty()
    }
}

/// Split `messages` at `cutoff`.
///
/// A leading system message is pulled out of the summarized run and the
/// cutoff is clamped to at least 1 in that case. A cutoff past the end is
/// clamped to the length. Never fails.
pub fn partition(messages: &[Message], cutoff: usize) -> Partition<'_> {
    let mut cutoff = cutoff.min(messages.len());
    let (system, start) = match messages.first() {
        Some(first) if first.is_system() => {
            cutoff = cutoff.max(1);
            (Some(first), 1)
        }
        _ => (None, 0),
    };
    Partition {
        system,
        to_summarize: &messages[start..cutoff],
        preserved: &messages[cutoff..],
        cutoff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolCall;

    fn sample() -> Vec<Message> {
        vec![
            Message::system("sys"),
            Message::user("A"),
            Message::assistant_tool_calls(vec![ToolCall::function("1", "search", "{}")]),
            Message::tool_result("1", "B"),
            Message::user("C"),
            Message::assistant_text("D"),
        ]
    }

    #[test]
    fn leading_system_is_held_out() {
        let messages = sample();
        let part = partition(&messages, 4);
        assert!(part.system.is_some_and(Message::is_system));
        assert_eq!(part.to_summarize.len(), 3);
        assert_eq!(part.to_summarize[0].text(), "A");
        assert_eq!(part.preserved.len(), 2);
        assert_eq!(part.preserved[0].text(), "C");
    }

    #[test]
    fn zero_cutoff_with_system_is_clamped_and_noop() {
        let messages = sample();
        let part = partition(&messages, 0);
        assert_eq!(part.cutoff, 1);
        assert!(part.is_noop());
        assert_eq!(part.preserved.len(), 5);
    }

    #[test]
    fn without_system_everything_before_cutoff_is_summarized() {
        let messages = vec![Message::user("a"), Message::user("b"), Message::user("c")];
        let part = partition(&messages, 2);
        assert!(part.system.is_none());
        assert_eq!(part.to_summarize.len(), 2);
        assert_eq!(part.preserved.len(), 1);
    }

    #[test]
    fn later_system_messages_are_summarized() {
        let messages = vec![
            Message::user("a"),
            Message::system("[Context Summary]\n\nearlier"),
            Message::user("b"),
        ];
        let part = partition(&messages, 2);
        assert!(part.system.is_none());
        assert!(part.to_summarize[1].is_system());
    }

    #[test]
    fn out_of_range_and_empty_inputs() {
        let messages = vec![Message::user("a")];
        let part = partition(&messages, 10);
        assert_eq!(part.cutoff, 1);
        assert!(part.preserved.is_empty());

        let empty = partition(&[], 0);
        assert!(empty.is_noop());
        assert!(empty.system.is_none());
    }
}
