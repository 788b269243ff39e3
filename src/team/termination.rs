use crate::messages::TeamEvent;

/// When a group conversation should stop. Conditions are checked after each
/// turn against the events that turn produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Some message (or tool result) contains `text`, optionally only from `sources`.
    TextMention {
        text: String,
        sources: Option<Vec<String>>,
    },
    /// The thread, task included, holds at least this many messages.
    MaxMessages(usize),
    Any(Vec<Termination>),
}

impl Termination {
    pub fn text_mention(text: impl Into<String>) -> Self {
        Termination::TextMention {
            text: text.into(),
            sources: None,
        }
    }

    pub fn text_mention_from(text: impl Into<String>, sources: &[&str]) -> Self {
        Termination::TextMention {
            text: text.into(),
            sources: Some(sources.iter().map(|s| s.to_string()).collect()),
        }
    }

    pub fn or(self, other: Termination) -> Self {
        match self {
            Termination::Any(mut conditions) => {
                conditions.push(other);
                Termination::Any(conditions)
            }
            first => Termination::Any(vec![first, other]),
        }
    }

    /// Returns the stop reason if the condition is met.
    pub fn check(&self, delta: &[TeamEvent], message_count: usize) -> Option<String> {
        match self {
            Termination::TextMention { text, sources } => {
                let from_allowed = |source: &str| {
                    sources
                        .as_ref()
                        .is_none_or(|allowed| allowed.iter().any(|s| s == source))
                };
                let mentioned = delta.iter().any(|event| match event {
                    TeamEvent::Message(message) => {
                        from_allowed(&message.source) && message.content.contains(text.as_str())
                    }
                    TeamEvent::ToolCallExecution { source, results } => {
                        from_allowed(source)
                            && results.iter().any(|r| r.content.contains(text.as_str()))
                    }
                    _ => false,
                });
                mentioned.then(|| format!("Text '{text}' mentioned"))
            }
            Termination::MaxMessages(max) => (message_count >= *max).then(|| {
                format!(
                    "Maximum number of messages {max} reached, current message count: {message_count}"
                )
            }),
            Termination::Any(conditions) => conditions
                .iter()
                .find_map(|condition| condition.check(delta, message_count)),
        }
    }
}
