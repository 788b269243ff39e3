//! Messages and events exchanged inside a group conversation.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::llm::ToolCall;

/// A chat message in the shared conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextMessage {
    pub source: String,
    pub content: String,
}

impl TextMessage {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolExecution {
    pub call_id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub messages: Vec<TextMessage>,
    pub stop_reason: Option<String>,
}

impl TaskResult {
    pub fn last_message(&self) -> Option<&TextMessage> {
        self.messages.last()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TeamEvent {
    SelectSpeaker { team: String, speaker: String },
    Message(TextMessage),
    ToolCallRequest { source: String, calls: Vec<ToolCall> },
    ToolCallExecution { source: String, results: Vec<ToolExecution> },
    TaskResult(TaskResult),
}

/// What an agent hands back for its turn: the message appended to the shared
/// thread plus the tool events produced along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub message: TextMessage,
    pub inner_events: Vec<TeamEvent>,
}

impl Response {
    pub fn text(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            message: TextMessage::new(source, content),
            inner_events: Vec::new(),
        }
    }
}

/// Fire-and-forget delivery of events to an observer (console, telemetry).
/// A closed or absent receiver is not an error.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<TeamEvent>>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<TeamEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: TeamEvent) {
        if let Some(tx) = &self.tx
            && tx.send(event).is_err()
        {
            tracing::trace!("event receiver dropped");
        }
    }
}
