//! Console rendering and telemetry for team events.

use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::messages::{TaskResult, TeamEvent};
use crate::team::is_interrupted;
use crate::telemetry::TelemetrySink;

pub const ARGUMENTS_PREVIEW_CHARS: usize = 150;
pub const RESULT_PREVIEW_CHARS: usize = 200;
pub const RULE: &str = "============================================================";

/// Cuts `text` to `max` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Console lines for one event. `TaskResult` renders the closing banner and stop reason.
pub fn render_event(event: &TeamEvent) -> Vec<String> {
    match event {
        TeamEvent::SelectSpeaker { speaker, .. } => vec![format!("🤖 Agent selected: {speaker}")],
        TeamEvent::Message(message) => vec![format!("💬 {}: {}", message.source, message.content)],
        TeamEvent::ToolCallRequest { source, calls } => {
            let mut lines = vec![format!("🔨 {source}: Tool request")];
            for (idx, call) in calls.iter().enumerate() {
                lines.push(format!("   Tool {}: {}", idx + 1, call.name));
                let has_arguments = match &call.arguments {
                    serde_json::Value::Null => false,
                    serde_json::Value::Object(map) => !map.is_empty(),
                    _ => true,
                };
                if has_arguments {
                    lines.push(format!(
                        "   Arguments: {}",
                        truncate_chars(&call.arguments.to_string(), ARGUMENTS_PREVIEW_CHARS)
                    ));
                }
            }
            lines
        }
        TeamEvent::ToolCallExecution { source, results } => {
            let mut lines = vec![format!("🔧 {source}: Tool execution")];
            for (idx, result) in results.iter().enumerate() {
                lines.push(format!("   Tool {}: {}", idx + 1, result.name));
                if !result.content.is_empty() {
                    lines.push(format!(
                        "   Result: {}",
                        truncate_chars(&result.content, RESULT_PREVIEW_CHARS)
                    ));
                }
            }
            lines
        }
        TeamEvent::TaskResult(result) => {
            let banner = if is_interrupted(result) {
                "⚠️ Task interrupted by user."
            } else {
                "✅ Task completed!"
            };
            let mut lines = vec![RULE.to_string(), banner.to_string()];
            if let Some(reason) = &result.stop_reason {
                lines.push(format!("🛑 Stop reason: {reason}"));
            }
            lines
        }
    }
}

/// Mirrors speaker and tool lifecycle events into the telemetry file.
pub fn emit_event_telemetry(event: &TeamEvent, telemetry: &TelemetrySink) {
    match event {
        TeamEvent::SelectSpeaker { team, speaker } => {
            telemetry.emit_agent("speaker.selected", Some(team), speaker, json!({}));
        }
        TeamEvent::ToolCallRequest { source, calls } => {
            for call in calls {
                tracing::info!(tool = %call.name, author = %source, lifecycle = "requested", "tool call requested");
                telemetry.emit_agent("tool.requested", None, source, json!({ "tool": call.name }));
            }
        }
        TeamEvent::ToolCallExecution { source, results } => {
            for result in results {
                if result.is_error {
                    tracing::warn!(
                        tool = %result.name,
                        author = %source,
                        lifecycle = "failed",
                        error = %truncate_chars(&result.content, RESULT_PREVIEW_CHARS),
                        "tool execution failed"
                    );
                    telemetry.emit_agent(
                        "tool.failed",
                        None,
                        source,
                        json!({ "tool": result.name, "error": result.content }),
                    );
                } else {
                    tracing::info!(tool = %result.name, author = %source, lifecycle = "succeeded", "tool execution completed");
                    telemetry.emit_agent("tool.succeeded", None, source, json!({ "tool": result.name }));
                }
            }
        }
        TeamEvent::TaskResult(result) => {
            telemetry.emit(
                "team.completed",
                json!({
                    "messages": result.messages.len(),
                    "stop_reason": result.stop_reason,
                }),
            );
        }
        TeamEvent::Message(_) => {}
    }
}

/// Prints and records events until the sender side is dropped. Returns the
/// last [`TaskResult`] seen, if any.
pub async fn consume_events(
    mut rx: UnboundedReceiver<TeamEvent>,
    telemetry: TelemetrySink,
    print: bool,
) -> Option<TaskResult> {
    let mut last_result = None;
    while let Some(event) = rx.recv().await {
        emit_event_telemetry(&event, &telemetry);
        if print {
            for line in render_event(&event) {
                println!("{line}");
            }
        }
        if let TeamEvent::TaskResult(result) = event {
            last_result = Some(result);
        }
    }
    last_result
}

/// Content of the final message, or empty when the thread is empty.
pub fn final_text(result: &TaskResult) -> String {
    result
        .last_message()
        .map(|m| m.content.clone())
        .unwrap_or_default()
}
