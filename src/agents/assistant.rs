use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::ChatAgent;
use crate::llm::{ChatMessage, Llm, LlmRequest, ToolSpec};
use crate::memory::InteractionMemory;
use crate::messages::{EventSink, Response, TeamEvent, TextMessage, ToolExecution};
use crate::tools::{ToolResult, Workbench};

/// A model-backed agent with an optional workbench. Each turn it may call
/// tools up to `max_tool_iterations` rounds before it must answer.
pub struct AssistantAgent {
    name: String,
    description: String,
    system_message: String,
    model: Arc<dyn Llm>,
    workbench: Option<Arc<dyn Workbench>>,
    max_tool_iterations: usize,
    memory: Option<(Arc<InteractionMemory>, usize)>,
}

impl AssistantAgent {
    pub fn new(name: impl Into<String>, model: Arc<dyn Llm>) -> Self {
        Self {
            name: name.into(),
            description: "An agent that provides assistance with ability to use tools.".to_string(),
            system_message: "You are a helpful AI assistant. Solve tasks using your tools."
                .to_string(),
            model,
            workbench: None,
            max_tool_iterations: 1,
            memory: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = system_message.into();
        self
    }

    pub fn with_workbench(mut self, workbench: Arc<dyn Workbench>) -> Self {
        self.workbench = Some(workbench);
        self
    }

    pub fn with_max_tool_iterations(mut self, max: usize) -> Self {
        self.max_tool_iterations = max.max(1);
        self
    }

    pub fn with_memory(mut self, memory: Arc<InteractionMemory>, top_k: usize) -> Self {
        self.memory = Some((memory, top_k));
        self
    }

    pub fn system_message(&self) -> &str {
        &self.system_message
    }

    pub fn max_tool_iterations(&self) -> usize {
        self.max_tool_iterations
    }

    fn build_context(&self, history: &[TextMessage]) -> Vec<ChatMessage> {
        let mut context = vec![ChatMessage::system(self.system_message.clone())];

        if let Some((memory, top_k)) = &self.memory
            && let Some(last) = history.last()
        {
            let recalled = memory.query(&last.content, *top_k);
            if !recalled.is_empty() {
                let mut block = String::from("\nRelevant memory content (in chronological order):\n");
                let mut ordered = recalled;
                ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                for (idx, entry) in ordered.iter().enumerate() {
                    block.push_str(&format!("{}. {}\n", idx + 1, entry.content));
                }
                tracing::debug!(agent = %self.name, memories = ordered.len(), "injecting recalled memories");
                context.push(ChatMessage::system(block));
            }
        }

        for message in history {
            if message.source == self.name {
                context.push(ChatMessage::assistant(message.content.clone()));
            } else {
                context.push(ChatMessage::user(format!(
                    "{}: {}",
                    message.source, message.content
                )));
            }
        }
        context
    }

    async fn available_tools(&self) -> Result<Vec<ToolSpec>> {
        match &self.workbench {
            Some(workbench) => workbench
                .list_tools()
                .await
                .with_context(|| format!("agent '{}' could not list its tools", self.name)),
            None => Ok(Vec::new()),
        }
    }

    async fn execute(&self, name: &str, arguments: serde_json::Value) -> ToolResult {
        let Some(workbench) = &self.workbench else {
            return ToolResult::error(format!("agent '{}' has no tools", self.name));
        };
        match workbench.call_tool(name, arguments).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(agent = %self.name, tool = name, error = %err, "tool call failed");
                ToolResult::error(format!("Error: {err:#}"))
            }
        }
    }
}

#[async_trait]
impl ChatAgent for AssistantAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn on_messages(&self, history: &[TextMessage], events: &EventSink) -> Result<Response> {
        let mut context = self.build_context(history);
        let tools = self.available_tools().await?;
        let mut inner_events = Vec::new();
        let mut last_results: Vec<ToolExecution> = Vec::new();

        for iteration in 0..self.max_tool_iterations {
            let response = self
                .model
                .generate(LlmRequest::new(context.clone()).with_tools(tools.clone()))
                .await
                .with_context(|| format!("model call for agent '{}' failed", self.name))?;

            if response.tool_calls.is_empty() {
                return Ok(Response {
                    message: TextMessage::new(self.name.clone(), response.content),
                    inner_events,
                });
            }

            tracing::debug!(
                agent = %self.name,
                iteration,
                calls = response.tool_calls.len(),
                "model requested tools"
            );
            let request = TeamEvent::ToolCallRequest {
                source: self.name.clone(),
                calls: response.tool_calls.clone(),
            };
            events.emit(request.clone());
            inner_events.push(request);

            context.push(ChatMessage::assistant_tool_calls(
                response.content,
                response.tool_calls.clone(),
            ));

            let mut results = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                let result = self.execute(&call.name, call.arguments.clone()).await;
                context.push(ChatMessage::tool_result(
                    call.id.clone(),
                    result.content.clone(),
                    result.is_error,
                ));
                results.push(ToolExecution {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    content: result.content,
                    is_error: result.is_error,
                });
            }

            let execution = TeamEvent::ToolCallExecution {
                source: self.name.clone(),
                results: results.clone(),
            };
            events.emit(execution.clone());
            inner_events.push(execution);
            last_results = results;
        }

        tracing::debug!(
            agent = %self.name,
            max_tool_iterations = self.max_tool_iterations,
            "tool iteration limit reached; returning tool summary"
        );
        let summary = last_results
            .iter()
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Response {
            message: TextMessage::new(self.name.clone(), summary),
            inner_events,
        })
    }

    async fn close(&self) -> Result<()> {
        if let Some(workbench) = &self.workbench {
            workbench
                .stop()
                .await
                .with_context(|| format!("failed to stop tools for agent '{}'", self.name))?;
        }
        Ok(())
    }
}
