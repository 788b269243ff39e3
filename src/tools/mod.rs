pub mod policy;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::llm::ToolSpec;

pub use policy::{FilteredWorkbench, any_pattern_matches, matches_wildcard};

/// Outcome of one tool invocation as handed back to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A set of tools an agent may call. Implementations own whatever process
/// or session backs the tools and release it in [`Workbench::stop`].
#[async_trait]
pub trait Workbench: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>>;

    /// Transport failures surface as `Err`; failures reported by the tool
    /// itself come back as a [`ToolResult`] with `is_error` set.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult>;

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

type ToolFuture = Pin<Box<dyn Future<Output = Result<String>> + Send>>;
type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

#[derive(Clone)]
pub struct FunctionTool {
    spec: ToolSpec,
    handler: ToolHandler,
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.spec.name)
            .finish_non_exhaustive()
    }
}

impl FunctionTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        Self {
            spec: ToolSpec {
                name: name.into(),
                description: description.into(),
                parameters,
            },
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub async fn run(&self, arguments: Value) -> Result<String> {
        (self.handler)(arguments).await
    }
}

/// Workbench over in-process function tools.
#[derive(Debug, Clone, Default)]
pub struct StaticWorkbench {
    tools: Vec<FunctionTool>,
}

impl StaticWorkbench {
    pub fn new(tools: Vec<FunctionTool>) -> Self {
        Self { tools }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }
}

#[async_trait]
impl Workbench for StaticWorkbench {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        Ok(self.tools.iter().map(|t| t.spec().clone()).collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            return Ok(ToolResult::error(format!(
                "tool '{name}' not found. Available tools: {}",
                self.tool_names().join(", ")
            )));
        };
        match tool.run(arguments).await {
            Ok(content) => Ok(ToolResult::ok(content)),
            Err(err) => {
                tracing::warn!(tool = name, error = %err, "function tool failed");
                Ok(ToolResult::error(format!("Error: {err:#}")))
            }
        }
    }
}

/// JSON schema for a tool taking a single required string argument.
pub fn string_arg_schema(arg: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            arg: { "type": "string", "description": description }
        },
        "required": [arg]
    })
}

pub fn empty_args_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Reads a string argument, accepting a bare string payload as well.
pub fn string_arg(arguments: &Value, name: &str) -> Result<String> {
    if let Some(value) = arguments.get(name).and_then(Value::as_str) {
        return Ok(value.to_string());
    }
    if let Value::String(value) = arguments {
        return Ok(value.clone());
    }
    anyhow::bail!("missing required string argument '{name}'")
}
