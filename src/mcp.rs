use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rmcp::ServiceExt;
use rmcp::model::CallToolRequestParam;
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::child_process::TokioChildProcess;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::docker::{self, ContainerKind, DockerCli};
use crate::llm::ToolSpec;
use crate::tools::{ToolResult, Workbench};

pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;
pub const GITHUB_READ_TIMEOUT_SECS: u64 = 120;
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";

/// How to launch a stdio MCP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioServerParams {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub read_timeout_secs: u64,
    /// Container started by this command; a stale one is removed before launch.
    pub container_name: Option<String>,
}

impl StdioServerParams {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: BTreeMap::new(),
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            container_name: None,
        }
    }

    /// Renders the command line with environment values masked.
    pub fn display(&self) -> String {
        let env = self
            .env
            .keys()
            .map(|k| format!("{k}=****"))
            .collect::<Vec<_>>();
        let mut parts = env;
        parts.push(self.command.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

pub fn filesystem_server_params(docker: &DockerCli, repo_dir: &Path, repo_id: &str) -> StdioServerParams {
    let mut params = StdioServerParams::new(
        docker.binary(),
        docker::repository_server_args(ContainerKind::Filesystem, repo_dir, repo_id),
    );
    params.container_name = Some(docker::container_name(ContainerKind::Filesystem, repo_id));
    params
}

pub fn git_server_params(docker: &DockerCli, repo_dir: &Path, repo_id: &str) -> StdioServerParams {
    let mut params = StdioServerParams::new(
        docker.binary(),
        docker::repository_server_args(ContainerKind::Git, repo_dir, repo_id),
    );
    params.container_name = Some(docker::container_name(ContainerKind::Git, repo_id));
    params
}

pub fn github_server_params(docker: &DockerCli, token: String) -> StdioServerParams {
    let mut params = StdioServerParams::new(docker.binary(), docker::github_server_args());
    params.env.insert(GITHUB_TOKEN_ENV.to_string(), token);
    params.read_timeout_secs = GITHUB_READ_TIMEOUT_SECS;
    params
}

pub fn resolve_github_token(configured: Option<&str>) -> Result<String> {
    resolve_github_token_with(configured, |key| std::env::var(key).ok())
}

pub(crate) fn resolve_github_token_with(
    configured: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    let candidates = [
        configured.map(str::to_string),
        lookup(GITHUB_TOKEN_ENV),
        lookup("GITHUB_TOKEN"),
    ];
    candidates
        .into_iter()
        .flatten()
        .map(|t| t.trim().to_string())
        .find(|t| !t.is_empty())
        .context(
            "GitHub token not found: set agents.github.github_token in config.yaml or export \
             GITHUB_PERSONAL_ACCESS_TOKEN or GITHUB_TOKEN",
        )
}

type ClientSession = RunningService<RoleClient, ()>;

/// Workbench backed by a stdio MCP server. The server process is spawned on
/// first use and lives until [`Workbench::stop`].
pub struct McpWorkbench {
    label: String,
    params: StdioServerParams,
    docker: DockerCli,
    session: Mutex<Option<ClientSession>>,
    tools: Mutex<Option<Vec<ToolSpec>>>,
}

impl McpWorkbench {
    pub fn new(label: impl Into<String>, params: StdioServerParams, docker: DockerCli) -> Self {
        Self {
            label: label.into(),
            params,
            docker,
            session: Mutex::new(None),
            tools: Mutex::new(None),
        }
    }

    pub fn params(&self) -> &StdioServerParams {
        &self.params
    }

    async fn peer(&self) -> Result<rmcp::service::Peer<RoleClient>> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.peer().clone());
        }

        if let Some(name) = &self.params.container_name {
            self.docker
                .remove_if_present(name)
                .await
                .with_context(|| format!("failed to clear stale container '{name}'"))?;
        }

        let mut command = tokio::process::Command::new(&self.params.command);
        command.args(&self.params.args);
        for (key, value) in &self.params.env {
            command.env(key, value);
        }

        tracing::info!(server = %self.label, command = %self.params.display(), "starting MCP server");
        let transport = TokioChildProcess::new(command).with_context(|| {
            format!("failed to spawn MCP server '{}' ({})", self.label, self.params.command)
        })?;
        let session = ()
            .serve(transport)
            .await
            .map_err(|e| anyhow::anyhow!("MCP handshake with server '{}' failed: {e}", self.label))?;
        let peer = session.peer().clone();
        *guard = Some(session);
        Ok(peer)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.params.read_timeout_secs.max(1))
    }
}

#[async_trait]
impl Workbench for McpWorkbench {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        if let Some(cached) = self.tools.lock().await.as_ref() {
            return Ok(cached.clone());
        }
        let peer = self.peer().await?;
        let listed = tokio::time::timeout(self.timeout(), peer.list_all_tools())
            .await
            .map_err(|_| anyhow::anyhow!("MCP server '{}' timed out listing tools", self.label))?
            .map_err(|e| anyhow::anyhow!("MCP server '{}' failed to list tools: {e}", self.label))?;

        let specs = listed
            .iter()
            .filter_map(|tool| serde_json::to_value(tool).ok())
            .filter_map(|value| tool_spec_from_value(&value))
            .collect::<Vec<_>>();
        tracing::info!(server = %self.label, tools = specs.len(), "MCP tools discovered");
        *self.tools.lock().await = Some(specs.clone());
        Ok(specs)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        let peer = self.peer().await?;
        let arguments = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => Some(serde_json::Map::from_iter([("value".to_string(), other)])),
        };
        let request = CallToolRequestParam {
            name: Cow::Owned(name.to_string()),
            arguments,
        };

        tracing::debug!(server = %self.label, tool = name, "calling MCP tool");
        let result = tokio::time::timeout(self.timeout(), peer.call_tool(request))
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "MCP tool '{}' on server '{}' timed out after {}s",
                    name,
                    self.label,
                    self.params.read_timeout_secs
                )
            })?
            .map_err(|e| anyhow::anyhow!("MCP tool '{}' on server '{}' failed: {e}", name, self.label))?;

        let value = serde_json::to_value(&result).context("failed to read MCP tool result")?;
        Ok(tool_result_from_value(&value))
    }

    async fn stop(&self) -> Result<()> {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            tracing::info!(server = %self.label, "stopping MCP server");
            session
                .cancel()
                .await
                .map_err(|e| anyhow::anyhow!("failed to stop MCP server '{}': {e}", self.label))?;
        }
        Ok(())
    }
}

pub(crate) fn tool_spec_from_value(value: &Value) -> Option<ToolSpec> {
    let name = value.get("name")?.as_str()?.to_string();
    Some(ToolSpec {
        name,
        description: value
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        parameters: value
            .get("inputSchema")
            .cloned()
            .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
    })
}

/// Flattens MCP content blocks into text. Non-text blocks are kept as JSON.
pub(crate) fn tool_result_from_value(value: &Value) -> ToolResult {
    let is_error = value
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let mut parts = Vec::new();
    if let Some(blocks) = value.get("content").and_then(Value::as_array) {
        for block in blocks {
            match block.get("text").and_then(Value::as_str) {
                Some(text) => parts.push(text.to_string()),
                None => parts.push(block.to_string()),
            }
        }
    }
    if parts.is_empty()
        && let Some(structured) = value.get("structuredContent")
        && !structured.is_null()
    {
        parts.push(structured.to_string());
    }
    ToolResult {
        content: parts.join("\n"),
        is_error,
    }
}
