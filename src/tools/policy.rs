use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{ToolResult, Workbench};
use crate::llm::ToolSpec;

/// Match a tool name against a pattern that may contain `*` wildcards.
/// `git_*` matches `git_status`; `*_file` matches `write_file`.
pub fn matches_wildcard(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }

    let (first, rest) = (parts[0], &parts[1..]);
    let Some(mut remaining) = name.strip_prefix(first) else {
        return false;
    };
    let last = rest[rest.len() - 1];
    for part in &rest[..rest.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match remaining.find(part) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last)
}

pub fn any_pattern_matches(patterns: &[&str], name: &str) -> bool {
    patterns.iter().any(|p| matches_wildcard(p, name))
}

fn clean_patterns(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Wraps a workbench and hides tools outside the agent's allow/deny policy.
/// An empty allow list admits everything; deny always wins.
pub struct FilteredWorkbench {
    inner: Arc<dyn Workbench>,
    allow: Vec<String>,
    deny: Vec<String>,
}

impl FilteredWorkbench {
    pub fn new(inner: Arc<dyn Workbench>, allow: &[String], deny: &[String]) -> Self {
        Self {
            inner,
            allow: clean_patterns(allow),
            deny: clean_patterns(deny),
        }
    }

    /// Returns the inner workbench untouched when there is no policy to apply.
    pub fn wrap(
        inner: Arc<dyn Workbench>,
        allow: Option<&[String]>,
        deny: Option<&[String]>,
    ) -> Arc<dyn Workbench> {
        let allow = allow.unwrap_or_default();
        let deny = deny.unwrap_or_default();
        if clean_patterns(allow).is_empty() && clean_patterns(deny).is_empty() {
            return inner;
        }
        Arc::new(Self::new(inner, allow, deny))
    }

    pub fn permits(&self, name: &str) -> bool {
        let allow = self.allow.iter().map(String::as_str).collect::<Vec<_>>();
        let deny = self.deny.iter().map(String::as_str).collect::<Vec<_>>();
        let allowed = allow.is_empty() || any_pattern_matches(&allow, name);
        let denied = any_pattern_matches(&deny, name);
        if denied {
            tracing::debug!(tool = name, "tool denied by deny_tools policy");
        }
        allowed && !denied
    }
}

#[async_trait]
impl Workbench for FilteredWorkbench {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        Ok(self
            .inner
            .list_tools()
            .await?
            .into_iter()
            .filter(|tool| self.permits(&tool.name))
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        if !self.permits(name) {
            return Ok(ToolResult::error(format!(
                "tool '{name}' is not permitted for this agent"
            )));
        }
        self.inner.call_tool(name, arguments).await
    }

    async fn stop(&self) -> Result<()> {
        self.inner.stop().await
    }
}
