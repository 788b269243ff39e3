use std::sync::Arc;

use anyhow::Result;

use super::{AgentContext, BuiltinProfile, ChatAgent, configured_assistant};
use crate::mcp::{McpWorkbench, github_server_params, resolve_github_token};
use crate::tools::FilteredWorkbench;

pub const AGENT_NAME: &str = "github_assistant";
pub const CONFIG_KEY: &str = "github";

pub fn github_workbench(ctx: &AgentContext) -> Result<McpWorkbench> {
    let cfg = ctx.agent_config(CONFIG_KEY)?;
    let token = resolve_github_token(cfg.github_token.as_deref())?;
    Ok(McpWorkbench::new(
        "github",
        github_server_params(&ctx.docker, token),
        ctx.docker.clone(),
    ))
}

pub async fn create_agent(ctx: &AgentContext) -> Result<Arc<dyn ChatAgent>> {
    let cfg = ctx.agent_config(CONFIG_KEY)?;
    let model = ctx.model_for(CONFIG_KEY)?;
    let workbench = FilteredWorkbench::wrap(
        Arc::new(github_workbench(ctx)?),
        cfg.allow_tools.as_deref(),
        cfg.deny_tools.as_deref(),
    );

    let builtin = BuiltinProfile {
        system_message: "You are a GitHub assistant. Use your GitHub tools to search \
                         repositories, code, issues and pull requests, and to read their \
                         content. Report what you found concisely with links."
            .to_string(),
        description: "A GitHub assistant that can search GitHub content on the web.".to_string(),
        max_tool_iterations: 50,
    };

    let agent = configured_assistant(AGENT_NAME, model, &cfg, None, builtin).with_workbench(workbench);
    tracing::info!(agent = AGENT_NAME, "created GitHub agent");
    Ok(Arc::new(agent))
}
