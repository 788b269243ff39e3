use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use super::{AgentContext, BuiltinProfile, ChatAgent, configured_assistant};
use crate::docker::mount_target;
use crate::mcp::{McpWorkbench, filesystem_server_params};
use crate::repo_id::RepositoryIdManager;
use crate::tools::FilteredWorkbench;

pub const AGENT_NAME: &str = "coding_specialist";
pub const CONFIG_KEY: &str = "coding_specialist";

pub fn filesystem_workbench(ctx: &AgentContext, repo_dir: &Path) -> Result<McpWorkbench> {
    let repo_id = RepositoryIdManager::open(&ctx.paths.data_dir)?.get_repo_id(repo_dir)?;
    Ok(McpWorkbench::new(
        format!("filesystem:{repo_id}"),
        filesystem_server_params(&ctx.docker, repo_dir, &repo_id),
        ctx.docker.clone(),
    ))
}

pub async fn create_agent(ctx: &AgentContext, repo_dir: &Path) -> Result<Arc<dyn ChatAgent>> {
    let cfg = ctx.agent_config(CONFIG_KEY)?;
    let model = ctx.model_for(CONFIG_KEY)?;
    let mcp = filesystem_workbench(ctx, repo_dir)?;
    let workbench = FilteredWorkbench::wrap(
        Arc::new(mcp),
        cfg.allow_tools.as_deref(),
        cfg.deny_tools.as_deref(),
    );
    let mount = mount_target(repo_dir);

    let builtin = BuiltinProfile {
        system_message: format!(
            "You are an expert Coding Specialist with full read/write access to the repository \
             through filesystem tools. You know many programming languages, frameworks and \
             engineering practices, and you check that a solution is sound before writing it. \
             The repository {} is mounted at {mount} inside your tools, so always use paths \
             under {mount}. Follow the instructions of the team coordinator and never end the \
             conversation yourself.",
            repo_dir.display()
        ),
        description: format!(
            "A Coding Specialist with filesystem read/write tools that validates solutions \
             before implementing them. Working directory: {}",
            repo_dir.display()
        ),
        max_tool_iterations: 75,
    };

    let agent = configured_assistant(AGENT_NAME, model, &cfg, Some(repo_dir), builtin)
        .with_workbench(workbench);
    tracing::info!(agent = AGENT_NAME, directory = %repo_dir.display(), "created coding specialist agent");
    Ok(Arc::new(agent))
}
