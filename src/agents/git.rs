use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use super::{AgentContext, BuiltinProfile, ChatAgent, configured_assistant};
use crate::docker::mount_target;
use crate::mcp::{McpWorkbench, git_server_params};
use crate::repo_id::RepositoryIdManager;
use crate::tools::FilteredWorkbench;

pub const AGENT_NAME: &str = "git_assistant";
pub const CONFIG_KEY: &str = "git";

pub fn git_workbench(ctx: &AgentContext, repo_dir: &Path) -> Result<McpWorkbench> {
    let repo_id = RepositoryIdManager::open(&ctx.paths.data_dir)?.get_repo_id(repo_dir)?;
    Ok(McpWorkbench::new(
        format!("git:{repo_id}"),
        git_server_params(&ctx.docker, repo_dir, &repo_id),
        ctx.docker.clone(),
    ))
}

pub async fn create_agent(ctx: &AgentContext, repo_dir: &Path) -> Result<Arc<dyn ChatAgent>> {
    let cfg = ctx.agent_config(CONFIG_KEY)?;
    let model = ctx.model_for(CONFIG_KEY)?;
    let workbench = FilteredWorkbench::wrap(
        Arc::new(git_workbench(ctx, repo_dir)?),
        cfg.allow_tools.as_deref(),
        cfg.deny_tools.as_deref(),
    );
    let mount = mount_target(repo_dir);

    let builtin = BuiltinProfile {
        system_message: format!(
            "You are a careful Git assistant for a local repository. You can check status, \
             create and switch branches, stage, commit, diff, inspect logs and more. The \
             repository is available to your tools at {mount}; pass that path as repo_path. \
             Be precise, and ask for confirmation before destructive operations such as hard \
             resets, forced pushes or branch deletion."
        ),
        description: format!(
            "A Git assistant that performs Git operations through a Docker-based git tool \
             server. Working on repository: {}",
            repo_dir.display()
        ),
        max_tool_iterations: 20,
    };

    let agent = configured_assistant(AGENT_NAME, model, &cfg, Some(repo_dir), builtin)
        .with_workbench(workbench);
    tracing::info!(agent = AGENT_NAME, directory = %repo_dir.display(), "created git agent");
    Ok(Arc::new(agent))
}
