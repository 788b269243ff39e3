use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use super::{AgentContext, ChatAgent, coding_specialist, git, render_template, repository_parser, task_organizer};
use crate::team::{SelectorGroupChat, Termination};

pub const CONFIG_KEY: &str = "repository_team";
pub const DEFAULT_TERMINATION_TEXT: &str = "TERMINATE";
pub const DEFAULT_MAX_TURNS: usize = 50;

pub const REPOSITORY_SELECTOR_PROMPT: &str = "You are an intelligent team coordinator responsible for selecting the most appropriate specialist agent to handle the current task efficiently. Analyze the user's request and conversation context to determine which agent can best accomplish the objective.

## Available Specialist Agents:
{roles}

## Selection Strategy:

**PRIORITY RULE**: ALWAYS select the task_organizer first to establish a TODO list and plan the work.

**Task-Based Selection**:
- **Repository analysis, semantic search, code understanding, initial exploration AFTER planning**: → repository_parser
- **TODO list management, task planning, and session termination**: → task_organizer
- **Coding tasks, code analysis, solution validation, file operations, reading/writing files, directory navigation**: → coding_specialist
- **Git operations, version control, commits, branches, merges, repository status**: → git_assistant

## Context Analysis:
**Conversation History**:
{history}

**Available Candidates**: {participants}

**Return only the selected agent name from {participants}.**";

/// `repository_team_<last path component>`.
pub fn team_name(repo_dir: &Path) -> String {
    let base = repo_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    format!("repository_team_{base}")
}

pub async fn create_team(ctx: &AgentContext, repo_dir: &Path) -> Result<Arc<dyn ChatAgent>> {
    Ok(Arc::new(build_team(ctx, repo_dir).await?))
}

/// Builds the team of planner, coder, git and parser agents working on one
/// repository.
pub async fn build_team(ctx: &AgentContext, repo_dir: &Path) -> Result<SelectorGroupChat> {
    let cfg = ctx.agent_config(CONFIG_KEY)?;
    let model = ctx.model_for(CONFIG_KEY)?;

    let participants = vec![
        task_organizer::create_agent(ctx, repo_dir).await?,
        coding_specialist::create_agent(ctx, repo_dir).await?,
        git::create_agent(ctx, repo_dir).await?,
        repository_parser::create_agent(ctx, repo_dir).await?,
    ];

    let description = cfg
        .description
        .as_deref()
        .map(|text| render_template(text, repo_dir))
        .unwrap_or_else(|| {
            format!(
                "A team of agents for coordinating repository tasks in {}. Includes coding \
                 specialist with filesystem operations, git operations, and repository search \
                 capabilities.",
                repo_dir.display()
            )
        });
    let termination_text = cfg
        .termination_text
        .clone()
        .unwrap_or_else(|| DEFAULT_TERMINATION_TEXT.to_string());
    let name = cfg.name.clone().unwrap_or_else(|| team_name(repo_dir));

    let team = SelectorGroupChat::new(name.clone(), participants, model)?
        .with_description(description)
        .with_selector_prompt(
            cfg.selector_prompt
                .clone()
                .unwrap_or_else(|| REPOSITORY_SELECTOR_PROMPT.to_string()),
        )
        .with_termination(Termination::text_mention(termination_text))
        .with_max_turns(cfg.max_turns.unwrap_or(DEFAULT_MAX_TURNS))
        .with_allow_repeated_speaker(cfg.allow_repeated_speaker.unwrap_or(true));

    tracing::info!(
        team = %name,
        directory = %repo_dir.display(),
        participants = ?team.participant_names(),
        "created repository team"
    );
    Ok(team)
}
