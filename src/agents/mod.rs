pub mod assistant;
pub mod coding_specialist;
pub mod git;
pub mod github;
pub mod interaction_memory;
pub mod repository_parser;
pub mod repository_team;
pub mod task_organizer;
pub mod user_proxy;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::{AgentConfig, AppConfig, AppPaths, agent_config};
use crate::docker::DockerCli;
use crate::llm::Llm;
use crate::messages::{EventSink, Response, TextMessage};
use crate::provider::model_client_for;

pub use assistant::AssistantAgent;
pub use user_proxy::{ConsoleInput, InputSource, ScriptedInput, UserProxyAgent};

/// Anything that can take a turn in a group conversation: a single agent or
/// a whole nested team.
#[async_trait]
pub trait ChatAgent: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Produces this participant's contribution given the shared thread so far.
    async fn on_messages(&self, history: &[TextMessage], events: &EventSink) -> Result<Response>;

    async fn reset(&self) -> Result<()> {
        Ok(())
    }

    /// Releases tool servers and other resources held by the participant.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Everything a factory needs to build a participant.
#[derive(Clone)]
pub struct AgentContext {
    pub config: Arc<AppConfig>,
    pub paths: AppPaths,
    pub docker: DockerCli,
    /// When set, every agent uses this model instead of its configured provider.
    pub model_override: Option<Arc<dyn Llm>>,
}

impl AgentContext {
    pub fn new(config: Arc<AppConfig>, paths: AppPaths) -> Self {
        Self {
            config,
            paths,
            docker: DockerCli::default(),
            model_override: None,
        }
    }

    pub fn with_model_override(mut self, model: Arc<dyn Llm>) -> Self {
        self.model_override = Some(model);
        self
    }

    pub fn model_for(&self, agent_name: &str) -> Result<Arc<dyn Llm>> {
        match &self.model_override {
            Some(model) => Ok(Arc::clone(model)),
            None => model_client_for(&self.config, agent_name),
        }
    }

    pub fn agent_config(&self, agent_name: &str) -> Result<AgentConfig> {
        agent_config(&self.config, agent_name)
    }
}

/// Built-in participants: (spec name, accepted aliases, summary).
pub const KNOWN_AGENTS: &[(&str, &[&str], &str)] = &[
    (
        "coding_specialist",
        &["repository_team.coding_specialist"],
        "filesystem read/write through mcp/filesystem; param: repository directory",
    ),
    (
        "git",
        &["repository_team.git"],
        "git operations through mcp/git; param: repository directory",
    ),
    (
        "github",
        &[],
        "GitHub search and operations through github-mcp-server",
    ),
    (
        "task_organizer",
        &["repository_team.task_organizer"],
        "TODO-AI.md planning tools; param: repository directory",
    ),
    (
        "repository_parser",
        &["repository_team.parser", "parser"],
        "local repository index and search; param: repository directory",
    ),
    (
        "repository_team",
        &[],
        "nested selector team of the four repository agents; param: repository directory",
    ),
    (
        "interaction_memory",
        &[],
        "recalls summaries of earlier orchestrator conversations",
    ),
];

pub fn canonical_agent_name(name: &str) -> Option<&'static str> {
    KNOWN_AGENTS
        .iter()
        .find(|(canonical, aliases, _)| *canonical == name || aliases.contains(&name))
        .map(|(canonical, _, _)| *canonical)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSpec {
    pub name: String,
    pub params: Vec<String>,
}

/// Parses `name` or `name[p1,p2]`. Parameters are trimmed; brackets may not
/// appear in the name and the parameter list may not be empty.
pub fn parse_participant_spec(spec: &str) -> Result<ParticipantSpec> {
    let spec = spec.trim();
    let invalid = || anyhow::anyhow!("invalid participant specification '{spec}'. Expected 'name' or 'name[param1,param2]'");

    let (name, params) = match spec.find('[') {
        None => (spec, None),
        Some(open) => {
            let inner = spec[open + 1..].strip_suffix(']').ok_or_else(invalid)?;
            if inner.is_empty() || inner.contains('[') || inner.contains(']') {
                return Err(invalid());
            }
            (&spec[..open], Some(inner))
        }
    };
    if name.is_empty() || name.contains(']') {
        return Err(invalid());
    }

    Ok(ParticipantSpec {
        name: name.to_string(),
        params: params
            .map(|p| p.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default(),
    })
}

/// First parameter as a repository directory, defaulting to the current one.
pub(crate) fn repository_param(params: &[String]) -> Result<PathBuf> {
    let raw = params
        .first()
        .map(String::as_str)
        .filter(|p| !p.is_empty())
        .unwrap_or(".");
    let path = crate::repo_id::absolute_path(Path::new(raw))?;
    if !path.is_dir() {
        anyhow::bail!("repository path '{}' is not a directory", path.display());
    }
    Ok(path)
}

/// Substitutes `{directory}` in user-supplied prompts.
pub(crate) fn render_template(template: &str, directory: &Path) -> String {
    template.replace("{directory}", &directory.display().to_string())
}

/// Built-in text used when the agent's config section leaves a field unset.
pub(crate) struct BuiltinProfile {
    pub system_message: String,
    pub description: String,
    pub max_tool_iterations: usize,
}

pub(crate) fn configured_assistant(
    name: &str,
    model: Arc<dyn Llm>,
    cfg: &AgentConfig,
    directory: Option<&Path>,
    builtin: BuiltinProfile,
) -> AssistantAgent {
    let render = |text: &str| match directory {
        Some(dir) => render_template(text, dir),
        None => text.to_string(),
    };
    AssistantAgent::new(name, model)
        .with_system_message(
            cfg.system_message
                .as_deref()
                .map(render)
                .unwrap_or(builtin.system_message),
        )
        .with_description(
            cfg.description
                .as_deref()
                .map(render)
                .unwrap_or(builtin.description),
        )
        .with_max_tool_iterations(
            cfg.max_tool_iterations
                .unwrap_or(builtin.max_tool_iterations),
        )
}

pub async fn create_participant(ctx: &AgentContext, spec: &str) -> Result<Arc<dyn ChatAgent>> {
    let parsed = parse_participant_spec(spec)?;
    let name = canonical_agent_name(&parsed.name).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown agent '{}' in participant '{}'. Known agents: {}",
            parsed.name,
            spec,
            KNOWN_AGENTS
                .iter()
                .map(|(n, _, _)| *n)
                .collect::<Vec<_>>()
                .join(", ")
        )
    })?;

    let params = &parsed.params;
    let participant: Arc<dyn ChatAgent> = match name {
        "coding_specialist" => coding_specialist::create_agent(ctx, &repository_param(params)?).await?,
        "git" => git::create_agent(ctx, &repository_param(params)?).await?,
        "github" => github::create_agent(ctx).await?,
        "task_organizer" => task_organizer::create_agent(ctx, &repository_param(params)?).await?,
        "repository_parser" => {
            repository_parser::create_agent(ctx, &repository_param(params)?).await?
        }
        "repository_team" => repository_team::create_team(ctx, &repository_param(params)?).await?,
        "interaction_memory" => interaction_memory::create_agent(ctx).await?,
        other => anyhow::bail!("unknown agent '{other}'"),
    };

    if params.is_empty() {
        tracing::info!(agent = name, "created participant");
    } else {
        tracing::info!(agent = name, params = ?params, "created participant with params");
    }
    Ok(participant)
}

pub async fn create_participants(ctx: &AgentContext, specs: &[String]) -> Result<Vec<Arc<dyn ChatAgent>>> {
    let mut participants = Vec::with_capacity(specs.len());
    for spec in specs {
        let participant = create_participant(ctx, spec)
            .await
            .with_context(|| format!("failed to create participant '{spec}'"))?;
        participants.push(participant);
    }
    Ok(participants)
}
