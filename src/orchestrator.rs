//! Top-level group chat that routes a task across the configured participants.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::agents::{
    AgentContext, ChatAgent, ConsoleInput, InputSource, UserProxyAgent, create_participants,
    interaction_memory,
};
use crate::agents::user_proxy::{END_OF_INPUT_REPLY, USER_PROXY_NAME};
use crate::config::AgentConfig;
use crate::memory::InteractionMemory;
use crate::messages::{EventSink, TaskResult};
use crate::team::{SelectorGroupChat, Termination};

pub use crate::team::{INTERRUPTED_STOP_REASON, interrupted_result, is_interrupted};

pub const DEFAULT_ORCHESTRATOR_NAME: &str = "orchestrator";
pub const DEFAULT_MAX_TURNS: usize = 50;
pub const TERMINATE_TEXT: &str = "TERMINATE";
pub const INTERACTIVE_SESSION_TASK: &str =
    "This is an interactive session. You can ask the user which request to process.";

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub name: String,
    pub description: String,
    pub max_turns: Option<usize>,
    pub participants: Vec<String>,
    pub enable_user_proxy: bool,
    pub allow_repeated_speaker: bool,
    pub selector_prompt: Option<String>,
}

impl OrchestratorConfig {
    pub fn from_agent_config(cfg: &AgentConfig) -> Result<Self> {
        let participants = cfg.participants.clone().unwrap_or_default();
        if participants.is_empty() {
            anyhow::bail!("orchestrator config has no participants; set 'participants' in its agent section");
        }
        Ok(Self {
            name: cfg
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_ORCHESTRATOR_NAME.to_string()),
            description: cfg
                .description
                .clone()
                .unwrap_or_else(|| "Multi-agent orchestrator using a selector group chat".to_string()),
            max_turns: Some(cfg.max_turns.unwrap_or(DEFAULT_MAX_TURNS)),
            participants,
            enable_user_proxy: cfg.enable_user_proxy.unwrap_or(false),
            allow_repeated_speaker: cfg.allow_repeated_speaker.unwrap_or(true),
            selector_prompt: cfg.selector_prompt.clone(),
        })
    }

    /// `BYE` from the user ends an interactive session; otherwise any
    /// participant saying `TERMINATE` ends the task.
    pub fn termination(&self) -> Termination {
        if self.enable_user_proxy {
            Termination::text_mention_from(END_OF_INPUT_REPLY, &[USER_PROXY_NAME])
        } else {
            Termination::text_mention(TERMINATE_TEXT)
        }
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    config_key: String,
    ctx: AgentContext,
    input: Arc<dyn InputSource>,
}

impl Orchestrator {
    /// Loads the orchestrator section named `agent_name` from the app config.
    pub fn from_config(ctx: AgentContext, agent_name: &str) -> Result<Self> {
        let cfg = ctx
            .agent_config(agent_name)
            .with_context(|| format!("failed to load orchestrator config '{agent_name}'"))?;
        let config = OrchestratorConfig::from_agent_config(&cfg)?;
        Ok(Self::new(config, agent_name, ctx))
    }

    pub fn new(config: OrchestratorConfig, config_key: impl Into<String>, ctx: AgentContext) -> Self {
        Self {
            config,
            config_key: config_key.into(),
            ctx,
            input: Arc::new(ConsoleInput),
        }
    }

    pub fn with_input(mut self, input: Arc<dyn InputSource>) -> Self {
        self.input = input;
        self
    }

    pub fn with_user_proxy(mut self, enabled: bool) -> Self {
        self.config.enable_user_proxy = enabled;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub async fn build_participants(&self) -> Result<Vec<Arc<dyn ChatAgent>>> {
        let mut participants = create_participants(&self.ctx, &self.config.participants).await?;
        if self.config.enable_user_proxy {
            participants.push(Arc::new(UserProxyAgent::new(Arc::clone(&self.input))));
            tracing::info!("added user proxy to participants");
        }
        tracing::info!(
            orchestrator = %self.config.name,
            count = participants.len(),
            "created participants"
        );
        Ok(participants)
    }

    pub async fn build_team(&self) -> Result<SelectorGroupChat> {
        let participants = self.build_participants().await?;
        let model = self.ctx.model_for(&self.config_key)?;
        let mut team = SelectorGroupChat::new(self.config.name.clone(), participants, model)?
            .with_description(self.config.description.clone())
            .with_termination(self.config.termination())
            .with_allow_repeated_speaker(self.config.allow_repeated_speaker);
        if let Some(max_turns) = self.config.max_turns {
            team = team.with_max_turns(max_turns);
        }
        if let Some(prompt) = &self.config.selector_prompt {
            team = team.with_selector_prompt(prompt.clone());
        }
        Ok(team)
    }

    pub async fn run(&self, task: &str, events: &EventSink) -> Result<TaskResult> {
        self.run_until(task, events, std::future::pending()).await
    }

    /// Runs `task` until the team stops or `interrupt` resolves. An interrupted
    /// run yields a result with the `User interruption` stop reason and is not
    /// saved to interaction memory. Participants are closed either way.
    pub async fn run_until<F>(&self, task: &str, events: &EventSink, interrupt: F) -> Result<TaskResult>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(orchestrator = %self.config.name, task = %task, "starting orchestrator task");
        let team = self.build_team().await?;

        let outcome = team.run_until(task, events, interrupt).await;

        if let Ok(result) = &outcome {
            tracing::info!(orchestrator = %self.config.name, stop_reason = ?result.stop_reason, "orchestrator task completed");
            if is_interrupted(result) {
                tracing::debug!("interrupted run; conversation not saved");
            } else if let Err(err) = self.save_to_interaction_memory(&team, result) {
                tracing::warn!(error = %err, "failed to save conversation to interaction memory");
            }
        }

        if let Err(err) = team.close().await {
            tracing::warn!(error = %err, "failed to close orchestrator participants");
        }
        outcome
    }

    fn save_to_interaction_memory(&self, team: &SelectorGroupChat, result: &TaskResult) -> Result<bool> {
        let has_memory_agent = team
            .participant_names()
            .contains(&interaction_memory::AGENT_NAME);
        if !has_memory_agent {
            tracing::debug!("no interaction_memory participant; conversation not saved");
            return Ok(false);
        }
        let memory = InteractionMemory::open(&self.ctx.paths.data_dir)?;
        save_conversation(&memory, result)
    }
}

/// `Conversation summary:` followed by one `source: content` line per message.
pub fn conversation_summary(result: &TaskResult) -> Option<String> {
    if result.messages.is_empty() {
        return None;
    }
    let lines = result
        .messages
        .iter()
        .map(|m| format!("{}: {}", m.source, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    Some(format!("Conversation summary:\n{lines}"))
}

/// Stores the conversation in `memory`. Returns false when there was nothing to save.
pub fn save_conversation(memory: &InteractionMemory, result: &TaskResult) -> Result<bool> {
    let Some(summary) = conversation_summary(result) else {
        return Ok(false);
    };
    let mut metadata = BTreeMap::new();
    metadata.insert("source".to_string(), DEFAULT_ORCHESTRATOR_NAME.to_string());
    metadata.insert(
        "stop_reason".to_string(),
        result.stop_reason.clone().unwrap_or_default(),
    );
    memory.add(summary, metadata)?;
    tracing::info!(entries = memory.len(), "saved conversation summary to interaction memory");
    Ok(true)
}
