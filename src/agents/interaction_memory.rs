use std::sync::Arc;

use anyhow::Result;

use super::{AgentContext, BuiltinProfile, ChatAgent, configured_assistant};
use crate::memory::InteractionMemory;

pub const AGENT_NAME: &str = "interaction_memory";
pub const CONFIG_KEY: &str = "interaction_memory";

pub fn open_memory(ctx: &AgentContext) -> Result<Arc<InteractionMemory>> {
    Ok(Arc::new(InteractionMemory::open(&ctx.paths.data_dir)?))
}

pub async fn create_agent(ctx: &AgentContext) -> Result<Arc<dyn ChatAgent>> {
    let cfg = ctx.agent_config(CONFIG_KEY)?;
    let model = ctx.model_for(CONFIG_KEY)?;
    let settings = cfg.memory.clone().unwrap_or_default();

    let builtin = BuiltinProfile {
        system_message: "You remember earlier conversations with this user. When relevant \
                         memories are provided, use them to remind the team of past decisions, \
                         preferences and outcomes. If nothing relevant is remembered, say so \
                         briefly."
            .to_string(),
        description: "Agent that remembers past interactions.".to_string(),
        max_tool_iterations: 5,
    };

    let mut agent = configured_assistant(AGENT_NAME, model, &cfg, None, builtin);
    if settings.enabled {
        agent = agent.with_memory(open_memory(ctx)?, settings.top_k);
    }
    tracing::info!(agent = AGENT_NAME, memory_enabled = settings.enabled, "created interaction memory agent");
    Ok(Arc::new(agent))
}
