//! Built-in agent defaults, embedded from `agent_defaults/*.yaml`.

use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};

const BUILTIN_DEFAULTS: &[(&str, &str)] = &[
    (
        "coding_specialist",
        include_str!("../agent_defaults/coding_specialist.yaml"),
    ),
    ("git", include_str!("../agent_defaults/git.yaml")),
    ("github", include_str!("../agent_defaults/github.yaml")),
    (
        "task_organizer",
        include_str!("../agent_defaults/task_organizer.yaml"),
    ),
    (
        "repository_parser",
        include_str!("../agent_defaults/repository_parser.yaml"),
    ),
    (
        "repository_team",
        include_str!("../agent_defaults/repository_team.yaml"),
    ),
    (
        "interaction_memory",
        include_str!("../agent_defaults/interaction_memory.yaml"),
    ),
    (
        "orchestrator",
        include_str!("../agent_defaults/orchestrator.yaml"),
    ),
];

pub fn list_available_defaults() -> Vec<&'static str> {
    BUILTIN_DEFAULTS.iter().map(|(name, _)| *name).collect()
}

/// Returns the built-in mapping for `agent_name`, or `None` when the agent
/// ships without defaults.
pub fn load_agent_default(agent_name: &str) -> Result<Option<Mapping>> {
    let Some((_, raw)) = BUILTIN_DEFAULTS
        .iter()
        .find(|(name, _)| *name == agent_name)
    else {
        tracing::debug!(agent = agent_name, "no built-in defaults for agent");
        return Ok(None);
    };

    let value: Value = serde_yaml::from_str(raw)
        .with_context(|| format!("failed to parse built-in YAML defaults for '{agent_name}'"))?;
    match value {
        Value::Mapping(mapping) => Ok(Some(mapping)),
        Value::Null => Ok(Some(Mapping::new())),
        _ => anyhow::bail!("built-in defaults for '{agent_name}' must be a YAML mapping"),
    }
}
