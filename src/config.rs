use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::defaults;
use crate::provider::ProviderKind;

pub const APP_DIR_NAME: &str = "robotsix-agents";
pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const API_KEY_PLACEHOLDER: &str = "<API_KEY>";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelClientSettings {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProviderConfig {
    pub provider: ProviderKind,
    #[serde(default)]
    pub config: ModelClientSettings,
}

impl Default for ModelProviderConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Openrouter,
            config: ModelClientSettings {
                model: "deepseek/deepseek-chat-v3-0324".to_string(),
                base_url: Some("https://openrouter.ai/api/v1".to_string()),
                api_key: Some(API_KEY_PLACEHOLDER.to_string()),
                ..ModelClientSettings::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub file_extensions: Vec<String>,
    pub exclude_directories: Vec<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_results: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            file_extensions: [
                "*.py", "*.js", "*.ts", "*.md", "*.json", "*.yaml", "*.yml", "*.rs", "*.toml",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            exclude_directories: [
                ".git",
                "node_modules",
                "__pycache__",
                ".venv",
                "venv",
                "build",
                "dist",
                ".idea",
                ".vscode",
                "target",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            chunk_size: 1000,
            chunk_overlap: 300,
            max_results: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    pub enabled: bool,
    pub top_k: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: 5,
        }
    }
}

/// One agent's section under `agents:`. Every key is optional; missing keys
/// fall back to the built-in defaults for that agent. Keys not listed here are
/// ignored, so sections written by other tools still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_provider: Option<ModelProviderConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tool_iterations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parser: Option<ParserConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_user_proxy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_repeated_speaker: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemorySettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub default_model_provider: ModelProviderConfig,
    pub agents: BTreeMap<String, AgentConfig>,
    pub telemetry: TelemetryConfig,
}

/// Resolved locations of the config file and the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    pub fn resolve(config_file: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Self> {
        let config_file = match config_file {
            Some(path) => path,
            None => default_config_path()?,
        };
        let data_dir = match data_dir {
            Some(path) => path,
            None => dirs::data_dir()
                .context("could not determine the platform data directory; pass --data-dir")?
                .join(APP_DIR_NAME),
        };
        Ok(Self {
            config_file,
            data_dir,
        })
    }

    pub fn telemetry_path(&self, cfg: &AppConfig) -> PathBuf {
        cfg.telemetry
            .path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_dir.join("telemetry").join("events.jsonl"))
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("could not determine the platform config directory; pass --config")?
        .join(APP_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}

/// The configuration written by `config init`: the default provider plus
/// every built-in agent section, so users can see what they may override.
pub fn default_config() -> Result<AppConfig> {
    let mut agents = BTreeMap::new();
    for name in defaults::list_available_defaults() {
        agents.insert(name.to_string(), builtin_agent_config(name)?);
    }
    Ok(AppConfig {
        agents,
        ..AppConfig::default()
    })
}

fn builtin_agent_config(name: &str) -> Result<AgentConfig> {
    let Some(mapping) = defaults::load_agent_default(name)? else {
        return Ok(AgentConfig::default());
    };
    serde_yaml::from_value(Value::Mapping(mapping))
        .with_context(|| format!("built-in defaults for agent '{name}' do not match the config schema"))
}

/// Writes the default config when the file is absent or `force` is set.
/// Returns whether anything was written.
pub fn create_default_config(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        tracing::info!(path = %path.display(), "config file already exists; leaving it untouched");
        return Ok(false);
    }
    save_config(path, &default_config()?)?;
    tracing::info!(path = %path.display(), "default config written");
    Ok(true)
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        anyhow::bail!(
            "config file '{}' not found. Run 'robotsix-agents config init' to create it",
            path.display()
        );
    }

    let raw = read_config_value(path)?;
    let cfg = match raw {
        Value::Null => AppConfig::default(),
        value => serde_yaml::from_value::<AppConfig>(value).with_context(|| {
            format!(
                "invalid config in '{}'. Check agent names and keys against 'robotsix-agents config show'",
                path.display()
            )
        })?,
    };
    validate_config(&cfg)?;
    Ok(cfg)
}

fn read_config_value(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Value::Null);
    }
    let value: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse YAML config '{}'", path.display()))?;
    match value {
        Value::Null | Value::Mapping(_) => Ok(value),
        _ => anyhow::bail!(
            "config file '{}' must contain a YAML mapping at the top level",
            path.display()
        ),
    }
}

pub fn save_config(path: &Path, cfg: &AppConfig) -> Result<()> {
    write_yaml(path, cfg)
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("failed to create config directory '{}'", parent.display())
        })?;
    }
    let yaml = serde_yaml::to_string(value).context("failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("failed to write config file '{}'", path.display()))
}

/// Merges top-level keys into the stored config, validates the result and saves it.
pub fn update_config(path: &Path, updates: Mapping) -> Result<AppConfig> {
    let mut current = current_config_mapping(path)?;
    for (key, value) in updates {
        current.insert(key, value);
    }
    persist_mapping(path, current)
}

/// Sets one value addressed by a dotted key such as `agents.git.max_tool_iterations`.
/// The value is parsed as YAML, so `20`, `true` and `[a, b]` keep their types.
pub fn set_config_value(path: &Path, dotted_key: &str, raw_value: &str) -> Result<AppConfig> {
    let segments = dotted_key
        .split('.')
        .map(str::trim)
        .collect::<Vec<_>>();
    if segments.iter().any(|s| s.is_empty()) {
        anyhow::bail!("invalid config key '{dotted_key}': empty segment");
    }
    let value: Value = serde_yaml::from_str(raw_value)
        .with_context(|| format!("invalid YAML value '{raw_value}' for key '{dotted_key}'"))?;

    let mut current = current_config_mapping(path)?;
    set_nested(&mut current, &segments, value);
    persist_mapping(path, current)
}

fn current_config_mapping(path: &Path) -> Result<Mapping> {
    if !path.exists() {
        return match serde_yaml::to_value(default_config()?)
            .context("failed to serialize default config")?
        {
            Value::Mapping(mapping) => Ok(mapping),
            _ => Ok(Mapping::new()),
        };
    }
    match read_config_value(path)? {
        Value::Mapping(mapping) => Ok(mapping),
        _ => Ok(Mapping::new()),
    }
}

/// Validates `mapping` against the schema, then writes the mapping itself so
/// keys the schema ignores are kept.
fn persist_mapping(path: &Path, mapping: Mapping) -> Result<AppConfig> {
    let value = Value::Mapping(mapping);
    let cfg: AppConfig = serde_yaml::from_value(value.clone())
        .context("updated config does not match the config schema")?;
    validate_config(&cfg)?;
    write_yaml(path, &value)?;
    Ok(cfg)
}

fn set_nested(target: &mut Mapping, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let key = Value::String((*head).to_string());
    if rest.is_empty() {
        target.insert(key, value);
        return;
    }
    if !matches!(target.get(&key), Some(Value::Mapping(_))) {
        target.insert(key.clone(), Value::Mapping(Mapping::new()));
    }
    if let Some(Value::Mapping(child)) = target.get_mut(&key) {
        set_nested(child, rest, value);
    }
}

/// Built-in defaults for `name` overlaid with the user's section. User keys win.
pub fn agent_config(cfg: &AppConfig, name: &str) -> Result<AgentConfig> {
    if name.trim().is_empty() {
        anyhow::bail!("agent name must not be empty");
    }

    let mut merged = defaults::load_agent_default(name)?.unwrap_or_default();
    if let Some(user) = cfg.agents.get(name)
        && let Value::Mapping(overrides) = serde_yaml::to_value(user)
            .with_context(|| format!("failed to serialize config for agent '{name}'"))?
    {
        for (key, value) in overrides {
            merged.insert(key, value);
        }
    }

    serde_yaml::from_value(Value::Mapping(merged))
        .with_context(|| format!("invalid config for agent '{name}'"))
}

pub fn validate_config(cfg: &AppConfig) -> Result<()> {
    validate_provider("default_model_provider", &cfg.default_model_provider)?;

    for (name, agent) in &cfg.agents {
        if name.trim().is_empty() {
            anyhow::bail!("config has an agent section with a blank name");
        }
        if let Some(provider) = &agent.model_provider {
            validate_provider(&format!("agents.{name}.model_provider"), provider)?;
        }
        if let Some(parser) = &agent.parser {
            if parser.chunk_size == 0 {
                anyhow::bail!("agents.{name}.parser.chunk_size must be greater than zero");
            }
            if parser.chunk_overlap >= parser.chunk_size {
                anyhow::bail!(
                    "agents.{name}.parser.chunk_overlap ({}) must be smaller than chunk_size ({})",
                    parser.chunk_overlap,
                    parser.chunk_size
                );
            }
        }
        if agent.max_turns == Some(0) {
            anyhow::bail!("agents.{name}.max_turns must be greater than zero");
        }
    }
    Ok(())
}

fn validate_provider(label: &str, provider: &ModelProviderConfig) -> Result<()> {
    if provider.config.model.trim().is_empty() {
        anyhow::bail!("{label}.config.model must not be empty");
    }
    Ok(())
}

fn mask_provider(provider: &mut ModelProviderConfig) {
    if let Some(key) = provider.config.api_key.as_mut() {
        *key = crate::error::mask_secret(key);
    }
}

/// Hides literal API keys and tokens of one agent section.
pub fn mask_agent_secrets(agent: &mut AgentConfig) {
    if let Some(provider) = agent.model_provider.as_mut() {
        mask_provider(provider);
    }
    if let Some(token) = agent.github_token.as_mut() {
        *token = crate::error::mask_secret(token);
    }
}

/// Copy of `cfg` safe to print.
pub fn masked_for_display(cfg: &AppConfig) -> AppConfig {
    let mut masked = cfg.clone();
    mask_provider(&mut masked.default_model_provider);
    for agent in masked.agents.values_mut() {
        mask_agent_secrets(agent);
    }
    masked
}
