use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::{API_KEY_PLACEHOLDER, AppConfig, ModelProviderConfig, agent_config};
use crate::llm::{AnthropicClient, Llm, OpenAiCompatibleClient};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(alias = "autogen_ext.models.openai.OpenAIChatCompletionClient")]
    Openai,
    Openrouter,
    #[serde(alias = "autogen_ext.models.anthropic.AnthropicChatCompletionClient")]
    Anthropic,
    Deepseek,
    Groq,
    #[serde(alias = "autogen_ext.models.ollama.OllamaChatCompletionClient")]
    Ollama,
    Gemini,
}

impl ProviderKind {
    pub fn label(self) -> &'static str {
        match self {
            ProviderKind::Openai => "openai",
            ProviderKind::Openrouter => "openrouter",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Deepseek => "deepseek",
            ProviderKind::Groq => "groq",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Gemini => "gemini",
        }
    }

    pub fn default_base_url(self) -> String {
        match self {
            ProviderKind::Openai => "https://api.openai.com/v1".to_string(),
            ProviderKind::Openrouter => "https://openrouter.ai/api/v1".to_string(),
            ProviderKind::Anthropic => "https://api.anthropic.com".to_string(),
            ProviderKind::Deepseek => "https://api.deepseek.com/v1".to_string(),
            ProviderKind::Groq => "https://api.groq.com/openai/v1".to_string(),
            ProviderKind::Ollama => {
                let host = std::env::var("OLLAMA_HOST")
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| "http://localhost:11434".to_string());
                format!("{}/v1", host.trim_end_matches('/'))
            }
            ProviderKind::Gemini => {
                "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
            }
        }
    }

    /// Conventional environment variable holding the provider key, if any.
    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            ProviderKind::Openai => Some("OPENAI_API_KEY"),
            ProviderKind::Openrouter => Some("OPENROUTER_API_KEY"),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::Deepseek => Some("DEEPSEEK_API_KEY"),
            ProviderKind::Groq => Some("GROQ_API_KEY"),
            ProviderKind::Gemini => Some("GOOGLE_API_KEY"),
            ProviderKind::Ollama => None,
        }
    }
}

/// Rejects obviously mismatched model names. Custom base URLs (proxies,
/// gateways) skip the check since they may route any model id.
pub fn validate_model_for_provider(provider: &ModelProviderConfig) -> Result<()> {
    let model_name = provider.config.model.trim();
    if model_name.is_empty() {
        anyhow::bail!(
            "model provider '{}' has no model configured",
            provider.provider.label()
        );
    }
    if provider.config.base_url.is_some() {
        return Ok(());
    }

    let is_valid = match provider.provider {
        ProviderKind::Openai => {
            model_name.starts_with("gpt-")
                || model_name.starts_with("o1")
                || model_name.starts_with("o3")
                || model_name.starts_with("o4")
                || model_name.starts_with("chatgpt")
        }
        ProviderKind::Anthropic => model_name.starts_with("claude"),
        ProviderKind::Deepseek => model_name.starts_with("deepseek"),
        ProviderKind::Gemini => model_name.starts_with("gemini"),
        ProviderKind::Openrouter | ProviderKind::Groq | ProviderKind::Ollama => true,
    };

    if is_valid {
        return Ok(());
    }

    Err(anyhow::anyhow!(
        "model '{}' is not compatible with provider '{}'",
        model_name,
        provider.provider.label()
    ))
}

pub fn env_present(key: &str) -> bool {
    std::env::var(key)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}

fn usable_key(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != API_KEY_PLACEHOLDER)
        .map(str::to_string)
}

/// Literal key, then `api_key_env`, then the provider's conventional variable.
pub fn resolve_api_key(provider: &ModelProviderConfig) -> Result<Option<String>> {
    resolve_api_key_with(provider, |key| std::env::var(key).ok())
}

pub(crate) fn resolve_api_key_with(
    provider: &ModelProviderConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<String>> {
    if let Some(key) = usable_key(provider.config.api_key.as_deref()) {
        return Ok(Some(key));
    }
    if let Some(env_name) = provider.config.api_key_env.as_deref()
        && let Some(key) = usable_key(lookup(env_name).as_deref())
    {
        return Ok(Some(key));
    }
    let Some(conventional) = provider.provider.api_key_env() else {
        return Ok(None);
    };
    if let Some(key) = usable_key(lookup(conventional).as_deref()) {
        return Ok(Some(key));
    }

    let placeholder = provider.config.api_key.as_deref().map(str::trim) == Some(API_KEY_PLACEHOLDER);
    let mut message = format!(
        "no API key for model provider '{}': set api_key in config.yaml",
        provider.provider.label()
    );
    if let Some(env_name) = provider.config.api_key_env.as_deref() {
        message.push_str(&format!(", export {env_name}"));
    }
    message.push_str(&format!(" or export {conventional}"));
    if placeholder {
        message.push_str(" (the config still contains the <API_KEY> placeholder)");
    }
    Err(anyhow::anyhow!(message))
}

pub fn build_model_client(provider: &ModelProviderConfig) -> Result<Arc<dyn Llm>> {
    validate_model_for_provider(provider)?;
    let settings = &provider.config;
    let base_url = settings
        .base_url
        .clone()
        .unwrap_or_else(|| provider.provider.default_base_url());
    let timeout = Duration::from_secs(settings.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
    let api_key = resolve_api_key(provider)?;

    let client: Arc<dyn Llm> = match provider.provider {
        ProviderKind::Anthropic => {
            let key = api_key.context("Anthropic provider requires an API key")?;
            Arc::new(
                AnthropicClient::new(base_url.clone(), key, settings.model.clone(), timeout)?
                    .with_sampling(settings.temperature, settings.max_tokens),
            )
        }
        _ => Arc::new(
            OpenAiCompatibleClient::new(base_url.clone(), api_key, settings.model.clone(), timeout)?
                .with_sampling(settings.temperature, settings.max_tokens),
        ),
    };

    tracing::debug!(
        provider = provider.provider.label(),
        model = %settings.model,
        base_url = %base_url,
        "model client created"
    );
    Ok(client)
}

/// The provider an agent will use: its own `model_provider` if configured,
/// otherwise the default one.
pub fn provider_config_for(cfg: &AppConfig, agent_name: &str) -> Result<ModelProviderConfig> {
    let agent = agent_config(cfg, agent_name)?;
    match agent.model_provider {
        Some(provider) => {
            tracing::info!(agent = agent_name, provider = provider.provider.label(), model = %provider.config.model, "using agent-specific model provider");
            Ok(provider)
        }
        None => {
            tracing::info!(agent = agent_name, provider = cfg.default_model_provider.provider.label(), "using default model provider");
            Ok(cfg.default_model_provider.clone())
        }
    }
}

pub fn model_client_for(cfg: &AppConfig, agent_name: &str) -> Result<Arc<dyn Llm>> {
    let provider = provider_config_for(cfg, agent_name)?;
    build_model_client(&provider)
        .with_context(|| format!("failed to create model client for agent '{agent_name}'"))
}
