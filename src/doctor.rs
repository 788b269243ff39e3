use anyhow::Result;

use crate::config::{AppConfig, AppPaths, load_config};
use crate::docker::DockerCli;
use crate::mcp::resolve_github_token;
use crate::provider::{ProviderKind, env_present, provider_config_for, resolve_api_key};

const PROVIDER_KEYS: &[&str] = &[
    "OPENROUTER_API_KEY",
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "DEEPSEEK_API_KEY",
    "GROQ_API_KEY",
    "GOOGLE_API_KEY",
    "OLLAMA_HOST",
];

/// Agent sections whose model provider is checked.
const CHECKED_AGENTS: &[&str] = &[
    "orchestrator",
    "repository_team",
    "task_organizer",
    "coding_specialist",
    "git",
    "github",
    "repository_parser",
    "interaction_memory",
];

fn status(ok: bool) -> &'static str {
    if ok { "ok" } else { "missing" }
}

/// One line per agent describing its provider and whether a key resolves.
pub fn provider_report(cfg: &AppConfig) -> Vec<String> {
    CHECKED_AGENTS
        .iter()
        .map(|agent| match provider_config_for(cfg, agent) {
            Ok(provider) => {
                let key = match resolve_api_key(&provider) {
                    Ok(Some(_)) => "key=ok",
                    Ok(None) if provider.provider == ProviderKind::Ollama => "key=not-required",
                    Ok(None) => "key=missing",
                    Err(_) => "key=error",
                };
                format!(
                    "- {agent}: provider={} model={} {key}",
                    provider.provider.label(),
                    provider.config.model
                )
            }
            Err(err) => format!("- {agent}: invalid config ({err:#})"),
        })
        .collect()
}

pub async fn run_doctor(paths: &AppPaths) -> Result<()> {
    println!(
        "Config file: {} ({})",
        paths.config_file.display(),
        if paths.config_file.exists() { "found" } else { "not found" }
    );
    println!(
        "Data directory: {} ({})",
        paths.data_dir.display(),
        if paths.data_dir.is_dir() { "exists" } else { "will be created" }
    );

    let cfg = match load_config(&paths.config_file) {
        Ok(cfg) => Some(cfg),
        Err(err) => {
            println!("Config check: failed ({err:#})");
            println!("Tip: run 'robotsix-agents config init'");
            None
        }
    };

    println!("Provider environment check:");
    for key in PROVIDER_KEYS {
        println!("- {key}: {}", if env_present(key) { "set" } else { "missing" });
    }

    if let Some(cfg) = &cfg {
        println!("Agent model providers:");
        for line in provider_report(cfg) {
            println!("{line}");
        }
        println!(
            "Telemetry: enabled={} path={}",
            cfg.telemetry.enabled,
            paths.telemetry_path(cfg).display()
        );
    }

    let docker = DockerCli::default();
    match docker.available().await {
        Ok(version) => println!("Docker ({}): ok, server {version}", docker.binary()),
        Err(err) => {
            println!("Docker ({}): unavailable ({err:#})", docker.binary());
            println!("Tip: repository agents run their tools in Docker containers");
        }
    }

    let configured_token = cfg
        .as_ref()
        .and_then(|c| crate::config::agent_config(c, "github").ok())
        .and_then(|a| a.github_token);
    let token_ok = resolve_github_token(configured_token.as_deref()).is_ok();
    println!("GitHub token: {}", status(token_ok));

    Ok(())
}
