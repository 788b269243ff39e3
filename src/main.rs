use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tokio::sync::mpsc;

use robotsix_agents::agents::{
    AgentContext, ChatAgent, KNOWN_AGENTS, canonical_agent_name, coding_specialist, git, github,
    repository_parser, repository_team,
};
use robotsix_agents::cli::{
    AgentCommands, Cli, Commands, ConfigCommands, ContainerCommands, McpCommands, RepoCommands,
    TelemetryCommands, command_label, orchestrate_is_interactive,
};
use robotsix_agents::config::{
    AppConfig, AppPaths, agent_config, create_default_config, default_config, load_config,
    mask_agent_secrets, masked_for_display, set_config_value,
};
use robotsix_agents::docker::{ContainerKind, DockerCli, container_name};
use robotsix_agents::error::{categorize_error, format_cli_error};
use robotsix_agents::messages::{EventSink, TaskResult};
use robotsix_agents::orchestrator::{INTERACTIVE_SESSION_TASK, Orchestrator};
use robotsix_agents::repo_id::{RepositoryIdManager, absolute_path};
use robotsix_agents::retrieval::RepositoryIndexer;
use robotsix_agents::streaming::{RULE, consume_events, final_text};
use robotsix_agents::telemetry::{TelemetrySink, run_telemetry_report};
use robotsix_agents::tools::Workbench;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(err) = run_cli(cli).await {
        eprintln!("{}", format_cli_error(&err));
        tracing::error!(category = %categorize_error(&err).code(), error = %err, "command failed");
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}

async fn run_cli(cli: Cli) -> Result<()> {
    init_tracing(cli.log_level.as_filter())?;
    let paths = AppPaths::resolve(cli.config, cli.data_dir)?;
    let label = command_label(&cli.command);
    tracing::debug!(command = %label, config = %paths.config_file.display(), data_dir = %paths.data_dir.display(), "resolved paths");

    let telemetry_cfg = load_or_default(&paths.config_file).unwrap_or_default();
    let telemetry = TelemetrySink::new(&telemetry_cfg, &paths, label.clone());
    telemetry.emit("command.started", json!({}));

    let outcome = dispatch(cli.command, &paths, &telemetry).await;
    match &outcome {
        Ok(()) => telemetry.emit("command.completed", json!({})),
        Err(err) => telemetry.emit(
            "command.failed",
            json!({ "category": categorize_error(err).code() }),
        ),
    }
    outcome
}

async fn dispatch(command: Commands, paths: &AppPaths, telemetry: &TelemetrySink) -> Result<()> {
    match command {
        Commands::Config { command } => run_config(command, paths),
        Commands::Orchestrate {
            agent_name,
            task,
            interactive,
        } => run_orchestrate(paths, telemetry, &agent_name, task, interactive).await,
        Commands::Team { repo, task } => run_team(paths, telemetry, &repo, &task).await,
        Commands::Agents { command } => run_agents(command, paths),
        Commands::Mcp { command } => match command {
            McpCommands::Discover { agent, repo } => run_mcp_discover(paths, &agent, &repo).await,
        },
        Commands::Repo { command } => run_repo(command, paths).await,
        Commands::Containers { command } => run_containers(command, paths).await,
        Commands::Telemetry { command } => match command {
            TelemetryCommands::Report { path, limit } => {
                let cfg = load_or_default(&paths.config_file)?;
                let path = path.unwrap_or_else(|| paths.telemetry_path(&cfg));
                run_telemetry_report(&path, limit)
            }
        },
        Commands::Doctor => robotsix_agents::doctor::run_doctor(paths).await,
    }
}

/// The stored config, or the built-in one when no file exists yet.
fn load_or_default(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "no config file; using built-in defaults");
        default_config()
    }
}

fn agent_context(paths: &AppPaths) -> Result<AgentContext> {
    let cfg = load_config(&paths.config_file)?;
    std::fs::create_dir_all(&paths.data_dir).with_context(|| {
        format!("failed to create data directory '{}'", paths.data_dir.display())
    })?;
    Ok(AgentContext::new(Arc::new(cfg), paths.clone()))
}

fn run_config(command: ConfigCommands, paths: &AppPaths) -> Result<()> {
    match command {
        ConfigCommands::Init { force } => {
            if create_default_config(&paths.config_file, force)? {
                println!("Created config file: {}", paths.config_file.display());
                println!("Edit default_model_provider.config.api_key (or export the provider key) before running agents.");
            } else {
                println!(
                    "Config file already exists: {} (use --force to overwrite)",
                    paths.config_file.display()
                );
            }
        }
        ConfigCommands::Show => {
            let cfg = load_config(&paths.config_file)?;
            let yaml = serde_yaml::to_string(&masked_for_display(&cfg))
                .context("failed to render config as YAML")?;
            print!("{yaml}");
        }
        ConfigCommands::Path => println!("{}", paths.config_file.display()),
        ConfigCommands::Set { key, value } => {
            set_config_value(&paths.config_file, &key, &value)?;
            println!("Updated '{key}' in {}", paths.config_file.display());
        }
    }
    Ok(())
}

fn run_agents(command: AgentCommands, paths: &AppPaths) -> Result<()> {
    match command {
        AgentCommands::List => {
            println!("Built-in participants:");
            for (name, aliases, summary) in KNOWN_AGENTS {
                if aliases.is_empty() {
                    println!("- {name}: {summary}");
                } else {
                    println!("- {name} (aliases: {}): {summary}", aliases.join(", "));
                }
            }
            println!("- orchestrator: top-level team built from agents.orchestrator.participants");
        }
        AgentCommands::Show { name } => {
            let cfg = load_or_default(&paths.config_file)?;
            let key = canonical_agent_name(&name).unwrap_or(name.as_str());
            let mut merged = agent_config(&cfg, key)?;
            mask_agent_secrets(&mut merged);
            let yaml = serde_yaml::to_string(&merged).context("failed to render agent config as YAML")?;
            println!("# agents.{key}");
            print!("{yaml}");
        }
    }
    Ok(())
}

/// Streams events to the console on a background task while `run` executes.
async fn with_event_stream<F, Fut>(telemetry: &TelemetrySink, run: F) -> Result<TaskResult>
where
    F: FnOnce(EventSink) -> Fut,
    Fut: std::future::Future<Output = Result<TaskResult>>,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(consume_events(rx, telemetry.clone(), true));
    let result = run(EventSink::new(tx)).await;
    if let Err(err) = printer.await {
        tracing::warn!(error = %err, "event printer task failed");
    }
    result
}

async fn interrupt_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn run_orchestrate(
    paths: &AppPaths,
    telemetry: &TelemetrySink,
    agent_name: &str,
    task: Option<String>,
    interactive: bool,
) -> Result<()> {
    let interactive = orchestrate_is_interactive(task.as_deref(), interactive);
    let ctx = agent_context(paths)?;
    let orchestrator = Orchestrator::from_config(ctx, agent_name)?.with_user_proxy(interactive);

    let task = if interactive {
        println!("Robotsix Agents Orchestrator - Interactive Session");
        println!("The orchestrator will coordinate with agents and request your input when needed.");
        println!("Type 'BYE' to end the session.");
        println!("{RULE}");
        INTERACTIVE_SESSION_TASK.to_string()
    } else {
        let task = task.unwrap_or_default();
        println!("🚀 Orchestrating task: {task}");
        println!("{RULE}");
        task
    };

    let result = with_event_stream(telemetry, |events| async move {
        orchestrator.run_until(&task, &events, interrupt_signal()).await
    })
    .await?;

    if interactive {
        if let Some(last) = result.last_message() {
            println!("💬 {}: {}", last.source, last.content);
        }
    } else {
        println!("\n📝 Final result: {}", final_text(&result));
    }
    Ok(())
}

async fn run_team(paths: &AppPaths, telemetry: &TelemetrySink, repo: &Path, task: &str) -> Result<()> {
    let repo_dir = absolute_path(repo)?;
    if !repo_dir.is_dir() {
        anyhow::bail!("repository path '{}' is not a directory", repo_dir.display());
    }
    let ctx = agent_context(paths)?;
    let team = repository_team::build_team(&ctx, &repo_dir).await?;

    println!("🚀 Running {} on: {task}", team.name());
    println!("{RULE}");

    let result = with_event_stream(telemetry, |events| {
        let team = &team;
        async move { team.run_until(task, &events, interrupt_signal()).await }
    })
    .await;

    if let Err(err) = team.close().await {
        tracing::warn!(error = %err, "failed to close team participants");
    }
    println!("\n📝 Final result: {}", final_text(&result?));
    Ok(())
}

async fn run_mcp_discover(paths: &AppPaths, agent: &str, repo: &Path) -> Result<()> {
    let ctx = agent_context(paths)?;
    let repo_dir = absolute_path(repo)?;
    let workbench = match canonical_agent_name(agent) {
        Some("coding_specialist") => coding_specialist::filesystem_workbench(&ctx, &repo_dir)?,
        Some("git") => git::git_workbench(&ctx, &repo_dir)?,
        Some("github") => github::github_workbench(&ctx)?,
        _ => anyhow::bail!(
            "agent '{agent}' has no MCP server; expected coding_specialist, git or github"
        ),
    };

    println!("MCP server: {}", workbench.params().display());
    let listed = workbench.list_tools().await;
    if let Err(err) = workbench.stop().await {
        tracing::warn!(error = %err, "failed to stop MCP server after discovery");
    }
    let tools = listed?;
    println!("Tools ({}):", tools.len());
    for tool in tools {
        if tool.description.is_empty() {
            println!("- {}", tool.name);
        } else {
            println!("- {}: {}", tool.name, tool.description);
        }
    }
    Ok(())
}

async fn run_repo(command: RepoCommands, paths: &AppPaths) -> Result<()> {
    match command {
        RepoCommands::Id { dir } => {
            let repo_dir = absolute_path(&dir)?;
            let mut manager = RepositoryIdManager::open(&paths.data_dir)?;
            let repo_id = manager.get_repo_id(&repo_dir)?;
            println!("Repository: {}", repo_dir.display());
            println!("Id: {repo_id}");
            println!("Data directory: {}", manager.data_dir(&repo_id).display());
        }
        RepoCommands::Index { dir } => {
            let indexer = repo_indexer(paths, &dir)?;
            let stats = tokio::task::spawn_blocking(move || indexer.index_repository())
                .await
                .context("indexing task panicked")??;
            println!("Indexed repository {} (id {})", dir.display(), stats.repo_id);
            println!("Files: {}  Chunks: {}", stats.files, stats.chunks);
            println!("Extensions: {}", stats.file_extensions.join(", "));
            println!("Excluded: {}", stats.excluded_patterns.join(", "));
            println!("Index data: {}", stats.data_dir.display());
        }
        RepoCommands::Search { dir, query, limit } => {
            let cfg = load_or_default(&paths.config_file)?;
            let max_results = agent_config(&cfg, repository_parser::CONFIG_KEY)?
                .parser
                .unwrap_or_default()
                .max_results;
            let indexer = repo_indexer(paths, &dir)?;
            let query = query.join(" ");
            let lookup = query.clone();
            let limit = limit.unwrap_or(max_results).max(1);
            let results = tokio::task::spawn_blocking(move || indexer.search(&lookup, limit))
                .await
                .context("search task panicked")??;
            print!("{}", repository_parser::format_search_results(&query, &results));
            if results.is_empty() {
                println!();
            }
        }
    }
    Ok(())
}

fn repo_indexer(paths: &AppPaths, dir: &Path) -> Result<RepositoryIndexer> {
    let cfg = load_or_default(&paths.config_file)?;
    let parser = agent_config(&cfg, repository_parser::CONFIG_KEY)?
        .parser
        .unwrap_or_default();
    RepositoryIndexer::new(dir, &paths.data_dir, parser)
}

/// Names of the repository's tool containers, or every managed container.
async fn target_containers(docker: &DockerCli, paths: &AppPaths, repo: Option<&Path>) -> Result<Vec<String>> {
    match repo {
        Some(repo) => {
            let repo_dir = absolute_path(repo)?;
            let mut manager = RepositoryIdManager::open(&paths.data_dir)?;
            let repo_id = manager.get_repo_id(&repo_dir)?;
            Ok(ContainerKind::all()
                .into_iter()
                .map(|kind| container_name(kind, &repo_id))
                .collect())
        }
        None => Ok(docker
            .list_managed()
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect()),
    }
}

async fn run_containers(command: ContainerCommands, paths: &AppPaths) -> Result<()> {
    let docker = DockerCli::default();
    match command {
        ContainerCommands::List => {
            let containers = docker.list_managed().await?;
            if containers.is_empty() {
                println!("No managed containers.");
            }
            for container in containers {
                println!("- {} [{}] {}", container.name, container.status, container.image);
            }
        }
        ContainerCommands::Stop { repo } => {
            for name in target_containers(&docker, paths, repo.as_deref()).await? {
                match docker.inspect_status(&name).await? {
                    Some(status) if status == "running" => {
                        docker.stop(&name).await?;
                        println!("Stopped {name}");
                    }
                    Some(status) => println!("{name} is not running ({status})"),
                    None => println!("{name} does not exist"),
                }
            }
        }
        ContainerCommands::Remove { repo } => {
            for name in target_containers(&docker, paths, repo.as_deref()).await? {
                if docker.remove_if_present(&name).await? {
                    println!("Removed {name}");
                } else {
                    println!("{name} does not exist");
                }
            }
        }
    }
    Ok(())
}
