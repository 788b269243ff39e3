use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    #[command(about = "Write the default config file (with every built-in agent section)")]
    Init {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    #[command(about = "Print the effective config with API keys masked")]
    Show,
    #[command(about = "Print the config file path")]
    Path,
    #[command(about = "Set a dotted key to a YAML value, e.g. agents.git.max_tool_iterations 30")]
    Set { key: String, value: String },
}

#[derive(Debug, Subcommand)]
pub enum AgentCommands {
    #[command(about = "List built-in participants and their aliases")]
    List,
    #[command(about = "Show the merged configuration of one agent")]
    Show { name: String },
}

#[derive(Debug, Subcommand)]
pub enum McpCommands {
    #[command(about = "Start an agent's MCP server and list the tools it offers")]
    Discover {
        #[arg(help = "coding_specialist, git or github")]
        agent: String,
        #[arg(long, default_value = ".")]
        repo: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
pub enum RepoCommands {
    #[command(about = "Print the stable id assigned to a repository")]
    Id { dir: PathBuf },
    #[command(about = "Build or refresh the search index of a repository")]
    Index { dir: PathBuf },
    #[command(about = "Search an indexed repository")]
    Search {
        dir: PathBuf,
        #[arg(required = true)]
        query: Vec<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ContainerCommands {
    #[command(about = "List containers started by this tool")]
    List,
    #[command(about = "Stop managed containers (all, or those of one repository)")]
    Stop {
        #[arg(long)]
        repo: Option<PathBuf>,
    },
    #[command(about = "Remove managed containers (all, or those of one repository)")]
    Remove {
        #[arg(long)]
        repo: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
pub enum TelemetryCommands {
    #[command(about = "Summarize telemetry events from a JSONL stream")]
    Report {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long, default_value_t = 5000)]
        limit: usize,
    },
}

const CLI_EXAMPLES: &str = "Examples:\n\
  robotsix-agents config init\n\
  robotsix-agents config set agents.orchestrator.participants '[\"repository_team[/work/app]\", github]'\n\
  robotsix-agents orchestrate --task \"Fix the failing unit test in src/lib.rs\"\n\
  robotsix-agents orchestrate --interactive\n\
  robotsix-agents team --repo . --task \"Add a CHANGELOG entry for the last release\"\n\
  robotsix-agents agents show repository_parser\n\
  robotsix-agents mcp discover git --repo .\n\
  robotsix-agents repo search . \"config loading\"\n\
  robotsix-agents containers remove --repo .\n\
  robotsix-agents telemetry report --limit 2000\n\
\n\
Participants:\n\
  - Written as 'name' or 'name[param1,param2]', e.g. 'git[/work/app]'.\n\
  - Repository agents take the repository directory as their first parameter.";

#[derive(Debug, Parser)]
#[command(name = "robotsix-agents")]
#[command(about = "Multi-agent orchestration for repository work")]
#[command(version)]
#[command(after_long_help = CLI_EXAMPLES)]
pub struct Cli {
    #[arg(long, env = "ROBOTSIX_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, env = "ROBOTSIX_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(long, env = "ROBOTSIX_LOG_LEVEL", value_enum, default_value_t = LogLevel::Warn, global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Manage the YAML configuration file")]
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    #[command(about = "Run the orchestrator on a task, or interactively with a user proxy")]
    Orchestrate {
        #[arg(long, default_value = "orchestrator")]
        agent_name: String,
        #[arg(long, conflicts_with = "interactive")]
        task: Option<String>,
        #[arg(long, default_value_t = false)]
        interactive: bool,
    },
    #[command(about = "Run the repository team directly on one repository")]
    Team {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        task: String,
    },
    #[command(about = "Inspect built-in agents")]
    Agents {
        #[command(subcommand)]
        command: AgentCommands,
    },
    #[command(about = "Inspect MCP tool servers")]
    Mcp {
        #[command(subcommand)]
        command: McpCommands,
    },
    #[command(about = "Repository ids, indexing and search")]
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },
    #[command(about = "Manage tool server containers")]
    Containers {
        #[command(subcommand)]
        command: ContainerCommands,
    },
    #[command(about = "Telemetry utilities and reporting")]
    Telemetry {
        #[command(subcommand)]
        command: TelemetryCommands,
    },
    #[command(about = "Check config, data paths, Docker and provider credentials")]
    Doctor,
}

pub fn command_label(command: &Commands) -> String {
    match command {
        Commands::Config { command } => match command {
            ConfigCommands::Init { .. } => "config.init".to_string(),
            ConfigCommands::Show => "config.show".to_string(),
            ConfigCommands::Path => "config.path".to_string(),
            ConfigCommands::Set { .. } => "config.set".to_string(),
        },
        Commands::Orchestrate { .. } => "orchestrate".to_string(),
        Commands::Team { .. } => "team".to_string(),
        Commands::Agents { command } => match command {
            AgentCommands::List => "agents.list".to_string(),
            AgentCommands::Show { .. } => "agents.show".to_string(),
        },
        Commands::Mcp { command } => match command {
            McpCommands::Discover { .. } => "mcp.discover".to_string(),
        },
        Commands::Repo { command } => match command {
            RepoCommands::Id { .. } => "repo.id".to_string(),
            RepoCommands::Index { .. } => "repo.index".to_string(),
            RepoCommands::Search { .. } => "repo.search".to_string(),
        },
        Commands::Containers { command } => match command {
            ContainerCommands::List => "containers.list".to_string(),
            ContainerCommands::Stop { .. } => "containers.stop".to_string(),
            ContainerCommands::Remove { .. } => "containers.remove".to_string(),
        },
        Commands::Telemetry { command } => match command {
            TelemetryCommands::Report { .. } => "telemetry.report".to_string(),
        },
        Commands::Doctor => "doctor".to_string(),
    }
}

/// Interactive unless a task was given.
pub fn orchestrate_is_interactive(task: Option<&str>, interactive: bool) -> bool {
    interactive || task.is_none_or(|t| t.trim().is_empty())
}
