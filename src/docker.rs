//! Thin wrapper over the `docker` binary for the containers backing MCP servers.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;

pub const MANAGED_LABEL: &str = "robotsix-agents=1";
pub const REPO_LABEL_KEY: &str = "robotsix-agents.repo";

pub const FILESYSTEM_IMAGE: &str = "mcp/filesystem";
pub const GIT_IMAGE: &str = "mcp/git";
pub const GITHUB_IMAGE: &str = "ghcr.io/github/github-mcp-server";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Filesystem,
    Git,
}

impl ContainerKind {
    fn prefix(self) -> &'static str {
        match self {
            ContainerKind::Filesystem => "robotsix_fs",
            ContainerKind::Git => "robotsix_git",
        }
    }

    pub fn all() -> [ContainerKind; 2] {
        [ContainerKind::Filesystem, ContainerKind::Git]
    }
}

pub fn container_name(kind: ContainerKind, repo_id: &str) -> String {
    format!("{}_{}", kind.prefix(), repo_id)
}

/// `/projects/<basename>`, where the repository is mounted inside containers.
pub fn mount_target(repo_dir: &Path) -> String {
    let basename = repo_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "repository".to_string());
    format!("/projects/{basename}")
}

pub fn bind_mount_arg(repo_dir: &Path) -> String {
    format!(
        "type=bind,src={},dst={}",
        repo_dir.display(),
        mount_target(repo_dir)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedContainer {
    pub name: String,
    pub status: String,
    pub image: String,
}

#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            binary: std::env::var("ROBOTSIX_DOCKER_BIN")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "docker".to_string()),
        }
    }
}

struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    async fn run(&self, args: &[String]) -> Result<CommandOutput> {
        tracing::debug!(binary = %self.binary, args = ?args, "running docker command");
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| {
                format!(
                    "failed to run '{}'. Is Docker installed and on PATH?",
                    self.binary
                )
            })?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    pub async fn available(&self) -> Result<String> {
        let out = self
            .run(&strings(&["version", "--format", "{{.Server.Version}}"]))
            .await?;
        if !out.success {
            anyhow::bail!("docker daemon is not reachable: {}", out.stderr);
        }
        Ok(out.stdout)
    }

    /// Container state (`running`, `exited`, ...) or `None` when it does not exist.
    pub async fn inspect_status(&self, name: &str) -> Result<Option<String>> {
        let out = self.run(&inspect_args(name)).await?;
        if out.success {
            return Ok(Some(out.stdout));
        }
        if out.stderr.to_ascii_lowercase().contains("no such") {
            return Ok(None);
        }
        anyhow::bail!("docker inspect failed for container '{name}': {}", out.stderr)
    }

    pub async fn stop(&self, name: &str) -> Result<()> {
        let out = self.run(&strings(&["stop", name])).await?;
        if !out.success {
            anyhow::bail!("docker stop failed for container '{name}': {}", out.stderr);
        }
        tracing::info!(container = name, "container stopped");
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        let out = self.run(&strings(&["rm", "-f", name])).await?;
        if !out.success {
            anyhow::bail!("docker rm failed for container '{name}': {}", out.stderr);
        }
        tracing::info!(container = name, "container removed");
        Ok(())
    }

    /// Removes a leftover container with this name, if any. Returns whether one existed.
    pub async fn remove_if_present(&self, name: &str) -> Result<bool> {
        match self.inspect_status(name).await? {
            Some(status) => {
                tracing::warn!(container = name, status = %status, "removing stale container");
                self.remove(name).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn list_managed(&self) -> Result<Vec<ManagedContainer>> {
        let out = self.run(&list_managed_args()).await?;
        if !out.success {
            anyhow::bail!("docker ps failed: {}", out.stderr);
        }
        Ok(parse_container_listing(&out.stdout))
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

pub fn inspect_args(name: &str) -> Vec<String> {
    strings(&["inspect", "--format", "{{.State.Status}}", name])
}

pub fn list_managed_args() -> Vec<String> {
    strings(&[
        "ps",
        "-a",
        "--filter",
        &format!("label={MANAGED_LABEL}"),
        "--format",
        "{{.Names}}\t{{.Status}}\t{{.Image}}",
    ])
}

pub fn parse_container_listing(stdout: &str) -> Vec<ManagedContainer> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut fields = line.splitn(3, '\t');
            ManagedContainer {
                name: fields.next().unwrap_or_default().trim().to_string(),
                status: fields.next().unwrap_or_default().trim().to_string(),
                image: fields.next().unwrap_or_default().trim().to_string(),
            }
        })
        .collect()
}

/// `docker run` arguments for a repository-mounted MCP server.
pub fn repository_server_args(kind: ContainerKind, repo_dir: &Path, repo_id: &str) -> Vec<String> {
    let mut args = strings(&["run", "-i", "--rm"]);
    args.extend([
        "--name".to_string(),
        container_name(kind, repo_id),
        "--label".to_string(),
        MANAGED_LABEL.to_string(),
        "--label".to_string(),
        format!("{REPO_LABEL_KEY}={repo_id}"),
        "--mount".to_string(),
        bind_mount_arg(repo_dir),
    ]);
    match kind {
        ContainerKind::Filesystem => {
            args.push(FILESYSTEM_IMAGE.to_string());
            args.push("/projects".to_string());
        }
        ContainerKind::Git => args.push(GIT_IMAGE.to_string()),
    }
    args
}

pub fn github_server_args() -> Vec<String> {
    strings(&[
        "run",
        "-i",
        "--rm",
        "--label",
        MANAGED_LABEL,
        "-e",
        "GITHUB_PERSONAL_ACCESS_TOKEN",
        GITHUB_IMAGE,
    ])
}
