#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Provider,
    Container,
    Tooling,
    Input,
    Internal,
}

impl ErrorCategory {
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::Config => "CONFIG",
            ErrorCategory::Provider => "PROVIDER",
            ErrorCategory::Container => "CONTAINER",
            ErrorCategory::Tooling => "TOOLING",
            ErrorCategory::Input => "INPUT",
            ErrorCategory::Internal => "INTERNAL",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            ErrorCategory::Config => {
                "Run 'robotsix-agents config init' (add --force to overwrite) and edit the generated config.yaml."
            }
            ErrorCategory::Provider => {
                "Set api_key/api_key_env for the model provider in config.yaml or export the provider key (for example OPENROUTER_API_KEY)."
            }
            ErrorCategory::Container => {
                "Check that Docker is running and the mcp/filesystem, mcp/git and github-mcp-server images can be pulled."
            }
            ErrorCategory::Tooling => {
                "Review tool server configuration and retry with --log-level debug for detailed MCP logs."
            }
            ErrorCategory::Input => "Run robotsix-agents --help and correct command arguments.",
            ErrorCategory::Internal => {
                "Retry with --log-level debug. If it persists, capture logs and open an issue."
            }
        }
    }
}

pub fn categorize_error(err: &anyhow::Error) -> ErrorCategory {
    let msg = format!("{err:#}").to_ascii_lowercase();

    if msg.contains("api_key")
        || msg.contains("api key")
        || msg.contains("model provider")
        || msg.contains("provider")
    {
        return ErrorCategory::Provider;
    }

    if msg.contains("config") || msg.contains("yaml") {
        return ErrorCategory::Config;
    }

    if msg.contains("docker") || msg.contains("container") {
        return ErrorCategory::Container;
    }

    if msg.contains("participant")
        || msg.contains("unknown agent")
        || msg.contains("invalid value")
        || msg.contains("not a directory")
    {
        return ErrorCategory::Input;
    }

    if msg.contains("tool") || msg.contains("mcp") || msg.contains("index") {
        return ErrorCategory::Tooling;
    }

    ErrorCategory::Internal
}

pub fn format_cli_error(err: &anyhow::Error) -> String {
    let category = categorize_error(err);
    format!(
        "[{}] {}\nHint: {}",
        category.code(),
        redact_sensitive_text(&format!("{err:#}")),
        category.hint()
    )
}

const SECRET_PREFIXES: &[&str] = &["sk-", "ghp_", "github_pat_", "gsk_", "AIza"];

/// Masks tokens that look like provider or GitHub credentials, and whatever
/// follows a `Bearer` auth scheme (any case).
pub fn redact_sensitive_text(text: &str) -> String {
    let mut after_bearer = false;
    text.split_inclusive(char::is_whitespace)
        .map(|piece| {
            let token = piece.trim_end();
            if token.is_empty() {
                return piece.to_string();
            }
            let trailing = &piece[token.len()..];
            let bare = token.trim_matches(|c: char| matches!(c, '"' | '\'' | ',' | ';' | '(' | ')'));
            let secret = std::mem::take(&mut after_bearer)
                || (bare.len() > 8 && SECRET_PREFIXES.iter().any(|p| bare.starts_with(p)));
            after_bearer = bare.eq_ignore_ascii_case("bearer");
            if secret && !bare.is_empty() {
                format!("{}{}", token.replace(bare, "[REDACTED]"), trailing)
            } else {
                piece.to_string()
            }
        })
        .collect()
}

/// Hides all but the last four characters of a configured secret.
pub fn mask_secret(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == crate::config::API_KEY_PLACEHOLDER {
        return trimmed.to_string();
    }
    let visible = trimmed
        .char_indices()
        .rev()
        .nth(3)
        .map(|(idx, _)| &trimmed[idx..])
        .unwrap_or("");
    format!("****{visible}")
}
