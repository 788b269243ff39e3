use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use super::ChatAgent;
use crate::messages::{EventSink, Response, TextMessage};

pub const USER_PROXY_NAME: &str = "user_proxy";
pub const END_OF_INPUT_REPLY: &str = "BYE";

/// Blocking line source. `Ok(None)` means the user interrupted or closed input.
pub trait InputSource: Send + Sync {
    fn read_line(&self, prompt: &str) -> Result<Option<String>>;
}

#[derive(Debug, Default)]
pub struct ConsoleInput;

impl InputSource for ConsoleInput {
    fn read_line(&self, prompt: &str) -> Result<Option<String>> {
        let mut editor = DefaultEditor::new().context("failed to initialize console input")?;
        match editor.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
            Err(err) => Err(anyhow::anyhow!("failed to read console input: {err}")),
        }
    }
}

/// Replays canned replies; runs dry as end-of-input.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    lines: Mutex<VecDeque<String>>,
}

impl ScriptedInput {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines: Mutex::new(lines.into()),
        }
    }
}

impl InputSource for ScriptedInput {
    fn read_line(&self, _prompt: &str) -> Result<Option<String>> {
        Ok(self
            .lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front())
    }
}

/// Stands in for the human in the group conversation.
pub struct UserProxyAgent {
    name: String,
    description: String,
    input: Arc<dyn InputSource>,
}

impl UserProxyAgent {
    pub fn new(input: Arc<dyn InputSource>) -> Self {
        Self {
            name: USER_PROXY_NAME.to_string(),
            description: "A human user who reviews progress, answers questions and can end the session by saying BYE.".to_string(),
            input,
        }
    }
}

#[async_trait]
impl ChatAgent for UserProxyAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn on_messages(&self, _history: &[TextMessage], _events: &EventSink) -> Result<Response> {
        let input = Arc::clone(&self.input);
        let line = tokio::task::spawn_blocking(move || input.read_line("Enter your response: "))
            .await
            .context("console input task panicked")??;
        let content = match line {
            Some(line) => line.trim().to_string(),
            None => END_OF_INPUT_REPLY.to_string(),
        };
        Ok(Response::text(self.name.clone(), content))
    }
}
