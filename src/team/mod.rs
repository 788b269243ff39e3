//! Selector group chat: a shared thread where a model picks the next speaker.

pub mod selector;
pub mod termination;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::agents::ChatAgent;
use crate::llm::{ChatMessage, Llm, LlmRequest};
use crate::messages::{EventSink, Response, TaskResult, TeamEvent, TextMessage};

pub use selector::DEFAULT_SELECTOR_PROMPT;
pub use termination::Termination;

pub const TASK_SOURCE: &str = "user";
pub const DEFAULT_MAX_SELECTOR_ATTEMPTS: usize = 3;
pub const INTERRUPTED_STOP_REASON: &str = "User interruption";

/// Result reported for a run cut short by the user.
pub fn interrupted_result() -> TaskResult {
    TaskResult {
        messages: vec![TextMessage::new("system", "Task was interrupted by user.")],
        stop_reason: Some(INTERRUPTED_STOP_REASON.to_string()),
    }
}

pub fn is_interrupted(result: &TaskResult) -> bool {
    result.stop_reason.as_deref() == Some(INTERRUPTED_STOP_REASON)
}

pub struct SelectorGroupChat {
    name: String,
    description: String,
    participants: Vec<Arc<dyn ChatAgent>>,
    model: Arc<dyn Llm>,
    selector_prompt: String,
    termination: Option<Termination>,
    max_turns: Option<usize>,
    allow_repeated_speaker: bool,
    max_selector_attempts: usize,
}

impl SelectorGroupChat {
    pub fn new(
        name: impl Into<String>,
        participants: Vec<Arc<dyn ChatAgent>>,
        model: Arc<dyn Llm>,
    ) -> Result<Self> {
        let name = name.into();
        if participants.is_empty() {
            anyhow::bail!("team '{name}' needs at least one participant");
        }
        let mut seen = HashSet::new();
        for participant in &participants {
            if !seen.insert(participant.name().to_string()) {
                anyhow::bail!(
                    "team '{name}' has duplicate participant name '{}'",
                    participant.name()
                );
            }
        }
        Ok(Self {
            name,
            description: "A team of agents.".to_string(),
            participants,
            model,
            selector_prompt: DEFAULT_SELECTOR_PROMPT.to_string(),
            termination: None,
            max_turns: None,
            allow_repeated_speaker: true,
            max_selector_attempts: DEFAULT_MAX_SELECTOR_ATTEMPTS,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_selector_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.selector_prompt = prompt.into();
        self
    }

    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = Some(termination);
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn with_allow_repeated_speaker(mut self, allow: bool) -> Self {
        self.allow_repeated_speaker = allow;
        self
    }

    pub fn with_max_selector_attempts(mut self, attempts: usize) -> Self {
        self.max_selector_attempts = attempts.max(1);
        self
    }

    pub fn participants(&self) -> &[Arc<dyn ChatAgent>] {
        &self.participants
    }

    pub fn participant_names(&self) -> Vec<&str> {
        self.participants.iter().map(|p| p.name()).collect()
    }

    /// Runs a fresh conversation on `task`, streaming every event and finally
    /// the [`TaskResult`] to `events`.
    pub async fn run(&self, task: &str, events: &EventSink) -> Result<TaskResult> {
        let task_message = TextMessage::new(TASK_SOURCE, task);
        events.emit(TeamEvent::Message(task_message.clone()));
        let (result, _) = self.run_thread(vec![task_message], events).await?;
        tracing::info!(team = %self.name, stop_reason = ?result.stop_reason, messages = result.messages.len(), "team run finished");
        events.emit(TeamEvent::TaskResult(result.clone()));
        Ok(result)
    }

    /// Like [`Self::run`], but stops early when `interrupt` resolves. The
    /// interrupted result is streamed to `events` as the final event.
    pub async fn run_until<F>(&self, task: &str, events: &EventSink, interrupt: F) -> Result<TaskResult>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.run(task, events) => result,
            _ = interrupt => {
                tracing::info!(team = %self.name, "team run interrupted by user");
                let result = interrupted_result();
                events.emit(TeamEvent::TaskResult(result.clone()));
                Ok(result)
            }
        }
    }

    async fn run_thread(
        &self,
        mut thread: Vec<TextMessage>,
        events: &EventSink,
    ) -> Result<(TaskResult, Vec<TeamEvent>)> {
        let mut produced = Vec::new();
        let mut previous: Option<String> = None;
        let mut turns = 0usize;
        let stop_reason = loop {
            if let Some(max) = self.max_turns
                && turns >= max
            {
                break Some(format!("Maximum number of turns {max} reached."));
            }

            let speaker = self.select_speaker(&thread, previous.as_deref()).await?;
            let speaker_name = speaker.name().to_string();
            tracing::info!(team = %self.name, speaker = %speaker_name, turn = turns + 1, "speaker selected");
            events.emit(TeamEvent::SelectSpeaker {
                team: self.name.clone(),
                speaker: speaker_name.clone(),
            });

            let response = speaker
                .on_messages(&thread, events)
                .await
                .with_context(|| format!("participant '{speaker_name}' failed in team '{}'", self.name))?;

            events.emit(TeamEvent::Message(response.message.clone()));
            thread.push(response.message.clone());
            turns += 1;
            previous = Some(speaker_name);

            let mut delta = response.inner_events;
            delta.push(TeamEvent::Message(response.message));
            let reason = self
                .termination
                .as_ref()
                .and_then(|t| t.check(&delta, thread.len()));
            produced.extend(delta);
            if reason.is_some() {
                break reason;
            }
        };

        Ok((
            TaskResult {
                messages: thread,
                stop_reason,
            },
            produced,
        ))
    }

    async fn select_speaker(
        &self,
        thread: &[TextMessage],
        previous: Option<&str>,
    ) -> Result<Arc<dyn ChatAgent>> {
        let mut candidates = self.participants.iter().collect::<Vec<_>>();
        if !self.allow_repeated_speaker
            && let Some(previous) = previous
        {
            candidates.retain(|p| p.name() != previous);
            if candidates.is_empty() {
                candidates = self.participants.iter().collect();
            }
        }
        if candidates.len() == 1 {
            return Ok(Arc::clone(candidates[0]));
        }

        let names = candidates.iter().map(|p| p.name()).collect::<Vec<_>>();
        let roles = selector::format_roles(candidates.iter().map(|p| (p.name(), p.description())));
        let participants = format!("[{}]", names.join(", "));
        let history = selector::format_history(thread);
        let prompt =
            selector::render_selector_prompt(&self.selector_prompt, &roles, &participants, &history);

        let mut messages = vec![ChatMessage::user(prompt)];
        for attempt in 1..=self.max_selector_attempts {
            let response = self
                .model
                .generate(LlmRequest::new(messages.clone()))
                .await
                .with_context(|| format!("speaker selection model call failed in team '{}'", self.name))?;
            let mentions = selector::mentioned_agents(&response.content, &names);

            if let [(chosen, _)] = mentions.as_slice()
                && let Some(agent) = candidates.iter().find(|p| p.name() == *chosen)
            {
                return Ok(Arc::clone(agent));
            }

            let feedback = if mentions.is_empty() {
                format!(
                    "No valid name was mentioned. Please select from: {}.",
                    names.join(", ")
                )
            } else {
                format!(
                    "Expected exactly one name to be mentioned. Please select only one from: {}.",
                    names.join(", ")
                )
            };
            tracing::debug!(team = %self.name, attempt, reply = %response.content, "speaker selection retry");
            messages.push(ChatMessage::assistant(response.content));
            messages.push(ChatMessage::user(feedback));
        }

        let fallback = previous
            .and_then(|prev| self.participants.iter().find(|p| p.name() == prev))
            .unwrap_or(candidates[0]);
        tracing::warn!(
            team = %self.name,
            attempts = self.max_selector_attempts,
            fallback = fallback.name(),
            "speaker selection failed; using fallback speaker"
        );
        Ok(Arc::clone(fallback))
    }
}

#[async_trait]
impl ChatAgent for SelectorGroupChat {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    /// Runs the team's own loop on a copy of the outer thread and answers with
    /// its last message. Everything the inner run produced is passed up so the
    /// outer termination condition sees it.
    async fn on_messages(&self, history: &[TextMessage], events: &EventSink) -> Result<Response> {
        let (result, produced) = self.run_thread(history.to_vec(), events).await?;
        tracing::info!(team = %self.name, stop_reason = ?result.stop_reason, "nested team finished");
        let content = result
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(Response {
            message: TextMessage::new(self.name.clone(), content),
            inner_events: produced,
        })
    }

    async fn reset(&self) -> Result<()> {
        for participant in &self.participants {
            participant.reset().await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        for participant in &self.participants {
            if let Err(err) = participant.close().await {
                tracing::warn!(team = %self.name, participant = participant.name(), error = %err, "failed to close participant");
            }
        }
        Ok(())
    }
}
