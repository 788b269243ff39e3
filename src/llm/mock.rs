use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::{Llm, LlmRequest, LlmResponse};

/// Scripted model: replays queued responses in order and records every request.
/// Once the script runs out it keeps answering with the fallback text.
pub struct MockLlm {
    name: String,
    script: Mutex<VecDeque<LlmResponse>>,
    fallback: String,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            fallback: String::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_responses(name: impl Into<String>, responses: Vec<LlmResponse>) -> Self {
        let mock = Self::new(name);
        mock.push_all(responses);
        mock
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = text.into();
        self
    }

    pub fn push(&self, response: LlmResponse) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    pub fn push_all(&self, responses: Vec<LlmResponse>) {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        script.extend(responses);
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Llm for MockLlm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        Ok(next.unwrap_or_else(|| LlmResponse::text(self.fallback.clone())))
    }
}
