//! Agent execution abstraction

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use waveorch_core::{AgentConfig, OrchError, Result};

/// Runs one prompt against an external coding agent
///
/// Implementations own the transport (terminal session, subprocess) and the
/// per-agent timeout; a timeout must surface as [`OrchError::Execution`].
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Execute `prompt` with `agent` and return its raw output
    async fn execute(&self, agent: &AgentConfig, prompt: &str) -> Result<String>;
}

/// Mock agent executor for testing
#[derive(Clone, Default)]
pub struct MockAgentExecutor {
    responses: HashMap<String, String>,
    failures: HashMap<String, String>,
    prompts: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockAgentExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canned output for every run of `agent`
    pub fn with_response(mut self, agent: &str, output: impl Into<String>) -> Self {
        self.responses.insert(agent.to_string(), output.into());
        self
    }

    /// Every run of `agent` fails with `message`
    pub fn with_failure(mut self, agent: &str, message: impl Into<String>) -> Self {
        self.failures.insert(agent.to_string(), message.into());
        self
    }

    /// `(agent, prompt)` pairs seen so far
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AgentExecutor for MockAgentExecutor {
    async fn execute(&self, agent: &AgentConfig, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((agent.name.clone(), prompt.to_string()));

        if let Some(message) = self.failures.get(&agent.name) {
            return Err(OrchError::Execution(message.clone()));
        }
        self.responses
            .get(&agent.name)
            .cloned()
            .ok_or_else(|| OrchError::Execution(format!("No mock response for: {}", agent.name)))
    }
}
