//! Execute-then-poll client.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::answer::AgentAnswer;
use super::api::{AgentApi, HttpAgentApi};
use super::error::AgentError;
use super::types::{ExecutionHandle, ExecutionState};
use crate::config::AgentConfig;

/// Timing of the status poll loop.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Wait before each poll
    pub interval: Duration,
    /// Polls before declaring a timeout
    pub max_attempts: u32,
    /// Consecutive transient poll failure count at which the error surfaces
    pub max_consecutive_failures: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for PollPolicy {
    fn from(config: &AgentConfig) -> Self {
        Self {
            interval: config.poll_interval,
            max_attempts: config.max_poll_attempts,
            max_consecutive_failures: config.max_consecutive_poll_failures,
        }
    }
}

/// Submits prompts to the agent and waits for the answer.
///
/// Only one [`run`](Self::run) may be outstanding at a time.
pub struct ExecutionClient {
    api: Arc<dyn AgentApi>,
    poll: PollPolicy,
    in_flight: Mutex<()>,
}

impl ExecutionClient {
    pub fn new(api: Arc<dyn AgentApi>, poll: PollPolicy) -> Self {
        Self {
            api,
            poll,
            in_flight: Mutex::new(()),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(
            Arc::new(HttpAgentApi::new(config.clone())),
            PollPolicy::from(config),
        )
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.poll
    }

    /// Whether a `run` is currently outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Start an execution. `bearer_token` is the user's Desktop Central
    /// token, not the service credential.
    pub async fn submit(
        &self,
        prompt: &str,
        bearer_token: &str,
    ) -> Result<ExecutionHandle, AgentError> {
        if prompt.trim().is_empty() {
            return Err(AgentError::Validation("Please enter a prompt".to_string()));
        }
        if bearer_token.trim().is_empty() {
            return Err(AgentError::Validation("Please authenticate first".to_string()));
        }

        info!(prompt_chars = prompt.chars().count(), "Executing agent");
        let handle = self.api.execute(prompt, bearer_token).await?;
        info!("Agent execution started: {}", handle.execution_id);
        Ok(handle)
    }

    /// Poll `handle` until it finishes, fails, or `max_attempts` polls pass.
    pub async fn await_completion(
        &self,
        handle: &ExecutionHandle,
        max_attempts: u32,
    ) -> Result<String, AgentError> {
        let max_failures = self.poll.max_consecutive_failures.max(1);
        let mut consecutive_failures = 0u32;

        for attempt in 1..=max_attempts {
            tokio::time::sleep(self.poll.interval).await;

            let status = match self.api.status(handle).await {
                Ok(status) => {
                    consecutive_failures = 0;
                    status
                }
                Err(e) if e.is_transient() => {
                    consecutive_failures += 1;
                    if consecutive_failures >= max_failures {
                        error!(
                            "Status check for {} failed {} times in a row: {}",
                            handle.execution_id, consecutive_failures, e
                        );
                        return Err(e);
                    }
                    warn!(
                        "Attempt {}: status check failed ({}/{}): {}",
                        attempt, consecutive_failures, max_failures, e
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            debug!("Attempt {}: Status = {:?}", attempt, status.state);

            match status.state {
                ExecutionState::Finished => {
                    return status
                        .answer
                        .filter(|answer| !answer.is_empty())
                        .ok_or(AgentError::MissingAnswer);
                }
                ExecutionState::Failed => return Err(AgentError::ExecutionFailed),
                ExecutionState::Unknown => {
                    warn!("Attempt {}: unrecognized execution status", attempt);
                }
                ExecutionState::Queued | ExecutionState::Running => {}
            }
        }

        Err(AgentError::Timeout {
            attempts: max_attempts,
        })
    }

    /// Submit `prompt` and wait for the answer.
    ///
    /// Fails with [`AgentError::AlreadyInProgress`] while another run is
    /// outstanding. Dropping the future stops further polling.
    pub async fn run(&self, prompt: &str, bearer_token: &str) -> Result<String, AgentError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| AgentError::AlreadyInProgress)?;

        let handle = self.submit(prompt, bearer_token).await?;
        self.await_completion(&handle, self.poll.max_attempts).await
    }

    /// [`run`](Self::run) with the answer typed.
    pub async fn ask(&self, prompt: &str, bearer_token: &str) -> Result<AgentAnswer, AgentError> {
        let answer = self.run(prompt, bearer_token).await?;
        Ok(AgentAnswer::from_answer(&answer))
    }
}
