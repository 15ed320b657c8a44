//! Agent platform HTTP API (execute + status).

use async_trait::async_trait;
use reqwest::Client;

use super::error::AgentError;
use super::types::{
    ExecuteInputs, ExecuteRequest, ExecuteResponse, ExecutionHandle, ExecutionStatus,
    StatusResponse,
};
use crate::config::AgentConfig;

/// The two calls the execute-then-poll protocol needs.
#[async_trait]
pub trait AgentApi: Send + Sync {
    /// Start an execution for `prompt`, forwarding the user's token.
    async fn execute(&self, prompt: &str, user_token: &str) -> Result<ExecutionHandle, AgentError>;

    /// Fetch the current status of an execution.
    async fn status(&self, handle: &ExecutionHandle) -> Result<ExecutionStatus, AgentError>;
}

/// Resolved service credentials; all three must be configured.
struct ServiceTarget<'a> {
    service_token: &'a str,
    account_id: &'a str,
    agent_id: &'a str,
}

/// HTTP client for the agent platform, authenticated with the
/// service-level bearer credential.
#[derive(Debug, Clone)]
pub struct HttpAgentApi {
    client: Client,
    config: AgentConfig,
}

impl HttpAgentApi {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn target(&self) -> Result<ServiceTarget<'_>, AgentError> {
        let service_token = self
            .config
            .service_token
            .as_deref()
            .ok_or_else(|| AgentError::Configuration("Bearer token not configured".to_string()))?;

        match (self.config.account_id.as_deref(), self.config.agent_id.as_deref()) {
            (Some(account_id), Some(agent_id)) => Ok(ServiceTarget {
                service_token,
                account_id,
                agent_id,
            }),
            _ => Err(AgentError::Configuration(
                "Account ID or Agent ID not configured".to_string(),
            )),
        }
    }

    fn execute_url(&self, target: &ServiceTarget<'_>) -> String {
        format!(
            "{}/{}/agent/{}/execute",
            self.config.base_url, target.account_id, target.agent_id
        )
    }

    fn status_url(&self, target: &ServiceTarget<'_>, handle: &ExecutionHandle) -> String {
        format!(
            "{}/{}/agent/{}/status",
            self.config.base_url, target.account_id, handle.execution_id
        )
    }
}

fn network_error(e: reqwest::Error) -> AgentError {
    if e.is_timeout() {
        AgentError::Network(format!("Request timeout: {}", e))
    } else if e.is_connect() {
        AgentError::Network(format!("Connection failed: {}", e))
    } else {
        AgentError::Network(format!("Request failed: {}", e))
    }
}

#[async_trait]
impl AgentApi for HttpAgentApi {
    async fn execute(&self, prompt: &str, user_token: &str) -> Result<ExecutionHandle, AgentError> {
        let target = self.target()?;
        let body = ExecuteRequest {
            inputs: ExecuteInputs {
                user_prompt: prompt,
                auth_token: user_token,
            },
        };

        let response = self
            .client
            .post(self.execute_url(&target))
            .header("Authorization", format!("Bearer {}", target.service_token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::error!("Agent execution failed: {} {}", status, text);
            return Err(AgentError::SubmitFailed {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ExecuteResponse = serde_json::from_str(&text).map_err(|e| {
            AgentError::UnexpectedResponse(format!("Failed to parse execute response: {}", e))
        })?;

        Ok(ExecutionHandle::new(parsed.execution_id))
    }

    async fn status(&self, handle: &ExecutionHandle) -> Result<ExecutionStatus, AgentError> {
        let target = self.target()?;

        let response = self
            .client
            .get(self.status_url(&target, handle))
            .header("Authorization", format!("Bearer {}", target.service_token))
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::warn!("Status check failed: {} {}", status, text);
            return Err(AgentError::StatusFailed {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: StatusResponse = serde_json::from_str(&text).map_err(|e| {
            AgentError::UnexpectedResponse(format!("Failed to parse status response: {}", e))
        })?;

        Ok(parsed.into())
    }
}
