//! Execution handles, statuses and the agent platform's wire format.

use serde::{Deserialize, Serialize};

/// Opaque id of a submitted execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionHandle {
    pub execution_id: String,
}

impl ExecutionHandle {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
        }
    }
}

/// Execution lifecycle as reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Queued,
    Running,
    Finished,
    Failed,
    /// Any status this client does not know; polled like `running`.
    #[serde(other)]
    Unknown,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Finished | ExecutionState::Failed)
    }
}

/// One status poll result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStatus {
    pub state: ExecutionState,
    /// Only meaningful when `state` is `Finished`.
    pub answer: Option<String>,
}

impl ExecutionStatus {
    pub fn queued() -> Self {
        Self {
            state: ExecutionState::Queued,
            answer: None,
        }
    }

    pub fn running() -> Self {
        Self {
            state: ExecutionState::Running,
            answer: None,
        }
    }

    pub fn finished(answer: impl Into<String>) -> Self {
        Self {
            state: ExecutionState::Finished,
            answer: Some(answer.into()),
        }
    }

    pub fn failed() -> Self {
        Self {
            state: ExecutionState::Failed,
            answer: None,
        }
    }
}

/// `POST .../execute` body.
#[derive(Debug, Serialize)]
pub(crate) struct ExecuteRequest<'a> {
    pub inputs: ExecuteInputs<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExecuteInputs<'a> {
    pub user_prompt: &'a str,
    /// The user's Desktop Central token, forwarded to the agent's tools.
    pub auth_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExecuteResponse {
    pub execution_id: String,
}

/// `GET .../status` body. The top-level `status` string is not used.
#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
    pub execution: ExecutionBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExecutionBody {
    pub status: ExecutionState,
    #[serde(default)]
    pub outputs: Option<ExecutionOutputs>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExecutionOutputs {
    #[serde(default)]
    pub answer: Option<serde_json::Value>,
}

impl From<StatusResponse> for ExecutionStatus {
    fn from(response: StatusResponse) -> Self {
        // Agents may return the answer as a JSON object instead of a string;
        // keep it as compact JSON text so the answer typing sees one format.
        let answer = response
            .execution
            .outputs
            .and_then(|o| o.answer)
            .and_then(|value| match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s),
                other => Some(other.to_string()),
            });

        Self {
            state: response.execution.status,
            answer,
        }
    }
}
