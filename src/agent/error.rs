//! Agent error types with retry classification.
//!
//! Distinguishes between transient errors (a status poll may be retried) and
//! permanent errors (surface immediately).

use thiserror::Error;

/// Error from the agent platform or the execute/poll protocol.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Bad local input (empty prompt, missing user token).
    #[error("{0}")]
    Validation(String),

    /// Service credential or account/agent identifiers are missing.
    #[error("Agent is not configured: {0}")]
    Configuration(String),

    /// The agent platform could not be reached at all.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to execute agent (HTTP {status}): {body}")]
    SubmitFailed { status: u16, body: String },

    #[error("Failed to get execution status (HTTP {status}): {body}")]
    StatusFailed { status: u16, body: String },

    /// A 2xx response whose body did not have the expected shape.
    #[error("Unexpected response from AI agent: {0}")]
    UnexpectedResponse(String),

    /// The agent reported a terminal failure.
    #[error("AI agent execution failed")]
    ExecutionFailed,

    /// The agent finished without an answer.
    #[error("No answer received from AI agent")]
    MissingAnswer,

    #[error("AI agent processing timeout after {attempts} status checks - please try again")]
    Timeout { attempts: u32 },

    /// Another prompt is still being processed.
    #[error("A prompt is already being processed")]
    AlreadyInProgress,
}

impl AgentError {
    /// Check if this error is transient and a status poll should be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::Network(_) => true,
            AgentError::SubmitFailed { status, .. } | AgentError::StatusFailed { status, .. } => {
                is_transient_status(*status)
            }
            _ => false,
        }
    }

    /// Message suitable for showing to the user as-is.
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Network(_) => "Network error: Unable to connect to the AI agent service. \
                 Please check your internet connection and try again."
                .to_string(),
            AgentError::SubmitFailed { status, .. } => {
                format!("Failed to execute agent ({}). Please try again.", status)
            }
            AgentError::StatusFailed { status, .. } => {
                format!("Failed to get execution status ({}). Please try again.", status)
            }
            AgentError::Configuration(_) => {
                "The AI agent service is not configured. Please contact your administrator."
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Rate limits and server errors are worth another poll; other 4xx are not.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 429 | 500..=599)
}
