//! API request and response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentAnswer, AgentError};
use crate::session::{Credential, SessionError, SessionPhase, SessionState};

/// Health check response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Whether a valid Desktop Central token is stored
    pub authenticated: bool,
    /// Whether the agent platform credentials are configured
    pub agent_configured: bool,
}

/// Session as shown to the browser. Never carries token values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Epoch milliseconds; absent for tokens without an expiry
    pub expires_at: Option<i64>,
    pub can_refresh: bool,
}

impl From<&SessionState> for SessionStatus {
    fn from(state: &SessionState) -> Self {
        let tokens = state.tokens.as_ref();
        Self {
            phase: state.phase,
            is_authenticated: state.is_authenticated,
            is_loading: state.is_loading,
            error: state.error.clone(),
            expires_at: tokens.and_then(|t| t.expires_at_ms()),
            can_refresh: tokens.map_or(false, |t| t.refresh_token.is_some()),
        }
    }
}

/// OAuth client credentials entered in the login form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

impl From<CredentialRequest> for Credential {
    fn from(req: CredentialRequest) -> Self {
        Credential::new(req.client_id, req.client_secret)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Consent page the browser should navigate to
    pub authorize_url: String,
}

/// A bearer token pasted by the user.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualTokenRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: AgentAnswer,
    /// The agent's answer text exactly as received
    pub raw: String,
}

/// Error response: `{ "error": message }` with a mapped status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_authenticated() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Please authenticate first")
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: &self.message,
            }),
        )
            .into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match &err {
            SessionError::Validation(_) | SessionError::MissingCredential => {
                StatusCode::BAD_REQUEST
            }
            SessionError::Security | SessionError::Provider(_) => StatusCode::UNAUTHORIZED,
            e @ SessionError::TokenExchange { .. } if e.is_invalid_grant() => {
                StatusCode::UNAUTHORIZED
            }
            SessionError::Network(_) | SessionError::TokenExchange { .. } => {
                StatusCode::BAD_GATEWAY
            }
            SessionError::Configuration(_)
            | SessionError::Storage(_)
            | SessionError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.user_message())
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        let status = match &err {
            AgentError::Validation(_) => StatusCode::BAD_REQUEST,
            AgentError::AlreadyInProgress => StatusCode::CONFLICT,
            AgentError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AgentError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AgentError::Network(_)
            | AgentError::SubmitFailed { .. }
            | AgentError::StatusFailed { .. }
            | AgentError::UnexpectedResponse(_)
            | AgentError::ExecutionFailed
            | AgentError::MissingAnswer => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.user_message())
    }
}
