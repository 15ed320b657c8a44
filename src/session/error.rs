//! Session error types.

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Bad local input (empty token, missing callback parameters).
    #[error("{0}")]
    Validation(String),

    /// Callback `state` did not match the pending nonce, or no nonce was pending.
    #[error("Invalid OAuth state parameter - possible security issue")]
    Security,

    /// The authorization server could not be reached at all.
    #[error("Network error: {0}")]
    Network(String),

    /// The authorization server answered with a failure.
    #[error("Failed to exchange authorization code for tokens (HTTP {status}): {body}")]
    TokenExchange { status: u16, body: String },

    /// The provider redirected back with `error=...`.
    #[error("Authorization was not granted: {0}")]
    Provider(String),

    #[error("OAuth credentials not found in session")]
    MissingCredential,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to serialize session data: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Message suitable for showing to the user as-is.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Network(_) => "Network error: Unable to connect to the Zoho OAuth server. \
                 Please check your internet connection."
                .to_string(),
            SessionError::TokenExchange { status, .. } => format!(
                "Failed to exchange authorization code for tokens ({}). Please try signing in again.",
                status
            ),
            SessionError::Storage(_) | SessionError::Serialization(_) => {
                "Could not access stored credentials.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Whether the authorization server rejected a refresh token for good.
    pub fn is_invalid_grant(&self) -> bool {
        match self {
            SessionError::TokenExchange { status, body } => {
                (*status == 400 || *status == 401) && body.to_lowercase().contains("invalid_grant")
            }
            _ => false,
        }
    }
}
