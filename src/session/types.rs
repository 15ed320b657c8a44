//! Session data model: credentials, persisted token set, observable state.

use serde::{Deserialize, Serialize};

/// Storage key for the persisted [`TokenSet`] (durable store).
pub const TOKEN_STORAGE_KEY: &str = "desktop_central_tokens";

/// Storage key for the login [`Credential`] (transient store).
pub const CREDENTIAL_STORAGE_KEY: &str = "oauth_credentials";

/// Storage key for the pending OAuth `state` nonce (transient store).
pub const OAUTH_STATE_STORAGE_KEY: &str = "oauth_state";

/// Tokens are treated as expired this long before the server would reject them.
pub const EXPIRY_BUFFER_MS: i64 = 5 * 60 * 1000;

/// OAuth client credential entered on the login form.
///
/// Only lives between login initiation and the callback.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub client_id: String,
    pub client_secret: String,
}

impl Credential {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into().trim().to_string(),
            client_secret: client_secret.into().trim().to_string(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// The single active set of Desktop Central tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Lifetime reported by the authorization server. `None` never expires.
    #[serde(rename = "expires_in", default, skip_serializing_if = "Option::is_none")]
    pub expires_in_seconds: Option<i64>,

    /// Local clock at the moment the tokens were obtained, in Unix milliseconds.
    #[serde(rename = "obtained_at")]
    pub obtained_at_epoch_ms: i64,
}

impl TokenSet {
    /// A pasted bearer token; it carries no expiry.
    pub fn manual(access_token: impl Into<String>, now_ms: i64) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_in_seconds: None,
            obtained_at_epoch_ms: now_ms,
        }
    }

    /// Server-side expiry instant, if the token has one.
    pub fn expires_at_ms(&self) -> Option<i64> {
        self.expires_in_seconds
            .map(|secs| self.obtained_at_epoch_ms.saturating_add(secs.saturating_mul(1000)))
    }

    /// Whether the token is usable at `now_ms`, keeping a five minute
    /// margin before the server-side expiry.
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expires_at_ms() {
            Some(expires_at) => now_ms < expires_at - EXPIRY_BUFFER_MS,
            None => true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_ms())
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in_seconds", &self.expires_in_seconds)
            .field("obtained_at_epoch_ms", &self.obtained_at_epoch_ms)
            .finish()
    }
}

/// `false` for no tokens, otherwise [`TokenSet::is_valid`].
pub fn is_valid(tokens: Option<&TokenSet>) -> bool {
    tokens.map(TokenSet::is_valid).unwrap_or(false)
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Where the session sits in the login lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Unauthenticated,
    AwaitingCallback,
    Authenticated,
}

/// Snapshot of the session as observed by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub is_authenticated: bool,
    pub tokens: Option<TokenSet>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl SessionState {
    /// State before persisted storage has been read.
    pub fn loading() -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            is_authenticated: false,
            tokens: None,
            is_loading: true,
            error: None,
        }
    }

    pub fn authenticated(tokens: TokenSet) -> Self {
        Self {
            phase: SessionPhase::Authenticated,
            is_authenticated: true,
            tokens: Some(tokens),
            is_loading: false,
            error: None,
        }
    }

    pub fn unauthenticated(error: Option<String>) -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            is_authenticated: false,
            tokens: None,
            is_loading: false,
            error,
        }
    }

    pub fn awaiting_callback() -> Self {
        Self {
            phase: SessionPhase::AwaitingCallback,
            is_authenticated: false,
            tokens: None,
            is_loading: false,
            error: None,
        }
    }
}
