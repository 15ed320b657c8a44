//! Session manager: the only writer of persisted token storage.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::error::SessionError;
use super::oauth::{self, HttpTokenEndpoint, TokenEndpoint, TokenGrant};
use super::types::{
    now_ms, Credential, SessionPhase, SessionState, TokenSet, CREDENTIAL_STORAGE_KEY,
    OAUTH_STATE_STORAGE_KEY, TOKEN_STORAGE_KEY,
};
use crate::config::{Config, OAuthConfig};
use crate::storage::{FileStore, KeyValueStore, MemoryStore};

/// Query parameters delivered to the OAuth callback.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Owns the authentication lifecycle.
///
/// Constructed once at process start and shared by `Arc`. Observers follow
/// transitions through [`SessionManager::subscribe`].
pub struct SessionManager {
    oauth: OAuthConfig,
    /// Survives restarts; holds the token set.
    durable: Arc<dyn KeyValueStore>,
    /// Process-scoped; holds the pending nonce and the login credential.
    transient: Arc<dyn KeyValueStore>,
    token_endpoint: Arc<dyn TokenEndpoint>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionManager {
    pub fn new(
        oauth: OAuthConfig,
        durable: Arc<dyn KeyValueStore>,
        transient: Arc<dyn KeyValueStore>,
        token_endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::loading());
        Self {
            oauth,
            durable,
            transient,
            token_endpoint,
            state_tx,
        }
    }

    /// File-backed tokens under `config.data_dir`, HTTP token endpoint.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.oauth.clone(),
            Arc::new(FileStore::new(&config.data_dir)),
            Arc::new(MemoryStore::new()),
            Arc::new(HttpTokenEndpoint::new(config.oauth.clone())),
        )
    }

    /// Current session snapshot.
    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Derive the session from persisted storage at process start.
    ///
    /// Expired or unreadable tokens are removed.
    pub async fn restore(&self) -> SessionState {
        match self.stored_tokens().await {
            Ok(Some(tokens)) if tokens.is_valid() => {
                info!("Restored Desktop Central session from storage");
                self.state_tx.send_replace(SessionState::authenticated(tokens));
            }
            Ok(stored) => {
                if stored.is_some() {
                    info!("Stored Desktop Central token has expired, clearing it");
                }
                if let Err(e) = self.durable.delete(TOKEN_STORAGE_KEY).await {
                    warn!("Failed to clear stale tokens: {}", e);
                }
                self.state_tx.send_replace(SessionState::unauthenticated(None));
            }
            Err(e) => {
                warn!("Failed to read stored tokens: {}", e);
                self.state_tx
                    .send_replace(SessionState::unauthenticated(Some(e.user_message())));
            }
        }
        self.state()
    }

    /// Start the authorization-code flow.
    ///
    /// Stores a fresh nonce and returns the consent-page URL; the caller
    /// navigates the browser there.
    pub async fn begin_oauth_login(&self, client_id: &str) -> Result<url::Url, SessionError> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(SessionError::Validation("Client ID is required".to_string()));
        }

        let state = oauth::generate_state();
        let url = oauth::authorize_url(&self.oauth, client_id, &state)?;
        self.transient.write(OAUTH_STATE_STORAGE_KEY, &state).await?;

        info!("Starting OAuth login for client {}", client_id);
        let next = match self.valid_stored_tokens().await {
            // A usable session stays usable until the new login lands.
            Some(tokens) => SessionState {
                phase: SessionPhase::AwaitingCallback,
                ..SessionState::authenticated(tokens)
            },
            None => SessionState::awaiting_callback(),
        };
        self.state_tx.send_replace(next);
        Ok(url)
    }

    /// [`begin_oauth_login`](Self::begin_oauth_login), also keeping the
    /// credential in transient storage for the callback handler.
    pub async fn begin_oauth_login_with(
        &self,
        credential: &Credential,
    ) -> Result<url::Url, SessionError> {
        if credential.client_id.trim().is_empty() || credential.client_secret.trim().is_empty() {
            return Err(SessionError::Validation(
                "Client ID and client secret are required".to_string(),
            ));
        }

        let json = serde_json::to_string(credential)?;
        self.transient.write(CREDENTIAL_STORAGE_KEY, &json).await?;

        match self.begin_oauth_login(&credential.client_id).await {
            Ok(url) => Ok(url),
            Err(e) => {
                self.discard_transient(CREDENTIAL_STORAGE_KEY).await;
                Err(e)
            }
        }
    }

    /// Validate the returned `state` and exchange `code` for tokens.
    ///
    /// The pending nonce and any stored login credential are consumed
    /// whether or not this succeeds.
    pub async fn complete_oauth_callback(
        &self,
        code: &str,
        returned_state: &str,
        credential: &Credential,
    ) -> Result<TokenSet, SessionError> {
        let result = self.exchange_code(code, returned_state, credential).await;
        self.discard_transient(CREDENTIAL_STORAGE_KEY).await;
        self.settle(result).await
    }

    /// Entry point for the redirect handler: pulls the stored credential
    /// and dispatches on the callback parameters.
    pub async fn handle_callback(&self, params: CallbackParams) -> Result<TokenSet, SessionError> {
        let result = self.handle_callback_inner(params).await;
        self.settle(result).await
    }

    /// Store a pasted bearer token. It never expires client-side.
    pub async fn set_manual_token(&self, raw: &str) -> Result<TokenSet, SessionError> {
        let token = raw.trim();
        if token.is_empty() {
            let err = SessionError::Validation("Token cannot be empty".to_string());
            self.record_error(&err);
            return Err(err);
        }

        let tokens = TokenSet::manual(token, now_ms());
        let result = self.persist(&tokens).await.map(|_| tokens);
        if result.is_ok() {
            info!("Manual Desktop Central token set");
        }
        self.settle(result).await
    }

    /// Access token of the persisted set, if it is still valid.
    ///
    /// Reading never clears storage.
    pub async fn get_current_token(&self) -> Option<String> {
        self.valid_stored_tokens()
            .await
            .map(|tokens| tokens.access_token)
    }

    /// Remove the persisted tokens.
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.durable.delete(TOKEN_STORAGE_KEY).await?;
        info!("Logged out of Desktop Central");
        self.state_tx.send_replace(SessionState::unauthenticated(None));
        Ok(())
    }

    /// Trade the stored refresh token for a new access token.
    ///
    /// A rejected (`invalid_grant`) refresh token ends the session.
    pub async fn refresh(&self, credential: &Credential) -> Result<TokenSet, SessionError> {
        let stored = self
            .stored_tokens()
            .await?
            .ok_or_else(|| SessionError::Validation("No stored tokens to refresh".to_string()))?;
        let refresh_token = stored.refresh_token.clone().ok_or_else(|| {
            SessionError::Validation("Stored tokens have no refresh token".to_string())
        })?;

        info!("Refreshing Desktop Central OAuth token");
        let grant = TokenGrant::RefreshToken {
            refresh_token: refresh_token.clone(),
        };

        let response = match self.token_endpoint.exchange(&grant, credential).await {
            Ok(r) => r,
            Err(e) if e.is_invalid_grant() => {
                warn!("Refresh token rejected, clearing stored tokens");
                if let Err(clear) = self.durable.delete(TOKEN_STORAGE_KEY).await {
                    warn!("Failed to clear rejected tokens: {}", clear);
                }
                self.state_tx
                    .send_replace(SessionState::unauthenticated(Some(e.user_message())));
                return Err(e);
            }
            Err(e) => {
                self.record_error(&e);
                return Err(e);
            }
        };

        let tokens = TokenSet {
            access_token: response.access_token,
            // Use old refresh token if not provided
            refresh_token: response.refresh_token.or(Some(refresh_token)),
            expires_in_seconds: response.expires_in,
            obtained_at_epoch_ms: now_ms(),
        };
        self.persist(&tokens).await?;
        info!(
            "Refreshed Desktop Central token, expires in {:?} seconds",
            tokens.expires_in_seconds
        );
        self.state_tx
            .send_replace(SessionState::authenticated(tokens.clone()));
        Ok(tokens)
    }

    async fn handle_callback_inner(&self, params: CallbackParams) -> Result<TokenSet, SessionError> {
        let credential_json = match self.take_transient(CREDENTIAL_STORAGE_KEY).await {
            Ok(json) => json,
            Err(e) => {
                self.discard_transient(OAUTH_STATE_STORAGE_KEY).await;
                return Err(e);
            }
        };

        if let Some(error) = params.error {
            warn!("OAuth provider returned error: {}", error);
            self.transient.delete(OAUTH_STATE_STORAGE_KEY).await?;
            return Err(SessionError::Provider(error));
        }

        let (code, state) = match (params.code, params.state) {
            (Some(code), Some(state)) if !code.is_empty() && !state.is_empty() => (code, state),
            _ => {
                self.transient.delete(OAUTH_STATE_STORAGE_KEY).await?;
                return Err(SessionError::Validation(
                    "Missing code or state parameter".to_string(),
                ));
            }
        };

        let credential: Credential = match credential_json
            .as_deref()
            .map(serde_json::from_str::<Credential>)
        {
            Some(Ok(credential)) => credential,
            Some(Err(e)) => {
                warn!("Failed to parse OAuth credentials: {}", e);
                self.transient.delete(OAUTH_STATE_STORAGE_KEY).await?;
                return Err(SessionError::MissingCredential);
            }
            None => {
                self.transient.delete(OAUTH_STATE_STORAGE_KEY).await?;
                return Err(SessionError::MissingCredential);
            }
        };

        self.exchange_code(&code, &state, &credential).await
    }

    async fn exchange_code(
        &self,
        code: &str,
        returned_state: &str,
        credential: &Credential,
    ) -> Result<TokenSet, SessionError> {
        let saved_state = self.take_transient(OAUTH_STATE_STORAGE_KEY).await?;
        if saved_state.as_deref() != Some(returned_state) {
            warn!(
                "OAuth state mismatch (pending state present: {})",
                saved_state.is_some()
            );
            return Err(SessionError::Security);
        }

        let grant = TokenGrant::AuthorizationCode {
            code: code.to_string(),
        };
        let response = self.token_endpoint.exchange(&grant, credential).await?;

        let tokens = TokenSet {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_in_seconds: response.expires_in,
            obtained_at_epoch_ms: now_ms(),
        };
        self.persist(&tokens).await?;
        info!("OAuth login completed");
        Ok(tokens)
    }

    /// Read then delete a transient slot. The delete runs even if the
    /// read failed.
    async fn take_transient(&self, key: &str) -> Result<Option<String>, SessionError> {
        let value = self.transient.read(key).await;
        self.transient.delete(key).await?;
        Ok(value?)
    }

    async fn stored_tokens(&self) -> Result<Option<TokenSet>, SessionError> {
        let Some(raw) = self.durable.read(TOKEN_STORAGE_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(e) => {
                debug!("Ignoring unparseable stored tokens: {}", e);
                Ok(None)
            }
        }
    }

    /// Best-effort delete of a transient slot.
    async fn discard_transient(&self, key: &str) {
        if let Err(e) = self.transient.delete(key).await {
            warn!("Failed to clear {}: {}", key, e);
        }
    }

    async fn valid_stored_tokens(&self) -> Option<TokenSet> {
        match self.stored_tokens().await {
            Ok(Some(tokens)) if tokens.is_valid() => Some(tokens),
            Ok(_) => None,
            Err(e) => {
                warn!("Failed to read stored tokens: {}", e);
                None
            }
        }
    }

    async fn persist(&self, tokens: &TokenSet) -> Result<(), SessionError> {
        let json = serde_json::to_string(tokens)?;
        self.durable.write(TOKEN_STORAGE_KEY, &json).await?;
        Ok(())
    }

    /// Publish the outcome of a login attempt.
    ///
    /// A failed attempt leaves a still-valid stored session authenticated.
    async fn settle(
        &self,
        result: Result<TokenSet, SessionError>,
    ) -> Result<TokenSet, SessionError> {
        let next = match &result {
            Ok(tokens) => SessionState::authenticated(tokens.clone()),
            Err(e) => {
                let error = Some(e.user_message());
                match self.valid_stored_tokens().await {
                    Some(tokens) => SessionState {
                        error,
                        ..SessionState::authenticated(tokens)
                    },
                    None => SessionState::unauthenticated(error),
                }
            }
        };
        self.state_tx.send_replace(next);
        result
    }

    /// Keep the current phase, surface the error.
    fn record_error(&self, err: &SessionError) {
        let message = err.user_message();
        self.state_tx.send_modify(|state| {
            state.is_loading = false;
            state.error = Some(message);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::oauth::TokenResponse;
    use crate::storage::StorageError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted token endpoint.
    #[derive(Default)]
    struct FakeTokenEndpoint {
        responses: Mutex<VecDeque<Result<TokenResponse, SessionError>>>,
        grants: Mutex<Vec<TokenGrant>>,
    }

    impl FakeTokenEndpoint {
        fn push(&self, response: Result<TokenResponse, SessionError>) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn grants(&self) -> Vec<TokenGrant> {
            self.grants.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TokenEndpoint for FakeTokenEndpoint {
        async fn exchange(
            &self,
            grant: &TokenGrant,
            _credential: &Credential,
        ) -> Result<TokenResponse, SessionError> {
            self.grants.lock().unwrap().push(grant.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SessionError::Network("no scripted response".to_string())))
        }
    }

    struct Harness {
        manager: SessionManager,
        durable: Arc<MemoryStore>,
        transient: Arc<MemoryStore>,
        endpoint: Arc<FakeTokenEndpoint>,
    }

    fn harness() -> Harness {
        let durable = Arc::new(MemoryStore::new());
        let transient = Arc::new(MemoryStore::new());
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        let manager = SessionManager::new(
            OAuthConfig::new("https://accounts.zoho.eu", "http://localhost:3000"),
            durable.clone(),
            transient.clone(),
            endpoint.clone(),
        );
        Harness {
            manager,
            durable,
            transient,
            endpoint,
        }
    }

    /// Transient store whose reads of one key fail.
    struct UnreadableSlot {
        inner: Arc<MemoryStore>,
        key: &'static str,
    }

    #[async_trait]
    impl KeyValueStore for UnreadableSlot {
        async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
            if key == self.key {
                return Err(StorageError::Io {
                    path: key.into(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "unreadable"),
                });
            }
            self.inner.read(key).await
        }

        async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.inner.write(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.inner.delete(key).await
        }
    }

    fn granted(access: &str, expires_in: Option<i64>) -> Result<TokenResponse, SessionError> {
        Ok(TokenResponse {
            access_token: access.to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expires_in,
        })
    }

    fn credential() -> Credential {
        Credential::new("1000.CLIENT", "secret")
    }

    fn state_param(url: &url::Url) -> String {
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .expect("state parameter")
    }

    #[tokio::test]
    async fn manual_token_is_immediately_current() {
        let h = harness();
        let tokens = h.manager.set_manual_token("abc123").await.unwrap();
        assert_eq!(tokens.expires_in_seconds, None);
        assert_eq!(h.manager.get_current_token().await.as_deref(), Some("abc123"));
        assert!(h.manager.state().is_authenticated);
    }

    #[tokio::test]
    async fn manual_token_is_trimmed_and_empty_rejected() {
        let h = harness();
        let err = h.manager.set_manual_token("   ").await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(h.durable.read(TOKEN_STORAGE_KEY).await.unwrap(), None);
        assert!(h.manager.state().error.is_some());

        h.manager.set_manual_token("  tok \n").await.unwrap();
        assert_eq!(h.manager.get_current_token().await.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn successful_callback_persists_stamped_tokens() {
        let h = harness();
        let url = h.manager.begin_oauth_login("1000.CLIENT").await.unwrap();
        assert_eq!(h.manager.state().phase, SessionPhase::AwaitingCallback);
        let nonce = state_param(&url);

        h.endpoint.push(granted("access-1", Some(3600)));
        let before = now_ms();
        let tokens = h
            .manager
            .complete_oauth_callback("code-1", &nonce, &credential())
            .await
            .unwrap();
        let after = now_ms();

        assert_eq!(tokens.access_token, "access-1");
        assert!(tokens.obtained_at_epoch_ms >= before && tokens.obtained_at_epoch_ms <= after);
        assert!(h.manager.state().is_authenticated);
        assert_eq!(h.manager.get_current_token().await.as_deref(), Some("access-1"));
        assert_eq!(h.transient.read(OAUTH_STATE_STORAGE_KEY).await.unwrap(), None);
        assert_eq!(
            h.endpoint.grants(),
            vec![TokenGrant::AuthorizationCode {
                code: "code-1".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn mismatched_state_fails_without_writing_tokens() {
        let h = harness();
        h.transient.write(OAUTH_STATE_STORAGE_KEY, "N1").await.unwrap();
        h.endpoint.push(granted("never", None));

        let err = h
            .manager
            .complete_oauth_callback("code", "N2", &credential())
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Security));
        assert_eq!(h.durable.read(TOKEN_STORAGE_KEY).await.unwrap(), None);
        assert_eq!(h.transient.read(OAUTH_STATE_STORAGE_KEY).await.unwrap(), None);
        assert!(h.endpoint.grants().is_empty());

        let state = h.manager.state();
        assert_eq!(state.phase, SessionPhase::Unauthenticated);
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn missing_pending_state_is_a_security_error() {
        let h = harness();
        let err = h
            .manager
            .complete_oauth_callback("code", "", &credential())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Security));
    }

    #[tokio::test]
    async fn failed_exchange_consumes_state_and_reports() {
        let h = harness();
        let url = h.manager.begin_oauth_login("1000.CLIENT").await.unwrap();
        h.endpoint.push(Err(SessionError::TokenExchange {
            status: 400,
            body: "bad code".to_string(),
        }));

        let err = h
            .manager
            .complete_oauth_callback("code", &state_param(&url), &credential())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::TokenExchange { status: 400, .. }));
        assert_eq!(h.transient.read(OAUTH_STATE_STORAGE_KEY).await.unwrap(), None);
        assert_eq!(h.manager.get_current_token().await, None);
        assert!(!h.manager.state().is_authenticated);
    }

    #[tokio::test]
    async fn handle_callback_consumes_credential_and_nonce() {
        let h = harness();
        let url = h
            .manager
            .begin_oauth_login_with(&credential())
            .await
            .unwrap();
        assert!(h.transient.read(CREDENTIAL_STORAGE_KEY).await.unwrap().is_some());

        h.endpoint.push(granted("access-2", Some(3600)));
        let tokens = h
            .manager
            .handle_callback(CallbackParams {
                code: Some("code-2".to_string()),
                state: Some(state_param(&url)),
                error: None,
            })
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "access-2");
        assert_eq!(h.transient.read(CREDENTIAL_STORAGE_KEY).await.unwrap(), None);
        assert_eq!(h.transient.read(OAUTH_STATE_STORAGE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn provider_error_clears_transient_slots() {
        let h = harness();
        h.manager
            .begin_oauth_login_with(&credential())
            .await
            .unwrap();

        let err = h
            .manager
            .handle_callback(CallbackParams {
                error: Some("access_denied".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Provider(ref e) if e == "access_denied"));
        assert_eq!(h.transient.read(CREDENTIAL_STORAGE_KEY).await.unwrap(), None);
        assert_eq!(h.transient.read(OAUTH_STATE_STORAGE_KEY).await.unwrap(), None);
        assert_eq!(h.manager.state().phase, SessionPhase::Unauthenticated);
    }

    #[tokio::test]
    async fn callback_without_credential_fails() {
        let h = harness();
        let url = h.manager.begin_oauth_login("1000.CLIENT").await.unwrap();
        let err = h
            .manager
            .handle_callback(CallbackParams {
                code: Some("code".to_string()),
                state: Some(state_param(&url)),
                error: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::MissingCredential));
        assert_eq!(h.transient.read(OAUTH_STATE_STORAGE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn logout_clears_current_token() {
        let h = harness();
        h.manager.set_manual_token("abc123").await.unwrap();
        h.manager.logout().await.unwrap();
        assert_eq!(h.manager.get_current_token().await, None);
        assert_eq!(h.manager.state().phase, SessionPhase::Unauthenticated);
    }

    #[tokio::test]
    async fn expired_token_is_not_current_but_not_cleared_on_read() {
        let h = harness();
        let expired = TokenSet {
            access_token: "old".to_string(),
            refresh_token: None,
            expires_in_seconds: Some(3600),
            obtained_at_epoch_ms: now_ms() - 2 * 3600 * 1000,
        };
        h.durable
            .write(TOKEN_STORAGE_KEY, &serde_json::to_string(&expired).unwrap())
            .await
            .unwrap();

        assert_eq!(h.manager.get_current_token().await, None);
        assert!(h.durable.read(TOKEN_STORAGE_KEY).await.unwrap().is_some());

        let state = h.manager.restore().await;
        assert!(!state.is_authenticated);
        assert!(!state.is_loading);
        assert_eq!(h.durable.read(TOKEN_STORAGE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn restore_authenticates_valid_tokens() {
        let h = harness();
        assert!(h.manager.state().is_loading);
        let valid = TokenSet::manual("kept", now_ms());
        h.durable
            .write(TOKEN_STORAGE_KEY, &serde_json::to_string(&valid).unwrap())
            .await
            .unwrap();

        let mut rx = h.manager.subscribe();
        let state = h.manager.restore().await;
        assert!(state.is_authenticated);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().phase, SessionPhase::Authenticated);
    }

    #[tokio::test]
    async fn corrupt_storage_reads_as_no_tokens() {
        let h = harness();
        h.durable.write(TOKEN_STORAGE_KEY, "{not json").await.unwrap();
        assert_eq!(h.manager.get_current_token().await, None);
    }

    #[tokio::test]
    async fn refresh_keeps_old_refresh_token_when_omitted() {
        let h = harness();
        let stored = TokenSet {
            access_token: "a1".to_string(),
            refresh_token: Some("r1".to_string()),
            expires_in_seconds: Some(3600),
            obtained_at_epoch_ms: now_ms() - 3500 * 1000,
        };
        h.durable
            .write(TOKEN_STORAGE_KEY, &serde_json::to_string(&stored).unwrap())
            .await
            .unwrap();
        assert_eq!(h.manager.get_current_token().await, None);

        h.endpoint.push(Ok(TokenResponse {
            access_token: "a2".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
        }));
        let tokens = h.manager.refresh(&credential()).await.unwrap();

        assert_eq!(tokens.refresh_token.as_deref(), Some("r1"));
        assert_eq!(h.manager.get_current_token().await.as_deref(), Some("a2"));
        assert_eq!(
            h.endpoint.grants(),
            vec![TokenGrant::RefreshToken {
                refresh_token: "r1".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn rejected_refresh_token_ends_session() {
        let h = harness();
        let stored = TokenSet {
            access_token: "a1".to_string(),
            refresh_token: Some("r1".to_string()),
            expires_in_seconds: Some(3600),
            obtained_at_epoch_ms: now_ms(),
        };
        h.durable
            .write(TOKEN_STORAGE_KEY, &serde_json::to_string(&stored).unwrap())
            .await
            .unwrap();
        h.endpoint.push(Err(SessionError::TokenExchange {
            status: 400,
            body: r#"{"error":"invalid_grant"}"#.to_string(),
        }));

        let err = h.manager.refresh(&credential()).await.unwrap_err();
        assert!(err.is_invalid_grant());
        assert_eq!(h.durable.read(TOKEN_STORAGE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_is_validation_error() {
        let h = harness();
        h.manager.set_manual_token("manual").await.unwrap();
        let err = h.manager.refresh(&credential()).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert!(h.endpoint.grants().is_empty());
    }

    #[tokio::test]
    async fn complete_oauth_callback_discards_stored_credential() {
        let h = harness();
        let url = h
            .manager
            .begin_oauth_login_with(&credential())
            .await
            .unwrap();
        h.endpoint.push(granted("access-3", Some(3600)));

        h.manager
            .complete_oauth_callback("code-3", &state_param(&url), &credential())
            .await
            .unwrap();

        assert_eq!(h.transient.read(CREDENTIAL_STORAGE_KEY).await.unwrap(), None);
        assert_eq!(h.transient.read(OAUTH_STATE_STORAGE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_complete_oauth_callback_discards_stored_credential() {
        let h = harness();
        h.manager
            .begin_oauth_login_with(&credential())
            .await
            .unwrap();

        let err = h
            .manager
            .complete_oauth_callback("code", "forged", &credential())
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Security));
        assert_eq!(h.transient.read(CREDENTIAL_STORAGE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn forged_callback_keeps_existing_session_authenticated() {
        let h = harness();
        h.manager.set_manual_token("dc").await.unwrap();
        h.transient.write(OAUTH_STATE_STORAGE_KEY, "N1").await.unwrap();

        let err = h
            .manager
            .complete_oauth_callback("c", "forged", &credential())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Security));

        let state = h.manager.state();
        let current = h.manager.get_current_token().await;
        assert_eq!(state.is_authenticated, current.is_some());
        assert_eq!(current.as_deref(), Some("dc"));
        assert_eq!(state.phase, SessionPhase::Authenticated);
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn new_login_keeps_existing_session_authenticated() {
        let h = harness();
        h.manager.set_manual_token("dc").await.unwrap();

        h.manager.begin_oauth_login("1000.CLIENT").await.unwrap();

        let state = h.manager.state();
        assert_eq!(state.phase, SessionPhase::AwaitingCallback);
        assert!(state.is_authenticated);
        assert_eq!(
            state.is_authenticated,
            h.manager.get_current_token().await.is_some()
        );
    }

    #[tokio::test]
    async fn unreadable_credential_still_consumes_nonce() {
        let inner = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(
            OAuthConfig::new("https://accounts.zoho.eu", "http://localhost:3000"),
            Arc::new(MemoryStore::new()),
            Arc::new(UnreadableSlot {
                inner: inner.clone(),
                key: CREDENTIAL_STORAGE_KEY,
            }),
            Arc::new(FakeTokenEndpoint::default()),
        );
        let url = manager.begin_oauth_login("1000.CLIENT").await.unwrap();

        let err = manager
            .handle_callback(CallbackParams {
                code: Some("code".to_string()),
                state: Some(state_param(&url)),
                error: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Storage(_)));
        assert_eq!(inner.read(OAUTH_STATE_STORAGE_KEY).await.unwrap(), None);
        assert!(!manager.state().is_authenticated);
    }
}
