//! OAuth2 authorization-code plumbing for the Desktop Central gateway.
//!
//! - [`authorize_url`] builds the consent-page URL the browser is sent to
//! - [`TokenEndpoint`] exchanges a code or refresh token for tokens

use async_trait::async_trait;
use rand::RngCore;
use reqwest::Client;

use super::error::SessionError;
use super::types::Credential;
use crate::config::OAuthConfig;

/// What is being traded at the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode { code: String },
    RefreshToken { refresh_token: String },
}

/// Successful token endpoint answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

/// Exchanges grants for tokens at the authorization server.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn exchange(
        &self,
        grant: &TokenGrant,
        credential: &Credential,
    ) -> Result<TokenResponse, SessionError>;
}

/// Random `state` nonce: 16 bytes from the thread CSPRNG, hex encoded.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Build the authorization request URL.
pub fn authorize_url(
    config: &OAuthConfig,
    client_id: &str,
    state: &str,
) -> Result<url::Url, SessionError> {
    let mut url = url::Url::parse(&config.authorize_url()).map_err(|e| {
        SessionError::Configuration(format!("Invalid OAuth base URL {}: {}", config.base_url, e))
    })?;

    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("scope", &config.scope)
        .append_pair("redirect_uri", &config.redirect_uri())
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("state", state);

    Ok(url)
}

/// Token endpoint over HTTP (`POST {base}/oauth/v2/token`, form encoded).
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    client: Client,
    config: OAuthConfig,
}

impl HttpTokenEndpoint {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn form(&self, grant: &TokenGrant, credential: &Credential) -> Vec<(&'static str, String)> {
        match grant {
            TokenGrant::AuthorizationCode { code } => vec![
                ("code", code.clone()),
                ("grant_type", "authorization_code".to_string()),
                ("client_id", credential.client_id.clone()),
                ("client_secret", credential.client_secret.clone()),
                ("redirect_uri", self.config.redirect_uri()),
                ("scope", self.config.scope.clone()),
            ],
            TokenGrant::RefreshToken { refresh_token } => vec![
                ("grant_type", "refresh_token".to_string()),
                ("refresh_token", refresh_token.clone()),
                ("client_id", credential.client_id.clone()),
                ("client_secret", credential.client_secret.clone()),
            ],
        }
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange(
        &self,
        grant: &TokenGrant,
        credential: &Credential,
    ) -> Result<TokenResponse, SessionError> {
        let response = self
            .client
            .post(self.config.token_url())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(&self.form(grant, credential))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SessionError::Network(format!("Request timeout: {}", e))
                } else if e.is_connect() {
                    SessionError::Network(format!("Connection failed: {}", e))
                } else {
                    SessionError::Network(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::error!("Token exchange failed with status {}: {}", status, body);
            return Err(SessionError::TokenExchange {
                status: status.as_u16(),
                body,
            });
        }

        parse_token_response(status.as_u16(), &body)
    }
}

/// Parse a 2xx token endpoint body.
///
/// Zoho reports some failures (e.g. a reused code) as `200 {"error": ...}`,
/// so a body without `access_token` is an exchange failure.
pub fn parse_token_response(status: u16, body: &str) -> Result<TokenResponse, SessionError> {
    let token_data: serde_json::Value =
        serde_json::from_str(body).map_err(|_| SessionError::TokenExchange {
            status,
            body: body.to_string(),
        })?;

    let access_token = token_data["access_token"]
        .as_str()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SessionError::TokenExchange {
            status,
            body: body.to_string(),
        })?;

    let expires_in = token_data["expires_in"]
        .as_i64()
        .or_else(|| token_data["expires_in"].as_str().and_then(|s| s.parse().ok()));

    Ok(TokenResponse {
        access_token: access_token.to_string(),
        refresh_token: token_data["refresh_token"].as_str().map(str::to_string),
        expires_in,
    })
}
