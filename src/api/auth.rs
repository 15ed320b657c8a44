//! Desktop Central session endpoints.
//!
//! The browser never sees token values; every endpoint answers with a
//! [`SessionStatus`].

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};

use super::routes::AppState;
use super::types::{
    ApiError, CredentialRequest, LoginResponse, ManualTokenRequest, SessionStatus,
};
use crate::session::{CallbackParams, Credential};

fn snapshot(state: &AppState) -> Json<SessionStatus> {
    Json(SessionStatus::from(&state.session.state()))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<SessionStatus> {
    snapshot(&state)
}

/// Start the OAuth flow; the browser navigates to `authorizeUrl`.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let credential = Credential::from(req);
    let url = state.session.begin_oauth_login_with(&credential).await?;
    Ok(Json(LoginResponse {
        authorize_url: url.to_string(),
    }))
}

/// Redirect target of the authorization server.
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    match state.session.handle_callback(params).await {
        Ok(_) => Redirect::to("/").into_response(),
        Err(e) => {
            tracing::warn!("OAuth callback failed: {}", e);
            ApiError::from(e).into_response()
        }
    }
}

pub async fn set_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ManualTokenRequest>,
) -> Result<Json<SessionStatus>, ApiError> {
    state.session.set_manual_token(&req.token).await?;
    Ok(snapshot(&state))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialRequest>,
) -> Result<Json<SessionStatus>, ApiError> {
    state.session.refresh(&Credential::from(req)).await?;
    Ok(snapshot(&state))
}

pub async fn logout(State(state): State<Arc<AppState>>) -> Result<Json<SessionStatus>, ApiError> {
    state.session.logout().await?;
    Ok(snapshot(&state))
}
