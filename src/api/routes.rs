//! Router, shared state and server entry point.

use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent::ExecutionClient;
use crate::config::{Config, OAUTH_CALLBACK_PATH};
use crate::session::SessionManager;

use super::auth;
use super::chat;
use super::types::HealthResponse;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Desktop Central session (tokens, OAuth flow)
    pub session: Arc<SessionManager>,
    /// Licensing agent client
    pub agent: Arc<ExecutionClient>,
}

impl AppState {
    pub fn new(config: Config, session: Arc<SessionManager>, agent: Arc<ExecutionClient>) -> Self {
        Self {
            config,
            session,
            agent,
        }
    }
}

/// All routes over `state`, with CORS and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/status", get(auth::status))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/token", post(auth::set_token))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/logout", post(auth::logout))
        .route(OAUTH_CALLBACK_PATH, get(auth::oauth_callback))
        .route("/api/chat", post(chat::chat))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let session = Arc::new(SessionManager::from_config(&config));
    let restored = session.restore().await;
    tracing::info!(
        "Session restored: authenticated={}",
        restored.is_authenticated
    );

    if !agent_configured(&config) {
        tracing::warn!(
            "Agent platform credentials are incomplete; set AGENT_ACCOUNT_ID, AGENT_ID and AGENT_BEARER_TOKEN"
        );
    }
    let agent = Arc::new(ExecutionClient::from_config(&config.agent));

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config, session, agent));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

fn agent_configured(config: &Config) -> bool {
    config.agent.service_token.is_some()
        && config.agent.account_id.is_some()
        && config.agent.agent_id.is_some()
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        authenticated: state.session.get_current_token().await.is_some(),
        agent_configured: agent_configured(&state.config),
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_session_and_agent_configuration() {
        let h = testing::harness("hi");
        let Json(before) = health(State(h.state.clone())).await;
        assert_eq!(before.status, "ok");
        assert!(!before.authenticated);
        assert!(!before.agent_configured);

        h.state.session.set_manual_token("dc-token").await.unwrap();
        let Json(after) = health(State(h.state.clone())).await;
        assert!(after.authenticated);
    }

    #[test]
    fn router_builds() {
        let h = testing::harness("hi");
        let _app: Router = router(h.state);
    }
}
