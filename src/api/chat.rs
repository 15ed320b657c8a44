//! Prompt endpoint.

use std::sync::Arc;

use axum::{extract::State, Json};

use super::routes::AppState;
use super::types::{ApiError, ChatRequest, ChatResponse};
use crate::agent::AgentAnswer;

/// Run one prompt through the licensing agent with the user's token.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let token = state
        .session
        .get_current_token()
        .await
        .ok_or_else(ApiError::not_authenticated)?;

    let raw = state.agent.run(&req.prompt, &token).await?;
    let answer = AgentAnswer::from_answer(&raw);
    tracing::info!(structured = answer.is_structured(), "Agent answered");

    Ok(Json(ChatResponse { answer, raw }))
}
