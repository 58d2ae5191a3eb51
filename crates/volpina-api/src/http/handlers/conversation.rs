//! Conversation-scoped HTTP handlers.

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use crate::http::error::AppError;
use crate::state::AppState;

/// Body of `GET /conversation-last-time/{id}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastActivityResponse {
    pub conversation_id: String,
    /// `null` when the conversation has no messages.
    pub last_time: Option<i64>,
}

/// DELETE /conversations/{id} - Delete every message in a conversation.
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<&'static str, AppError> {
    state
        .message_service
        .delete_conversation(&conversation_id)
        .await?;
    Ok("OK")
}

/// GET /conversation-last-time/{id} - Latest message timestamp in a conversation.
pub async fn last_activity(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<LastActivityResponse>, AppError> {
    let last_time = state.message_service.last_activity(&conversation_id).await?;
    Ok(Json(LastActivityResponse {
        conversation_id,
        last_time,
    }))
}
