//! Message HTTP handlers.
//!
//! Endpoints:
//! - GET    /messages              - List messages, optionally for one conversation
//! - POST   /messages              - Append a message and prune its conversation
//! - GET    /messages/{id}         - Get a single message
//! - POST   /messages/{id}/save    - Exempt a message from pruning
//! - POST   /messages/{id}/unsave  - Make a message prunable again
//! - DELETE /messages/{id}         - Delete a message

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use volpina_types::error::MessageError;
use volpina_types::message::{AppendMessageRequest, MessageId, MessageRecord};

use crate::http::error::AppError;
use crate::state::AppState;

/// Query parameters for message listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageListQuery {
    #[serde(default, alias = "conv_id")]
    pub conversation_id: Option<String>,
}

/// Parse a message id from a path parameter, returning a 400 error on invalid format.
fn parse_message_id(s: &str) -> Result<MessageId, AppError> {
    s.parse::<MessageId>()
        .map_err(|_| AppError::Validation(format!("Invalid message id: {s}")))
}

/// GET /messages - List messages by ascending id.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<Vec<MessageRecord>>, AppError> {
    let conversation_id = query.conversation_id.filter(|c| !c.trim().is_empty());
    let messages = state
        .message_service
        .list_messages(conversation_id.as_deref())
        .await?;
    Ok(Json(messages))
}

/// POST /messages - Append a message, then prune its conversation.
///
/// The cycle runs on its own task: once the insert has started, a client
/// disconnect no longer stops the prune that follows it.
pub async fn append_message(
    State(state): State<AppState>,
    payload: Result<Json<AppendMessageRequest>, JsonRejection>,
) -> Result<&'static str, AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;

    let service = Arc::clone(&state.message_service);
    let id = tokio::spawn(async move { service.append_and_prune(request).await })
        .await
        .map_err(|e| AppError::Internal(format!("append task failed: {e}")))??;

    tracing::debug!(message_id = %id, "Append request completed");
    Ok("OK")
}

/// GET /messages/{id} - Get a single message.
pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageRecord>, AppError> {
    let id = parse_message_id(&id)?;
    let message = state
        .message_service
        .get_message(id)
        .await?
        .ok_or(MessageError::NotFound(id))?;
    Ok(Json(message))
}

/// POST /messages/{id}/save - Mark a message as saved.
pub async fn save_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<&'static str, AppError> {
    let id = parse_message_id(&id)?;
    state.message_service.set_saved(id, true).await?;
    Ok("OK")
}

/// POST /messages/{id}/unsave - Clear the saved flag.
///
/// The message becomes prunable but is not pruned until the next append to
/// its conversation.
pub async fn unsave_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<&'static str, AppError> {
    let id = parse_message_id(&id)?;
    state.message_service.set_saved(id, false).await?;
    Ok("OK")
}

/// DELETE /messages/{id} - Delete a message. Missing ids are not an error.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<&'static str, AppError> {
    let id = parse_message_id(&id)?;
    state.message_service.delete_message(id).await?;
    Ok("OK")
}
