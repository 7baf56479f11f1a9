//! Message Handlers

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use validator::Validate;

use super::announce;
use crate::application::dto::{EditMessageRequest, MessageView};
use crate::presentation::middleware::AuthUser;
use crate::presentation::websocket::{Audience, ServerFrame};
use crate::shared::error::AppError;
use crate::shared::validation::validation_error;
use crate::startup::AppState;

/// Replace the content of one of the caller's text messages
pub async fn edit_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(message_id): Path<i64>,
    Json(body): Json<EditMessageRequest>,
) -> Result<Json<MessageView>, AppError> {
    body.validate().map_err(validation_error)?;

    let message = state
        .messages
        .edit(message_id, auth.user_id, &body.content)
        .await?;
    let room_id = message.room_id;
    let view = state.messages.view(message, None).await?;

    announce(&state, room_id, ServerFrame::MessageUpdate(view.clone()), Audience::Everyone).await;
    Ok(Json(view))
}

/// Soft-delete one of the caller's messages
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(message_id): Path<i64>,
) -> Result<Json<MessageView>, AppError> {
    let message = state.messages.soft_delete(message_id, auth.user_id).await?;
    let room_id = message.room_id;
    let view = state.messages.view(message, None).await?;

    announce(&state, room_id, ServerFrame::MessageUpdate(view.clone()), Audience::Everyone).await;
    Ok(Json(view))
}
