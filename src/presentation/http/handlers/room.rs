//! Room Handlers

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use super::announce;
use crate::application::dto::{
    CreateRoomRequest, MarkReadRequest, MessagePage, MessagesQuery, ReadCursor, RoomListResponse,
    RoomSummary,
};
use crate::presentation::middleware::AuthUser;
use crate::presentation::websocket::{Audience, ServerFrame};
use crate::shared::error::AppError;
use crate::shared::validation::validation_error;
use crate::startup::AppState;

/// Open the direct room with another user, or return the existing one
pub async fn create_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateRoomRequest>,
) -> Result<Json<RoomSummary>, AppError> {
    body.validate().map_err(validation_error)?;

    let room = state
        .broker
        .ensure_direct_room(auth.user_id, body.receiver_id)
        .await?;
    let summary = state.rooms.summarize(&room, auth.user_id).await?;
    Ok(Json(summary))
}

/// List the caller's active rooms
pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<RoomListResponse>, AppError> {
    let rooms = state.rooms.list_rooms(auth.user_id).await?;
    Ok(Json(RoomListResponse {
        total: rooms.len(),
        rooms,
    }))
}

pub async fn get_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_id): Path<i64>,
) -> Result<Json<RoomSummary>, AppError> {
    let summary = state.rooms.room_summary(room_id, auth.user_id).await?;
    Ok(Json(summary))
}

/// Deactivate a room
pub async fn delete_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.broker.deactivate_room(room_id, auth.user_id).await?;
    state.messages.forget_room(room_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Message history; the latest page unless `after` is given
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_id): Path<i64>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagePage>, AppError> {
    query.validate().map_err(validation_error)?;

    let page = match query.after {
        Some(after) => {
            state
                .messages
                .list_since(room_id, auth.user_id, after, query.limit)
                .await?
        }
        None => state.messages.latest(room_id, auth.user_id, query.limit).await?,
    };
    Ok(Json(page))
}

/// Acknowledge reading, to the latest message when no position is given
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_id): Path<i64>,
    body: Option<Json<MarkReadRequest>>,
) -> Result<Json<ReadCursor>, AppError> {
    let Json(body) = body.unwrap_or_default();
    body.validate().map_err(validation_error)?;

    let cursor = state
        .messages
        .mark_read(room_id, auth.user_id, body.position)
        .await?;
    announce(&state, room_id, ServerFrame::MessageRead(cursor), Audience::Everyone).await;
    Ok(Json(cursor))
}
