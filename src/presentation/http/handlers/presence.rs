//! Presence and Unread Handlers

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use validator::Validate;

use crate::application::dto::{
    OnlineUsersResponse, UnreadCountResponse, UserSearchQuery, UserSearchResponse,
};
use crate::application::services::PresenceStatus;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::validation::validation_error;
use crate::startup::AppState;

/// Unread messages per room for the caller
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<UnreadCountResponse>, AppError> {
    let counts = state.messages.unread_counts(auth.user_id).await?;
    Ok(Json(counts.into()))
}

pub async fn online_users(State(state): State<AppState>) -> Json<OnlineUsersResponse> {
    let users: Vec<i64> = state.presence.online_users().into_iter().collect();
    Json(OnlineUsersResponse {
        total: users.len(),
        users,
    })
}

pub async fn user_presence(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Json<PresenceStatus> {
    Json(state.presence.status_of(user_id).await)
}

/// Active users by email fragment, with their online status
pub async fn search_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<UserSearchQuery>,
) -> Result<Json<UserSearchResponse>, AppError> {
    query.validate().map_err(validation_error)?;

    let users = state
        .rooms
        .search_users(auth.user_id, &query.email, query.limit.unwrap_or(20))
        .await?;
    Ok(Json(UserSearchResponse {
        total: users.len(),
        users,
    }))
}
