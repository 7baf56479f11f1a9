//! Authentication Middleware
//!
//! Bearer token validation for protected routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::domain::UserProfile;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Authenticated user extension
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub profile: UserProfile,
}

/// Admit the request only for a valid token of a known, active user.
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer.as_ref().map(|TypedHeader(Authorization(b))| b.token());
    let profile = state.auth.authenticate(token).await?;

    request.extensions_mut().insert(AuthUser {
        user_id: profile.id,
        profile,
    });

    Ok(next.run(request).await)
}
