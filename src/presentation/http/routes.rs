//! Route Configuration
//!
//! Configures all HTTP routes for the API.

use axum::{
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use tower_http::services::ServeDir;

use super::handlers;
use crate::infrastructure::metrics;
use crate::presentation::middleware::{auth_middleware, track_metrics};
use crate::presentation::websocket::ws_handler;
use crate::startup::AppState;

/// Path under which stored attachments are served
pub const ATTACHMENTS_PATH: &str = "/chat_files";

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let attachments = ServeDir::new(&state.settings.attachments.storage_root);

    Router::new()
        .nest("/api/v1", api_routes(state.clone()))
        // WebSocket gateway; authenticates from the query string
        .route("/ws", get(ws_handler))
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn(track_metrics))
        .nest_service(ATTACHMENTS_PATH, attachments)
        .with_state(state)
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

/// API v1 routes, all behind bearer authentication
fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/rooms",
            post(handlers::room::create_room).get(handlers::room::list_rooms),
        )
        .route(
            "/rooms/{room_id}",
            get(handlers::room::get_room).delete(handlers::room::delete_room),
        )
        .route("/rooms/{room_id}/messages", get(handlers::room::get_messages))
        .route("/rooms/{room_id}/read", post(handlers::room::mark_read))
        .route(
            "/messages/{message_id}",
            put(handlers::message::edit_message).delete(handlers::message::delete_message),
        )
        .route("/unread-count", get(handlers::presence::unread_count))
        .route("/search-users", get(handlers::presence::search_users))
        .route("/online-users", get(handlers::presence::online_users))
        .route(
            "/users/{user_id}/presence",
            get(handlers::presence::user_presence),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::config::Settings;
    use crate::infrastructure::repositories::InMemoryChatStore;

    fn router() -> Router {
        let settings = Settings::with_defaults("routes-test-secret-0123456789abcdef").unwrap();
        create_router(AppState::in_memory(settings, Arc::new(InMemoryChatStore::new())))
    }

    async fn status_of(uri: &str) -> StatusCode {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        router().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_api_requires_bearer() {
        assert_eq!(status_of("/api/v1/rooms").await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_of("/api/v1/online-users").await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_health_endpoints_are_public() {
        assert_eq!(status_of("/health/live").await, StatusCode::OK);
        assert_eq!(status_of("/metrics").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        assert_eq!(status_of("/api/v2/rooms").await, StatusCode::NOT_FOUND);
    }
}
