//! HTTP Handlers
//!
//! Request handlers for all HTTP endpoints.

pub mod health;
pub mod message;
pub mod presence;
pub mod room;

use crate::presentation::websocket::{Audience, ServerFrame};
use crate::startup::AppState;

/// Push a change made over HTTP to live connections. The change is already
/// durable, so a failed fan-out is logged and not reported to the caller.
pub(crate) async fn announce(state: &AppState, room_id: i64, frame: ServerFrame, audience: Audience) {
    match state.broker.broadcast(room_id, &frame, audience).await {
        Ok(delivered) => tracing::debug!(room_id, delivered, "Broadcast from HTTP"),
        Err(e) => tracing::warn!(room_id, error = %e, "Broadcast from HTTP failed"),
    }
}
