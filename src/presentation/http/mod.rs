//! HTTP API
//!
//! Request/response endpoints over the same identity and services as the
//! WebSocket gateway.

pub mod handlers;
pub mod routes;

pub use routes::create_router;
