//! Request DTOs
//!
//! Data structures for API request bodies and query strings.

use serde::Deserialize;
use validator::Validate;

/// Open (or fetch) the direct room with another user
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoomRequest {
    #[validate(range(min = 1, message = "Invalid receiver"))]
    pub receiver_id: i64,
}

/// Message history query
#[derive(Debug, Default, Deserialize, Validate)]
pub struct MessagesQuery {
    /// Return messages strictly after this position; latest page when absent
    #[validate(range(min = 0, message = "Position must not be negative"))]
    pub after: Option<i64>,

    /// Clamped to 1..=100
    pub limit: Option<i64>,
}

/// Read acknowledgement
#[derive(Debug, Default, Deserialize, Validate)]
pub struct MarkReadRequest {
    /// Read up to this position; the latest message when absent
    #[validate(range(min = 0, message = "Position must not be negative"))]
    pub position: Option<i64>,
}

/// Find users to start a conversation with
#[derive(Debug, Deserialize, Validate)]
pub struct UserSearchQuery {
    #[validate(length(min = 1, max = 254, message = "Email query must be 1-254 characters"))]
    pub email: String,

    #[validate(range(min = 1, max = 50, message = "Limit must be between 1 and 50"))]
    pub limit: Option<i64>,
}

/// Edit a text message
#[derive(Debug, Deserialize, Validate)]
pub struct EditMessageRequest {
    #[validate(length(min = 1, max = 5000, message = "Content must be 1-5000 characters"))]
    pub content: String,
}
