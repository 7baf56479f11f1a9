//! WebSocket Frame Types
//!
//! Frames are JSON objects tagged by `type` with their payload under `data`.

use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::dto::{MessageView, ReadCursor};
use crate::application::services::{FilePayload, PresenceStatus, SendRequest};
use crate::domain::MessageType;
use crate::shared::error::AppError;

/// Frames a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    SendMessage(SendMessageData),
    Typing { room_id: i64, is_typing: bool },
    JoinRoom { room_id: i64 },
    LeaveRoom {},
    MarkRead {
        room_id: i64,
        #[serde(default)]
        position: Option<i64>,
    },
    EditMessage { message_id: i64, content: String },
    DeleteMessage { message_id: i64 },
    Ping {},
}

impl ClientFrame {
    /// Decode a text frame. A missing or null `data` is read as `{}`.
    pub fn parse(text: &str) -> Result<Self, AppError> {
        let mut value: Value = serde_json::from_str(text)
            .map_err(|e| AppError::Validation(format!("Invalid JSON: {}", e)))?;

        if let Some(object) = value.as_object_mut() {
            match object.get("data") {
                None | Some(Value::Null) => {
                    object.insert("data".into(), Value::Object(Default::default()));
                }
                _ => {}
            }
        }

        serde_json::from_value(value)
            .map_err(|e| AppError::Validation(format!("Invalid frame: {}", e)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageData {
    #[serde(default)]
    pub room_id: Option<i64>,
    pub receiver_id: i64,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub local_temp_id: Option<Value>,
    #[serde(default)]
    pub files_data: Option<Vec<FilePayload>>,
}

impl SendMessageData {
    /// Split into the store request and the correlation token to echo.
    pub fn into_request(self) -> (SendRequest, Option<Value>) {
        let local_temp_id = self.local_temp_id.filter(|v| !v.is_null());
        (
            SendRequest {
                room_id: self.room_id,
                receiver_id: self.receiver_id,
                message_type: self.message_type,
                content: self.content,
                files: self.files_data.unwrap_or_default(),
            },
            local_temp_id,
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TypingEvent {
    pub room_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub is_typing: bool,
}

/// Frames the server sends.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    NewMessage(MessageView),
    MessageUpdate(MessageView),
    Typing(TypingEvent),
    Presence(PresenceStatus),
    MessageRead(ReadCursor),
    RoomJoined { room_id: i64 },
    RoomLeft { room_id: i64 },
    Pong {},
    Error { message: String },
}

impl ServerFrame {
    pub fn error(err: &AppError) -> Self {
        Self::Error {
            message: err.client_message(),
        }
    }

    /// Serialize once for delivery to any number of connections.
    pub fn encode(&self) -> Result<Utf8Bytes, AppError> {
        serde_json::to_string(self)
            .map(Utf8Bytes::from)
            .map_err(|e| AppError::Internal(format!("Failed to encode frame: {}", e)))
    }
}

/// Items on a connection's outbound queue.
#[derive(Debug, Clone)]
pub enum Outbound {
    Frame(Utf8Bytes),
    /// Send a close frame and stop writing
    Close { code: u16, reason: String },
}
