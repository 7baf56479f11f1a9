//! Common Test Utilities
//!
//! Shared helpers, fixtures, and test infrastructure.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum_test::{TestServer, TestWebSocket};
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;

use chat_engine::application::services::{Claims, SendRequest};
use chat_engine::config::Settings;
use chat_engine::domain::{MessageType, UserProfile};
use chat_engine::infrastructure::repositories::InMemoryChatStore;
use chat_engine::startup::{AppState, Application};

pub const JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";

static NEXT_USER_ID: AtomicI64 = AtomicI64::new(1000);

/// Test application on the in-memory store
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub store: Arc<InMemoryChatStore>,
    storage_root: PathBuf,
}

/// A seeded user with a valid access token
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: i64,
    pub name: String,
    pub token: String,
}

impl TestApp {
    pub fn new() -> Self {
        let storage_root =
            std::env::temp_dir().join(format!("chat-engine-it-{}", uuid::Uuid::new_v4()));

        let mut settings = Settings::with_defaults(JWT_SECRET).unwrap();
        settings.attachments.storage_root = storage_root.to_string_lossy().into_owned();
        settings.attachments.public_base_url = "http://files.test/chat_files".into();

        let store = Arc::new(InMemoryChatStore::new());
        let state = AppState::in_memory(settings, store.clone());
        let router = Application::router_for_state(state.clone());
        let server = TestServer::builder()
            .http_transport()
            .build(router)
            .unwrap();

        Self {
            server,
            state,
            store,
            storage_root,
        }
    }

    /// Seed an active user.
    pub fn user(&self) -> TestUser {
        self.seed(true)
    }

    /// Seed a deactivated user.
    pub fn inactive_user(&self) -> TestUser {
        self.seed(false)
    }

    fn seed(&self, is_active: bool) -> TestUser {
        let id = NEXT_USER_ID.fetch_add(1, Ordering::Relaxed);
        let name: String = Name().fake();
        self.store.insert_user(UserProfile {
            id,
            name: name.clone(),
            email: SafeEmail().fake(),
            avatar_url: None,
            is_active,
        });
        TestUser {
            id,
            name,
            token: access_token(id),
        }
    }

    /// Open the direct room between two users and return its ID.
    pub async fn room_between(&self, a: &TestUser, b: &TestUser) -> i64 {
        self.state.rooms.ensure_direct_room(a.id, b.id).await.unwrap().id
    }

    /// Append a text message from `sender` to `receiver`.
    pub async fn send_text(&self, sender: &TestUser, receiver: &TestUser, content: &str) -> Value {
        let message = self
            .state
            .messages
            .send(
                sender.id,
                SendRequest {
                    room_id: None,
                    receiver_id: receiver.id,
                    message_type: MessageType::Text,
                    content: Some(content.into()),
                    files: Vec::new(),
                },
            )
            .await
            .unwrap();
        serde_json::to_value(self.state.messages.view(message, None).await.unwrap()).unwrap()
    }

    /// Open a gateway connection and wait until it is registered.
    pub async fn connect(&self, user: &TestUser) -> TestWebSocket {
        let mut ws = self
            .server
            .get_websocket("/ws")
            .add_query_param("token", &user.token)
            .await
            .into_websocket()
            .await;

        ws.send_json(&serde_json::json!({"type": "ping"})).await;
        let pong: Value = ws.receive_json().await;
        assert_eq!(pong["type"], "pong");
        ws
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.storage_root);
    }
}

fn sign(claims: &Claims) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

/// A valid access token for `user_id`
pub fn access_token(user_id: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    sign(&Claims {
        sub: user_id.to_string(),
        exp: now + 3600,
        iat: Some(now),
        token_type: Some("access".into()),
    })
}

/// A token that expired an hour ago
pub fn expired_token(user_id: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    sign(&Claims {
        sub: user_id.to_string(),
        exp: now - 3600,
        iat: Some(now - 7200),
        token_type: Some("access".into()),
    })
}

/// A refresh token, which must not open a session
pub fn refresh_token(user_id: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    sign(&Claims {
        sub: user_id.to_string(),
        exp: now + 3600,
        iat: Some(now),
        token_type: Some("refresh".into()),
    })
}

/// Next frame of the given type, ignoring frames of other types.
pub async fn receive_frame(ws: &mut TestWebSocket, kind: &str) -> Value {
    loop {
        let frame: Value = ws.receive_json().await;
        if frame["type"] == kind {
            return frame["data"].clone();
        }
    }
}
