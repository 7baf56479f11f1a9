//! WebSocket Gateway Tests

use axum::http::StatusCode;
use axum_test::WsMessage;
use base64::{engine::general_purpose::STANDARD, Engine};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{expired_token, receive_frame, TestApp};

#[tokio::test]
async fn test_direct_message_round_trip_with_read_receipt() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();
    let mut alice_ws = app.connect(&alice).await;
    let mut bob_ws = app.connect(&bob).await;

    alice_ws
        .send_json(&json!({
            "type": "send_message",
            "data": {"receiver_id": bob.id, "content": "hi", "local_temp_id": "tmp-1"}
        }))
        .await;

    let echoed = receive_frame(&mut alice_ws, "new_message").await;
    assert_eq!(echoed["local_temp_id"], "tmp-1");
    assert_eq!(echoed["position"], 1);

    let delivered = receive_frame(&mut bob_ws, "new_message").await;
    assert_eq!(delivered["content"], "hi");
    assert_eq!(delivered["is_read"], false);
    assert_eq!(delivered["sender_details"]["id"], alice.id);
    assert_eq!(delivered["receiver_details"]["id"], bob.id);
    assert_eq!(delivered["files_data"], Value::Null);

    let room_id = delivered["room_id"].as_i64().unwrap();
    bob_ws
        .send_json(&json!({"type": "mark_read", "data": {"room_id": room_id, "position": 1}}))
        .await;

    let receipt = receive_frame(&mut alice_ws, "message_read").await;
    assert_eq!(receipt["room_id"], room_id);
    assert_eq!(receipt["user_id"], bob.id);
    assert_eq!(receipt["position"], 1);
}

#[tokio::test]
async fn test_omitted_temp_id_is_echoed_as_null() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();
    let mut alice_ws = app.connect(&alice).await;

    alice_ws
        .send_json(&json!({
            "type": "send_message",
            "data": {"receiver_id": bob.id, "content": "no temp id"}
        }))
        .await;

    let frame = receive_frame(&mut alice_ws, "new_message").await;
    assert!(frame.as_object().unwrap().contains_key("local_temp_id"));
    assert_eq!(frame["local_temp_id"], Value::Null);
}

#[tokio::test]
async fn test_two_attachments_make_one_message_in_order() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();
    let mut alice_ws = app.connect(&alice).await;

    let first = b"first image bytes".to_vec();
    let second = b"second, somewhat longer image bytes".to_vec();
    alice_ws
        .send_json(&json!({
            "type": "send_message",
            "data": {
                "receiver_id": bob.id,
                "message_type": "image",
                "files_data": [
                    {"file_data": STANDARD.encode(&first), "file_name": "a.png",
                     "file_size": first.len(), "mime_type": "image/png"},
                    {"file_data": STANDARD.encode(&second), "file_name": "b.png",
                     "file_size": second.len(), "mime_type": "image/png"}
                ]
            }
        }))
        .await;

    let frame = receive_frame(&mut alice_ws, "new_message").await;
    assert_eq!(frame["message_type"], "image");
    let files = frame["files_data"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["file_name"], "a.png");
    assert_eq!(files[1]["file_name"], "b.png");
    assert_eq!(files[1]["file_size"], second.len());
    assert!(files[0]["file_path"]
        .as_str()
        .unwrap()
        .starts_with("http://files.test/chat_files/image/"));
}

#[tokio::test]
async fn test_rejected_attachment_persists_nothing() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();
    let room_id = app.room_between(&alice, &bob).await;
    let mut alice_ws = app.connect(&alice).await;

    alice_ws
        .send_json(&json!({
            "type": "send_message",
            "data": {
                "room_id": room_id,
                "receiver_id": bob.id,
                "message_type": "file",
                "files_data": [
                    {"file_data": STANDARD.encode(b"MZ"), "file_name": "setup.exe",
                     "file_size": 2, "mime_type": "application/x-msdownload"}
                ]
            }
        }))
        .await;

    let error = receive_frame(&mut alice_ws, "error").await;
    assert!(error["message"].is_string());

    let page: Value = app
        .server
        .get(&format!("/api/v1/rooms/{}/messages", room_id))
        .authorization_bearer(&alice.token)
        .await
        .json();
    assert_eq!(page["messages"], json!([]));
}

#[tokio::test]
async fn test_outsiders_get_error_frames_not_broadcasts() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();
    let mallory = app.user();
    let room_id = app.room_between(&alice, &bob).await;
    let mut mallory_ws = app.connect(&mallory).await;

    mallory_ws
        .send_json(&json!({"type": "typing", "data": {"room_id": room_id, "is_typing": true}}))
        .await;
    let error = receive_frame(&mut mallory_ws, "error").await;
    assert_eq!(error["message"], "Not a member of this room");

    mallory_ws
        .send_json(&json!({"type": "join_room", "data": {"room_id": room_id}}))
        .await;
    let error = receive_frame(&mut mallory_ws, "error").await;
    assert_eq!(error["message"], "Not a member of this room");

    mallory_ws.send_text("{not json").await;
    receive_frame(&mut mallory_ws, "error").await;
}

#[tokio::test]
async fn test_typing_reaches_the_other_member() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();
    let room_id = app.room_between(&alice, &bob).await;

    let mut alice_ws = app
        .server
        .get_websocket("/ws")
        .add_query_param("token", &alice.token)
        .add_query_param("room_id", room_id)
        .await
        .into_websocket()
        .await;
    let joined = receive_frame(&mut alice_ws, "room_joined").await;
    assert_eq!(joined["room_id"], room_id);

    let mut bob_ws = app.connect(&bob).await;

    alice_ws
        .send_json(&json!({"type": "typing", "data": {"room_id": room_id, "is_typing": true}}))
        .await;

    let typing = receive_frame(&mut bob_ws, "typing").await;
    assert_eq!(typing["user_id"], alice.id);
    assert_eq!(typing["user_name"], alice.name.as_str());
    assert_eq!(typing["is_typing"], true);

    alice_ws.send_json(&json!({"type": "leave_room"})).await;
    let left = receive_frame(&mut alice_ws, "room_left").await;
    assert_eq!(left["room_id"], room_id);

    // Leaving clears the indicator for the other member
    let typing = receive_frame(&mut bob_ws, "typing").await;
    assert_eq!(typing["is_typing"], false);
}

async fn close_code_for(app: &TestApp, token: Option<String>) -> u16 {
    let mut request = app.server.get_websocket("/ws");
    if let Some(token) = token {
        request = request.add_query_param("token", token);
    }
    let mut ws = request.await.into_websocket().await;

    match ws.receive_message().await {
        WsMessage::Close(Some(frame)) => u16::from(frame.code),
        other => panic!("expected close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_bad_credentials_close_with_4001() {
    let app = TestApp::new();
    let alice = app.user();
    let dormant = app.inactive_user();

    assert_eq!(close_code_for(&app, None).await, 4001);
    assert_eq!(close_code_for(&app, Some("garbage".into())).await, 4001);
    assert_eq!(close_code_for(&app, Some(expired_token(alice.id))).await, 4001);
    assert_eq!(close_code_for(&app, Some(dormant.token.clone())).await, 4001);
}

#[tokio::test]
async fn test_websocket_requires_upgrade() {
    let app = TestApp::new();

    let response = app.server.get("/ws").expect_failure().await;

    assert!(response.status_code().is_client_error());
    assert_ne!(response.status_code(), StatusCode::NOT_FOUND);
}
