//! Message API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::TestApp;

fn positions(page: &Value) -> Vec<i64> {
    page["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["position"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_history_pages_forward_by_position() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();
    for i in 1..=5 {
        app.send_text(&alice, &bob, &format!("message {}", i)).await;
    }
    let room_id = app.room_between(&alice, &bob).await;
    let uri = format!("/api/v1/rooms/{}/messages", room_id);

    let first: Value = app
        .server
        .get(&uri)
        .authorization_bearer(&bob.token)
        .add_query_param("after", 0)
        .add_query_param("limit", 2)
        .await
        .json();
    assert_eq!(positions(&first), vec![1, 2]);
    assert_eq!(first["has_more"], true);
    assert_eq!(first["next_after"], 2);

    let rest: Value = app
        .server
        .get(&uri)
        .authorization_bearer(&bob.token)
        .add_query_param("after", 2)
        .add_query_param("limit", 10)
        .await
        .json();
    assert_eq!(positions(&rest), vec![3, 4, 5]);
    assert_eq!(rest["has_more"], false);
    assert_eq!(rest["messages"][0]["sender_details"]["id"], alice.id);
    assert_eq!(rest["messages"][0]["local_temp_id"], Value::Null);
}

#[tokio::test]
async fn test_latest_page_is_ascending() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();
    for i in 1..=4 {
        app.send_text(&alice, &bob, &format!("message {}", i)).await;
    }
    let room_id = app.room_between(&alice, &bob).await;

    let page: Value = app
        .server
        .get(&format!("/api/v1/rooms/{}/messages", room_id))
        .authorization_bearer(&alice.token)
        .add_query_param("limit", 3)
        .await
        .json();

    assert_eq!(positions(&page), vec![2, 3, 4]);
}

#[tokio::test]
async fn test_negative_cursor_is_rejected() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();
    let room_id = app.room_between(&alice, &bob).await;

    app.server
        .get(&format!("/api/v1/rooms/{}/messages", room_id))
        .authorization_bearer(&alice.token)
        .add_query_param("after", -1)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mark_read_moves_forward_only() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();
    for i in 1..=3 {
        app.send_text(&alice, &bob, &format!("message {}", i)).await;
    }
    let room_id = app.room_between(&alice, &bob).await;
    let uri = format!("/api/v1/rooms/{}/read", room_id);

    let unread: Value = app
        .server
        .get("/api/v1/unread-count")
        .authorization_bearer(&bob.token)
        .await
        .json();
    assert_eq!(unread["total"], 3);

    let cursor: Value = app
        .server
        .post(&uri)
        .authorization_bearer(&bob.token)
        .json(&json!({"position": 2}))
        .await
        .json();
    assert_eq!(cursor["position"], 2);
    assert_eq!(cursor["user_id"], bob.id);

    let cursor: Value = app
        .server
        .post(&uri)
        .authorization_bearer(&bob.token)
        .json(&json!({"position": 1}))
        .await
        .json();
    assert_eq!(cursor["position"], 2);

    let unread: Value = app
        .server
        .get("/api/v1/unread-count")
        .authorization_bearer(&bob.token)
        .await
        .json();
    assert_eq!(unread["total"], 1);

    // No position reads to the latest message
    let cursor: Value = app
        .server
        .post(&uri)
        .authorization_bearer(&bob.token)
        .await
        .json();
    assert_eq!(cursor["position"], 3);

    let unread: Value = app
        .server
        .get("/api/v1/unread-count")
        .authorization_bearer(&bob.token)
        .await
        .json();
    assert_eq!(unread["total"], 0);
    assert_eq!(unread["rooms"], json!({}));
}

#[tokio::test]
async fn test_edit_is_author_only_and_marks_edited() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();
    let message = app.send_text(&alice, &bob, "helo").await;
    let uri = format!("/api/v1/messages/{}", message["id"]);

    app.server
        .put(&uri)
        .authorization_bearer(&bob.token)
        .json(&json!({"content": "hijacked"}))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .put(&uri)
        .authorization_bearer(&alice.token)
        .json(&json!({"content": ""}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let edited: Value = app
        .server
        .put(&uri)
        .authorization_bearer(&alice.token)
        .json(&json!({"content": "hello"}))
        .await
        .json();
    assert_eq!(edited["content"], "hello");
    assert_eq!(edited["is_edited"], true);
    assert_eq!(edited["created_at"], message["created_at"]);
    assert_eq!(edited["position"], message["position"]);
}

#[tokio::test]
async fn test_deleted_message_keeps_its_slot_without_content() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();
    let doomed = app.send_text(&alice, &bob, "oops").await;
    app.send_text(&alice, &bob, "after").await;
    let room_id = app.room_between(&alice, &bob).await;

    let deleted: Value = app
        .server
        .delete(&format!("/api/v1/messages/{}", doomed["id"]))
        .authorization_bearer(&alice.token)
        .await
        .json();
    assert_eq!(deleted["is_deleted"], true);
    assert_eq!(deleted["content"], Value::Null);

    let page: Value = app
        .server
        .get(&format!("/api/v1/rooms/{}/messages", room_id))
        .authorization_bearer(&bob.token)
        .add_query_param("after", 0)
        .await
        .json();
    assert_eq!(positions(&page), vec![1, 2]);
    assert_eq!(page["messages"][0]["is_deleted"], true);
    assert_eq!(page["messages"][0]["content"], Value::Null);
    assert_eq!(page["messages"][1]["content"], "after");
}

#[tokio::test]
async fn test_presence_lookups() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();

    let status: Value = app
        .server
        .get(&format!("/api/v1/users/{}/presence", bob.id))
        .authorization_bearer(&alice.token)
        .await
        .json();
    assert_eq!(status["is_online"], false);
    assert_eq!(status["last_seen"], Value::Null);

    let _ws = app.connect(&bob).await;

    let online: Value = app
        .server
        .get("/api/v1/online-users")
        .authorization_bearer(&alice.token)
        .await
        .json();
    assert!(online["users"].as_array().unwrap().contains(&json!(bob.id)));

    let status: Value = app
        .server
        .get(&format!("/api/v1/users/{}/presence", bob.id))
        .authorization_bearer(&alice.token)
        .await
        .json();
    assert_eq!(status["is_online"], true);
    assert!(status["last_seen"].is_string());
}
