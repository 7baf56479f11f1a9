//! Room API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use chat_engine::domain::UserDirectory;

use crate::common::{expired_token, refresh_token, TestApp};

#[tokio::test]
async fn test_create_room_is_idempotent_for_either_member() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();

    let first: Value = app
        .server
        .post("/api/v1/rooms")
        .authorization_bearer(&alice.token)
        .json(&json!({"receiver_id": bob.id}))
        .await
        .json();
    let second: Value = app
        .server
        .post("/api/v1/rooms")
        .authorization_bearer(&bob.token)
        .json(&json!({"receiver_id": alice.id}))
        .await
        .json();

    assert_eq!(first["id"], second["id"]);
    assert_eq!(first["room_type"], "direct");
    assert_eq!(first["other_user"]["id"], bob.id);
    assert_eq!(second["other_user"]["name"], alice.name.as_str());
    assert_eq!(first["unread_count"], 0);
}

#[tokio::test]
async fn test_create_room_rejections() {
    let app = TestApp::new();
    let alice = app.user();
    let dormant = app.inactive_user();

    app.server
        .post("/api/v1/rooms")
        .authorization_bearer(&alice.token)
        .json(&json!({"receiver_id": alice.id}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    app.server
        .post("/api/v1/rooms")
        .authorization_bearer(&alice.token)
        .json(&json!({"receiver_id": 987654321}))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    app.server
        .post("/api/v1/rooms")
        .authorization_bearer(&alice.token)
        .json(&json!({"receiver_id": dormant.id}))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_requests_without_valid_identity_are_unauthorized() {
    let app = TestApp::new();
    let alice = app.user();
    let dormant = app.inactive_user();

    app.server
        .get("/api/v1/rooms")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    for token in [
        expired_token(alice.id),
        refresh_token(alice.id),
        dormant.token.clone(),
        "not-a-jwt".to_string(),
    ] {
        app.server
            .get("/api/v1/rooms")
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_list_rooms_with_last_message_and_unread_count() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();
    let carol = app.user();

    app.send_text(&alice, &bob, "hi bob").await;
    app.send_text(&alice, &bob, "are you there?").await;
    app.room_between(&bob, &carol).await;

    let list: Value = app
        .server
        .get("/api/v1/rooms")
        .authorization_bearer(&bob.token)
        .await
        .json();

    assert_eq!(list["total"], 2);
    let with_alice = list["rooms"]
        .as_array()
        .unwrap()
        .iter()
        .find(|room| room["other_user"]["id"] == alice.id)
        .unwrap();
    assert_eq!(with_alice["unread_count"], 2);
    assert_eq!(with_alice["last_message"]["content"], "are you there?");
    assert_eq!(with_alice["last_message"]["position"], 2);
    assert_eq!(with_alice["last_message"]["sender_name"], alice.name.as_str());
}

#[tokio::test]
async fn test_room_access_is_member_only() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();
    let mallory = app.user();
    let room_id = app.room_between(&alice, &bob).await;

    app.server
        .get(&format!("/api/v1/rooms/{}", room_id))
        .authorization_bearer(&bob.token)
        .await
        .assert_status_ok();

    app.server
        .get(&format!("/api/v1/rooms/{}", room_id))
        .authorization_bearer(&mallory.token)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .get(&format!("/api/v1/rooms/{}/messages", room_id))
        .authorization_bearer(&mallory.token)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .get("/api/v1/rooms/123456789")
        .authorization_bearer(&alice.token)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deleted_room_is_gone_and_a_new_one_can_be_opened() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();
    let room_id = app.room_between(&alice, &bob).await;

    app.server
        .delete(&format!("/api/v1/rooms/{}", room_id))
        .authorization_bearer(&alice.token)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    app.server
        .get(&format!("/api/v1/rooms/{}", room_id))
        .authorization_bearer(&bob.token)
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let fresh: Value = app
        .server
        .post("/api/v1/rooms")
        .authorization_bearer(&bob.token)
        .json(&json!({"receiver_id": alice.id}))
        .await
        .json();
    assert_ne!(fresh["id"], room_id);
}

#[tokio::test]
async fn test_search_users_by_email_with_online_status() {
    let app = TestApp::new();
    let alice = app.user();
    let bob = app.user();
    let dormant = app.inactive_user();
    let _bob_ws = app.connect(&bob).await;

    let bob_email = app.store.find_by_id(bob.id).await.unwrap().unwrap().email;
    let response = app
        .server
        .get("/api/v1/search-users")
        .add_query_param("email", &bob_email)
        .authorization_bearer(&alice.token)
        .await;
    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["total"], 1);
    assert_eq!(json["users"][0]["id"], bob.id);
    assert_eq!(json["users"][0]["is_online"], true);

    let dormant_email = app.store.find_by_id(dormant.id).await.unwrap().unwrap().email;
    let json: Value = app
        .server
        .get("/api/v1/search-users")
        .add_query_param("email", &dormant_email)
        .authorization_bearer(&alice.token)
        .await
        .json();
    assert_eq!(json["total"], 0);

    app.server
        .get("/api/v1/search-users")
        .add_query_param("email", "")
        .authorization_bearer(&alice.token)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}
