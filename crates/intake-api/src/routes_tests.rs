//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use intake_core::Database;
use intake_core::config::WorkflowConfig;
use intake_runtime::llm::PlaceholderGenerator;
use serde_json::{Value, json};
use tower::ServiceExt;

use super::*;

fn temp_db_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("intake-api-test-{}.db", Uuid::new_v4()))
}

async fn test_state() -> AppState {
    let db = Database::open(&temp_db_path()).await.expect("open db");
    AppState {
        ctx: WorkflowContext::new(
            Arc::new(db),
            Arc::new(PlaceholderGenerator),
            WorkflowConfig::default(),
        ),
    }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

async fn create_conversation(app: &Router) -> String {
    let (_, user) = send(
        app,
        Method::POST,
        "/users",
        Some(json!({"username": "vic", "email": "vic@example.com"})),
    )
    .await;
    let (status, conv) = send(
        app,
        Method::POST,
        "/conversations",
        Some(json!({"user_id": user["id"]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    conv["id"].as_str().expect("id").to_string()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = router(test_state().await);
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_conversation_is_404() {
    let app = router(test_state().await);
    let uri = format!("/conversations/{}", Uuid::new_v4());
    let (status, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some_and(|e| e.contains("conversation")));
}

#[tokio::test]
async fn message_with_reply_returns_both_turns() {
    let app = router(test_state().await);
    let id = create_conversation(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/conversations/{id}/messages"),
        Some(json!({"content": "Track guitar inventory"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"]["content"], "Track guitar inventory");
    assert!(body["reply"]["content"].as_str().is_some());

    let (_, full) = send(&app, Method::GET, &format!("/conversations/{id}"), None).await;
    assert_eq!(full["messages"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let app = router(test_state().await);
    let id = create_conversation(&app).await;
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/conversations/{id}/messages"),
        Some(json!({"content": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn repeat_sign_off_conflicts_unless_forced() {
    let app = router(test_state().await);
    let id = create_conversation(&app).await;
    let uri = format!("/conversations/{id}/sign-off");

    let (status, body) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["signed_off_at"].is_string());

    let (status, _) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, Method::POST, &format!("{uri}?force=true"), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn status_update_and_promotion_errors() {
    let app = router(test_state().await);
    let id = create_conversation(&app).await;

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/conversations/{id}/status"),
        Some(json!({"status": "approved"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");

    let (status, app_body) = send(
        &app,
        Method::POST,
        "/applications",
        Some(json!({"category": "internal", "name": "Ledger"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let app_id = app_body["id"].as_str().expect("id");
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/applications/{app_id}/promote"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn patch_application_updates_fields() {
    let app = router(test_state().await);
    let (_, created) = send(
        &app,
        Method::POST,
        "/applications",
        Some(json!({"category": "external", "name": "Portal"})),
    )
    .await;
    let id = created["id"].as_str().expect("id");

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/applications/{id}"),
        Some(json!({"url": "https://portal.example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "https://portal.example.com");
    assert_eq!(body["name"], "Portal");
}

#[tokio::test]
async fn notifications_for_unknown_user_is_404() {
    let app = router(test_state().await);
    let uri = format!("/users/{}/notifications", Uuid::new_v4());
    let (status, _) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
