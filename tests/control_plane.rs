// Integration tests for init/add/rm/status, exercised over the axum
// Router with in-memory Supervisor/Worker fakes (no real containers
// or network calls).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use galaxy_router::app_state::AppState;
use galaxy_router::config::Config;
use galaxy_router::server::build_router;
use galaxy_router::testing::{InMemorySupervisor, InMemoryWorkerClient};

fn app() -> axum::Router {
    let state = AppState::new(
        Config::from_env().unwrap(),
        Arc::new(InMemorySupervisor::new()),
        Arc::new(InMemoryWorkerClient::new()),
    );
    build_router(state)
}

async fn post(app: axum::Router, path: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

async fn get(app: axum::Router, path: &str) -> Value {
    let response = app
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn init_body() -> Value {
    json!({
        "N": 3,
        "schema": {"columns": ["Stud_id", "Stud_name", "Stud_marks"], "dtypes": ["Number", "String", "String"]},
        "shards": [{"Stud_id_low": 0, "Shard_id": "sh1", "Shard_size": 4096}],
        "servers": {"Server1": ["sh1"], "Server2": ["sh1"], "Server3": ["sh1"]}
    })
}

#[tokio::test]
async fn init_then_status_round_trips() {
    let app = app();
    let (status, body) = post(app.clone(), "/init", init_body()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let status_view = get(app, "/status").await;
    assert_eq!(status_view["N"], 3);
    assert_eq!(status_view["servers"]["Server1"], json!(["sh1"]));
    assert_eq!(status_view["servers"]["Server2"], json!(["sh1"]));
    assert_eq!(status_view["servers"]["Server3"], json!(["sh1"]));
}

#[tokio::test]
async fn add_rejects_when_server_count_short_of_n() {
    let app = app();
    post(app.clone(), "/init", init_body()).await;

    let (status, body) = post(
        app,
        "/add",
        json!({"n": 3, "new_shards": [], "servers": {"S1": [], "S2": []}}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "<Error> Number of new servers (n) is greater than newly added instances"
    );
    assert_eq!(body["status"], "failure");
}

#[tokio::test]
async fn add_joins_multiple_server_names_with_oxford_and() {
    let app = app();
    post(app.clone(), "/init", init_body()).await;

    let (status, body) = post(
        app,
        "/add",
        json!({
            "n": 2,
            "new_shards": [{"Stud_id_low": 4096, "Shard_id": "sh2", "Shard_size": 4096}],
            "servers": {"Server4": ["sh2"], "Server5": ["sh2"]}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "successful");
    assert_eq!(body["N"], 5);
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("Add Server:"));
    assert!(message.contains(" and "));
    assert!(!message.contains(", and"));
}

#[tokio::test]
async fn rm_rejects_when_server_list_exceeds_n() {
    let app = app();
    post(app.clone(), "/init", init_body()).await;

    let (status, body) = post(app, "/rm", json!({"n": 1, "servers": ["Server1", "Server2"]})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "<Error> Length of server list is more than removable instances"
    );
}

#[tokio::test]
async fn rm_with_random_fill_reports_requested_count_and_named_server() {
    let app = app();
    post(app.clone(), "/init", init_body()).await;

    let (status, body) = post(app, "/rm", json!({"n": 2, "servers": ["Server1"]})).await;

    assert_eq!(status, StatusCode::OK);
    let removed = body["message"]["servers"].as_array().unwrap();
    assert_eq!(removed.len(), 2);
    assert!(removed.iter().any(|v| v == "Server1"));
    assert_eq!(body["message"]["N"], 1);
}
