//! HTTP surface tests against a single in-memory instance.

mod common;

use axum::http::StatusCode;
use common::{shared_backend, Instance};
use serde_json::json;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn create_returns_task_and_notifies_connections() {
    let (store, bus) = shared_backend();
    let node = Instance::new(store, bus);
    node.start_relay().await;
    let mut client = node.connect();

    let (status, task) = node
        .send("POST", "/tasks", Some(json!({"taskTitle": "buy milk", "completed": false})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(task["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(task["taskTitle"], "buy milk");
    assert_eq!(task["completed"], false);
    assert_eq!(task["created_at"], task["updated_at"]);

    let event = client.next_event().await;
    assert_eq!(event["action"], "create");
    assert_eq!(event["task"], task);
    assert_eq!(event["origin"], node.state.origin());
    assert_eq!(event["seq"], 1);
    client.assert_quiet().await;
}

#[tokio::test]
async fn update_completed_is_visible_and_announced_once() {
    let (store, bus) = shared_backend();
    let node = Instance::new(store, bus);
    node.start_relay().await;

    let (_, task) = node
        .send("POST", "/tasks", Some(json!({"taskTitle": "buy milk", "completed": false})))
        .await;
    let id = task["id"].as_str().unwrap().to_string();
    let mut client = node.connect();

    let (status, updated) = node
        .send("PUT", &format!("/tasks/{id}"), Some(json!({"completed": true})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["completed"], true);
    assert_eq!(updated["taskTitle"], "buy milk");
    assert_eq!(updated["created_at"], task["created_at"]);

    let (status, fetched) = node.send("GET", &format!("/tasks/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["completed"], true);

    let event = client.next_event().await;
    assert_eq!(event["action"], "update");
    assert_eq!(event["task"]["completed"], true);
    client.assert_quiet().await;
    assert_eq!(
        node.state.stats.relay_skipped_local.load(Ordering::Relaxed),
        2
    );
}

#[tokio::test]
async fn string_completed_is_answered_as_bool() {
    let (store, bus) = shared_backend();
    let node = Instance::new(store, bus);

    let (status, task) = node
        .send("POST", "/tasks", Some(json!({"taskTitle": "x", "completed": "true"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["completed"], true);

    let id = task["id"].as_str().unwrap();
    let (_, updated) = node
        .send("PUT", &format!("/tasks/{id}"), Some(json!({"completed": "false"})))
        .await;
    assert_eq!(updated["completed"], false);
    let (_, fetched) = node.send("GET", &format!("/tasks/{id}"), None).await;
    assert_eq!(fetched["completed"], false);
}

#[tokio::test]
async fn delete_missing_is_not_found_and_silent() {
    let (store, bus) = shared_backend();
    let node = Instance::new(store, bus);
    node.start_relay().await;
    let mut client = node.connect();

    let (status, _) = node.send("DELETE", "/tasks/does-not-exist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    client.assert_quiet().await;
    assert_eq!(node.state.stats.published.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn delete_returns_task_then_get_is_not_found() {
    let (store, bus) = shared_backend();
    let node = Instance::new(store, bus);
    let (_, task) = node
        .send("POST", "/tasks", Some(json!({"taskTitle": "gone soon"})))
        .await;
    let id = task["id"].as_str().unwrap().to_string();
    let mut client = node.connect();

    let (status, deleted) = node.send("DELETE", &format!("/tasks/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["id"], task["id"]);

    let event = client.next_event().await;
    assert_eq!(event["action"], "delete");
    assert_eq!(event["task"]["id"], task["id"]);

    let (status, _) = node.send("GET", &format!("/tasks/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, listed) = node.send("GET", "/tasks", None).await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn list_returns_tasks_in_creation_order() {
    let (store, bus) = shared_backend();
    let node = Instance::new(store, bus);
    for title in ["first", "second", "third", "fourth", "fifth"] {
        node.send("POST", "/tasks", Some(json!({"taskTitle": title})))
            .await;
    }
    let (status, listed) = node.send("GET", "/tasks", None).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["taskTitle"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["first", "second", "third", "fourth", "fifth"]);
}

#[tokio::test]
async fn invalid_requests_are_rejected_without_events() {
    let (store, bus) = shared_backend();
    let node = Instance::new(store, bus);
    let mut client = node.connect();

    let (status, _) = node
        .send("POST", "/tasks", Some(json!({"taskTitle": "   "})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = node
        .send("POST", "/tasks", Some(json!({"completed": true})))
        .await;
    assert!(status.is_client_error());

    let (status, _) = node
        .send("PUT", "/tasks/missing", Some(json!({"completed": true})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    client.assert_quiet().await;
}

#[tokio::test]
async fn publish_failure_does_not_fail_mutation() {
    let (store, bus) = shared_backend();
    let node = Instance::new(store, bus.clone());
    let mut client = node.connect();
    bus.reject_publishes(true);

    let (status, _) = node
        .send("POST", "/tasks", Some(json!({"taskTitle": "still saved"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(client.next_event().await["action"], "create");
    assert_eq!(node.state.stats.publish_failures.load(Ordering::Relaxed), 1);

    let (_, listed) = node.send("GET", "/tasks", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn health_reports_relay_failure() {
    let (store, bus) = shared_backend();
    let node = Instance::new(store, bus.clone());

    let (status, report) = node.send("GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "ok");
    assert_eq!(report["relay"], "not_started");

    node.start_relay().await;
    let (_, report) = node.send("GET", "/health", None).await;
    assert_eq!(report["relay"], "listening");

    bus.sever();
    let mut status = StatusCode::OK;
    for _ in 0..100 {
        status = node.send("GET", "/health", None).await.0;
        if status == StatusCode::SERVICE_UNAVAILABLE {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let (_, report) = node.send("GET", "/health", None).await;
    assert_eq!(report["status"], "degraded");
    assert_eq!(report["stats"]["relay_failures"], 1);
}

#[tokio::test]
async fn hello_endpoint() {
    let (store, bus) = shared_backend();
    let node = Instance::new(store, bus);
    let (status, body) = node.send("GET", "/api/hello", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
}
