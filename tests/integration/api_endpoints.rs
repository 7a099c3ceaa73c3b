//! API endpoint integration tests
//!
//! Spawns the real router on an ephemeral port and drives it over HTTP.

use std::net::SocketAddr;
use std::time::Duration;

use modemwatch::{
    MonitoringMethod,
    api::{ApiConfig, ApiState, spawn_api_server},
};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::helpers::*;

async fn spawn(h: &Harness) -> SocketAddr {
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        enable_cors: true,
    };
    spawn_api_server(config, ApiState::new(h.service.clone()))
        .await
        .unwrap()
}

fn body() -> Value {
    json!({
        "host": "8.8.8.8",
        "method": "icmp",
        "max_failures": 3,
        "checking_interval": 60,
        "airplane_mode_delay": 2
    })
}

#[tokio::test]
async fn test_health_ping() {
    let h = Harness::new(ScriptedProber::always(true));
    let addr = spawn(&h).await;

    let response = reqwest::get(format!("http://{addr}/api/health/ping"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json: Value = response.json().await.unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "pong");
    assert_eq!(json["data"]["status"], "ok");
}

#[tokio::test]
async fn test_task_lifecycle_over_http() {
    let h = Harness::new(ScriptedProber::always(true));
    let addr = spawn(&h).await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}/api/devices/ABC123/monitoring");

    let response = client.post(&base).json(&body()).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["message"], "Monitoring task created successfully");
    assert_eq!(json["data"]["serial"], "ABC123");
    assert_eq!(json["data"]["is_active"], true);

    let response = client.post(&base).json(&body()).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["success"], false);

    let response = client
        .get(format!("{base}/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["data"]["is_running"], true);
    assert_eq!(json["data"]["failure_count"], 0);

    let response = client.post(format!("{base}/start")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client.post(format!("{base}/stop")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["message"], "Monitoring stopped successfully");
    assert!(json.get("data").is_none());

    let response = client.post(format!("{base}/stop")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .get(format!("{base}/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client
        .get(format!("{base}/logs?limit=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = response.json().await.unwrap();
    let logs = json["data"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["message"], "Monitoring task stopped");

    let response = client.delete(format!("{base}/logs")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = client
        .get(format!("{base}/logs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["data"], json!([]));

    let response = client.delete(&base).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.get(&base).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_and_list() {
    let h = Harness::new(ScriptedProber::always(true));
    let addr = spawn(&h).await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}/api/devices/ABC123/monitoring");

    client.post(&base).json(&body()).send().await.unwrap();

    let mut update = body();
    update["method"] = json!("https");
    update["host"] = json!("example.com");
    let response = client.put(&base).json(&update).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["data"]["method"], "https");
    assert_eq!(json["data"]["host"], "example.com");

    assert_eq!(
        h.service.get_config("ABC123").await.unwrap().method,
        MonitoringMethod::Https
    );

    let json: Value = client
        .get(format!("http://{addr}/api/monitoring"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let response = client
        .put(format!("http://{addr}/api/devices/UNKNOWN/monitoring"))
        .json(&update)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejects_invalid_bodies() {
    let h = Harness::new(ScriptedProber::always(true));
    let addr = spawn(&h).await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}/api/devices/ABC123/monitoring");

    let mut short_interval = body();
    short_interval["checking_interval"] = json!(2);
    let response = client.post(&base).json(&short_interval).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut bad_method = body();
    bad_method["method"] = json!("carrier_pigeon");
    let response = client.post(&base).json(&bad_method).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["message"], "Invalid request body");

    let response = client
        .post(&base)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(h.service.get_all().await.is_empty());
}

#[tokio::test]
async fn test_log_event_stream_replays_history() {
    let h = Harness::new(ScriptedProber::always(true));
    let addr = spawn(&h).await;
    let client = reqwest::Client::new();

    client
        .post(format!("http://{addr}/api/devices/ABC123/monitoring"))
        .json(&body())
        .send()
        .await
        .unwrap();

    let mut response = client
        .get(format!("http://{addr}/event/devices/ABC123/monitoring/logs"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let chunk = tokio::time::timeout(Duration::from_secs(5), response.chunk())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8_lossy(&chunk);
    assert!(text.starts_with("data:"));
    assert!(text.contains("Monitoring task started"));
}
