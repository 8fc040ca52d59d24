#![allow(dead_code)]

use std::time::Duration;

use serde_json::json;
use verge_api::ClientConfig;
use verge_sdk::VergeClient;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn api(path: &str) -> String {
    format!("/api/v4/{path}")
}

/// Configuration pointed at a mock server, with retries and waits shortened.
pub fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(server.uri())
        .token("test-token")
        .retry_total(0)
        .retry_backoff(Duration::from_millis(10))
        .consistency_timeout(Duration::from_millis(500))
}

pub async fn mount_system(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(api("system")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "$key": 1,
            "yb_version": "26.0.2",
            "os_version": "26.0",
            "cloud_name": "lab"
        }])))
        .mount(server)
        .await;
}

pub async fn connected(server: &MockServer) -> VergeClient {
    mount_system(server).await;
    VergeClient::connect(config(server)).await.unwrap()
}
