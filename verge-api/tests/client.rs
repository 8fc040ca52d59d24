mod common;

use std::time::Duration;

use serde_json::json;
use verge_api::{Client, Error};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{api, config, connected, mount_system};

// ============================================================================
// Session Tests
// ============================================================================

#[tokio::test]
async fn test_connect_records_system_info() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(api("system")))
        .and(query_param("fields", "$key,yb_version,os_version,cloud_name"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "$key": 1,
            "yb_version": "26.0.2",
            "cloud_name": "lab"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(config(&server)).unwrap();
    let info = client.connect().await.unwrap();

    assert_eq!(info.version.as_deref(), Some("26.0.2"));
    assert_eq!(info.cloud_name.as_deref(), Some("lab"));
    assert_eq!(info.os_version, None);
    assert!(client.is_connected().await);
    assert_eq!(client.system_info().await, Some(info));
}

#[tokio::test]
async fn test_connect_with_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(api("system")))
        .and(header("authorization", "Basic YWRtaW46cHc="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"yb_version": "26"}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(config(&server).basic_auth("admin", "pw")).unwrap();
    client.connect().await.unwrap();
}

#[tokio::test]
async fn test_connect_rejected_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(api("system")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"err": "Invalid credentials"})))
        .mount(&server)
        .await;

    let client = Client::new(config(&server)).unwrap();
    let err = client.connect().await.unwrap_err();

    assert!(matches!(err, Error::Authentication { status: 401, ref message } if message == "Invalid credentials"));
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn test_disconnect_blocks_requests() {
    let server = MockServer::start().await;
    let client = connected(&server).await;

    client.disconnect().await;
    let err = client.get("vms", &[]).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));
}

#[tokio::test]
async fn test_unreachable_host_is_connection_error() {
    let client = Client::new(verge_api::ClientConfig::new("http://127.0.0.1:1").retry_total(0)).unwrap();
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "got {err:?}");
}

// ============================================================================
// Response Decoding Tests
// ============================================================================

#[tokio::test]
async fn test_no_content_is_none() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("DELETE"))
        .and(path(api("vms/4")))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    assert_eq!(client.delete("vms/4").await.unwrap(), None);
}

#[tokio::test]
async fn test_empty_body_is_none() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("GET"))
        .and(path(api("vms")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    assert_eq!(client.get("vms", &[]).await.unwrap(), None);
}

#[tokio::test]
async fn test_error_status_maps_to_typed_error() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("POST"))
        .and(path(api("vnets")))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"err": "name already in use"})))
        .mount(&server)
        .await;

    let err = client.post("vnets", &json!({"name": "dmz"})).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(ref m) if m == "name already in use"));
    assert_eq!(err.status_code(), Some(409));
}

// ============================================================================
// Retry Tests
// ============================================================================

#[tokio::test]
async fn test_retryable_status_is_retried() {
    let server = MockServer::start().await;
    mount_system(&server).await;
    Mock::given(method("GET"))
        .and(path(api("vms")))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("vms")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(
        config(&server)
            .retry_total(3)
            .retry_backoff(Duration::from_millis(5)),
    )
    .unwrap();
    client.connect().await.unwrap();

    assert_eq!(client.get("vms", &[]).await.unwrap(), Some(json!([])));
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;
    mount_system(&server).await;
    Mock::given(method("GET"))
        .and(path(api("vms")))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let client = Client::new(
        config(&server)
            .retry_total(2)
            .retry_backoff(Duration::from_millis(5)),
    )
    .unwrap();
    client.connect().await.unwrap();

    let err = client.get("vms", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 502, .. }));
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    mount_system(&server).await;
    Mock::given(method("GET"))
        .and(path(api("vms/9")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(config(&server).retry_total(3)).unwrap();
    client.connect().await.unwrap();

    assert!(client.get("vms/9", &[]).await.unwrap_err().is_not_found());
}
