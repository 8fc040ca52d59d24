mod common;

use std::time::Duration;

use serde_json::json;
use verge_api::Backoff;
use verge_sdk::Error;
use verge_sdk::resource_groups::DeviceClass;
use verge_sdk::tasks::WaitOptions;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{api, connected};

fn fast_wait() -> WaitOptions {
    WaitOptions::default()
        .timeout(Duration::from_millis(200))
        .backoff(Backoff::new(Duration::from_millis(20)))
}

#[tokio::test]
async fn test_wait_times_out_on_running_task() {
    let server = MockServer::start().await;
    let verge = connected(&server).await;

    Mock::given(method("GET"))
        .and(path(api("tasks/4")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "$key": 4,
            "name": "nightly",
            "status": "running"
        })))
        .mount(&server)
        .await;

    let err = verge.tasks().wait(4, fast_wait()).await.unwrap_err();
    match err {
        Error::TaskTimeout { task_id, .. } => assert_eq!(task_id, "4"),
        other => panic!("expected task timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_wait_raises_task_error() {
    let server = MockServer::start().await;
    let verge = connected(&server).await;

    Mock::given(method("GET"))
        .and(path(api("tasks/4")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "$key": 4,
            "status": "error",
            "error": "snapshot failed"
        })))
        .mount(&server)
        .await;

    let err = verge.tasks().wait(4, fast_wait()).await.unwrap_err();
    match err {
        Error::Task { task_id, message } => {
            assert_eq!(task_id, "4");
            assert_eq!(message, "snapshot failed");
        }
        other => panic!("expected task error, got {other:?}"),
    }

    let task = verge
        .tasks()
        .wait(4, fast_wait().raise_on_error(false))
        .await
        .unwrap();
    assert!(task.has_error());
}

#[tokio::test]
async fn test_wait_returns_idle_task() {
    let server = MockServer::start().await;
    let verge = connected(&server).await;

    Mock::given(method("GET"))
        .and(path(api("tasks/4")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "$key": 4,
            "status": "idle"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let task = verge.tasks().wait(4, fast_wait()).await.unwrap();
    assert!(task.is_complete());
}

#[tokio::test]
async fn test_resource_groups_by_class() {
    let server = MockServer::start().await;
    let verge = connected(&server).await;

    Mock::given(method("GET"))
        .and(path(api("resource_groups")))
        .and(query_param("filter", "class eq 'gpu' and enabled eq true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "$key": 1,
            "uuid": "0b8f7f5e-1c2d-4e3f-9a0b-1c2d3e4f5a6b",
            "name": "a100-pool",
            "type": "node_host_gpu_devices",
            "class": "gpu",
            "enabled": true
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let groups = verge
        .resource_groups()
        .list_by_class(DeviceClass::Gpu, Some(true))
        .await
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].device_class(), Some(DeviceClass::Gpu));
    assert!(groups[0].is_enabled());
}
