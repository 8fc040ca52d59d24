mod common;

use serde_json::json;
use verge_api::constants::CLOUDINIT_MAX_SIZE;
use verge_sdk::vms::{NewDrive, NewVm, RestoreSnapshot};
use verge_sdk::{Error, ListParams};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{api, connected};

#[tokio::test]
async fn test_create_rounds_memory_and_fetches_back() {
    let server = MockServer::start().await;
    let verge = connected(&server).await;

    Mock::given(method("POST"))
        .and(path(api("vms")))
        .and(body_partial_json(json!({"name": "web01", "ram": 8192, "cpu_cores": 4})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"$key": 5})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("vms/5")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "$key": 5,
            "name": "web01",
            "ram": 8192,
            "cpu_cores": 4,
            "machine": 9
        })))
        .mount(&server)
        .await;

    let vm = verge
        .vms()
        .create(NewVm::new("web01").ram_mb(8000).cpu_cores(4))
        .await
        .unwrap();
    assert_eq!(vm.key, 5);
    assert_eq!(vm.ram, Some(8192));
    assert_eq!(vm.machine, Some(9));
}

#[tokio::test]
async fn test_drives_are_scoped_to_machine() {
    let server = MockServer::start().await;
    let verge = connected(&server).await;

    Mock::given(method("GET"))
        .and(path(api("vms/5")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "$key": 5,
            "name": "web01",
            "machine": 9
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("machine_drives")))
        .and(query_param("filter", "machine eq 9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"$key": 20, "name": "OS", "media": "disk", "disksize": 53687091200u64},
            {"$key": 21, "name": "Install", "media": "cdrom"}
        ])))
        .mount(&server)
        .await;

    let vms = verge.vms();
    let vm = vms.get_by_key(&5).await.unwrap();
    let drives = vms.drives(&vm).unwrap().list(&ListParams::new()).await.unwrap();
    assert_eq!(drives.len(), 2);
    assert_eq!(drives[0].name.as_deref(), Some("OS"));
    assert_eq!(drives[0].size_gb(), 50.0);
}

#[tokio::test]
async fn test_drive_create_sends_bytes_and_tier() {
    let server = MockServer::start().await;
    let verge = connected(&server).await;

    Mock::given(method("POST"))
        .and(path(api("machine_drives")))
        .and(body_partial_json(json!({
            "machine": 9,
            "media": "disk",
            "disksize": 53687091200u64,
            "preferred_tier": "1"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"$key": 22})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("machine_drives/22")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "$key": 22,
            "machine": 9,
            "media": "disk",
            "disksize": 53687091200u64,
            "preferred_tier": "1"
        })))
        .mount(&server)
        .await;

    let vm = serde_json::from_value(json!({"$key": 5, "name": "web01", "machine": 9})).unwrap();
    let drive = verge
        .vms()
        .drives(&vm)
        .unwrap()
        .create(NewDrive::disk(50).tier(1))
        .await
        .unwrap();
    assert_eq!(drive.key, 22);
    assert_eq!(drive.size_gb(), 50.0);
}

#[tokio::test]
async fn test_drive_create_rejects_overflowing_size() {
    let server = MockServer::start().await;
    let verge = connected(&server).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"$key": 1})))
        .expect(0)
        .mount(&server)
        .await;

    let vm = serde_json::from_value(json!({"$key": 5, "name": "web01", "machine": 9})).unwrap();
    let err = verge
        .vms()
        .drives(&vm)
        .unwrap()
        .create(NewDrive::disk(u64::MAX / 1024))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn test_clone_restore_without_vm_key_skips_power_on() {
    let server = MockServer::start().await;
    let verge = connected(&server).await;

    Mock::given(method("GET"))
        .and(path(api("machine_snapshots/30")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "$key": 30,
            "name": "nightly",
            "machine": 9,
            "snap_machine": 31
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("vms")))
        .and(query_param("filter", "machine eq 31"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"$key": 12, "name": "web01-snap", "machine": 31, "is_snapshot": true}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(api("vm_actions")))
        .and(body_partial_json(json!({"vm": 12, "action": "clone"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "queued"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(api("vm_actions")))
        .and(body_partial_json(json!({"action": "poweron"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let vm = serde_json::from_value(json!({"$key": 5, "name": "web01", "machine": 9})).unwrap();
    let response = verge
        .vms()
        .snapshots(&vm)
        .unwrap()
        .restore(30, RestoreSnapshot::as_clone().power_on(true))
        .await
        .unwrap();
    assert_eq!(response, Some(json!({"status": "queued"})));
}

#[tokio::test]
async fn test_oversized_cloud_init_fails_before_any_request() {
    let server = MockServer::start().await;
    let verge = connected(&server).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"$key": 1})))
        .expect(0)
        .mount(&server)
        .await;

    let oversized = "#cloud-config\n".to_owned() + &"x".repeat(CLOUDINIT_MAX_SIZE);
    let err = verge
        .vms()
        .create(NewVm::new("big").user_data(oversized))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn test_power_on_refuses_snapshot_vm() {
    let server = MockServer::start().await;
    let verge = connected(&server).await;

    Mock::given(method("POST"))
        .and(path(api("vm_actions")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let snapshot = serde_json::from_value(json!({
        "$key": 8,
        "name": "web01-snap",
        "is_snapshot": true
    }))
    .unwrap();
    let err = verge.vms().power_on(&snapshot, None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn test_requests_before_connect_fail() {
    let server = MockServer::start().await;
    let verge = verge_sdk::VergeClient::new(common::config(&server)).unwrap();

    let err = verge.vms().list(&ListParams::new()).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));
}
