mod common;

use serde_json::json;
use verge_sdk::shared_objects::ShareVm;
use verge_sdk::{Error, KeyOrName, Lookup};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{api, connected};

const USER_KEY: &str = "8f2d6c1e0b9a4f3e2d1c0b9a8f7e6d5c4b3a2918";

#[tokio::test]
async fn test_failed_share_removes_snapshot() {
    let server = MockServer::start().await;
    let verge = connected(&server).await;

    Mock::given(method("GET"))
        .and(path(api("vms/7")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "$key": 7,
            "name": "golden",
            "machine": 11
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(api("machine_snapshots")))
        .and(body_partial_json(json!({"machine": 11, "expires_type": "never"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"$key": 40})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(api("shared_objects")))
        .and(body_partial_json(json!({
            "recipient": 2,
            "type": "vm",
            "name": "golden",
            "snapshot": "machine_snapshots/40"
        })))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"err": "disk full"})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(api("machine_snapshots/40")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let err = verge
        .shared_objects()
        .create(ShareVm::new(2, 7))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(500));
}

#[tokio::test]
async fn test_share_lookup_by_name_needs_tenant() {
    let server = MockServer::start().await;
    let verge = connected(&server).await;

    let err = verge
        .shared_objects()
        .get(Lookup::Name("golden".into()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn test_nas_user_lookup_by_name_needs_service() {
    let server = MockServer::start().await;
    let verge = connected(&server).await;

    let err = verge.nas_users().get_by_name("backup", None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn test_nas_user_lookup_resolves_service_name() {
    let server = MockServer::start().await;
    let verge = connected(&server).await;

    Mock::given(method("GET"))
        .and(path(api("vm_services")))
        .and(query_param("filter", "name eq 'nas01'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"$key": 2, "name": "nas01"}])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("vm_service_users")))
        .and(query_param("filter", "service eq 2 and name eq 'backup'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "$key": USER_KEY,
            "name": "backup",
            "service": 2,
            "enabled": true,
            "status_value": "online"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let user = verge
        .nas_users()
        .get_by_name("backup", Some(KeyOrName::from("nas01")))
        .await
        .unwrap();
    assert_eq!(user.key.as_str(), USER_KEY);
    assert_eq!(user.service_key(), Some(2));
    assert_eq!(user.status_display(), "Enabled");
}
