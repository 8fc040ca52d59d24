mod common;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use verge_api::{
    Compensation, Endpoint, Error, ListParams, Lookup, NasUserKey, Record, ResourceManager,
};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{api, connected};

#[derive(Debug, Deserialize)]
struct Machine {
    #[serde(rename = "$key")]
    key: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    ram: u64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

verge_api::impl_record!(Machine, u64);

#[derive(Debug, Deserialize)]
struct ServiceUser {
    #[serde(rename = "$key")]
    key: NasUserKey,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

verge_api::impl_record!(ServiceUser, NasUserKey);

const VMS: Endpoint = Endpoint::new("vms")
    .fields(&["$key", "name", "ram"])
    .actions("vm_actions", "vm");

const DRIVES: Endpoint = Endpoint::new("machine_drives")
    .fields(&["$key", "name"])
    .sort("+orderid");

const USERS: Endpoint = Endpoint::new("vm_service_users").lookup_by_filter();

fn body(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ============================================================================
// List Tests
// ============================================================================

#[tokio::test]
async fn test_list_empty_body_is_empty_vec() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("GET"))
        .and(path(api("vms")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let vms = ResourceManager::<Machine>::new(&client, VMS);
    assert!(vms.list(&ListParams::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_single_object_is_one_element() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("GET"))
        .and(path(api("vms")))
        .and(query_param("fields", "$key,name,ram"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"$key": 3, "name": "web"})))
        .mount(&server)
        .await;

    let vms = ResourceManager::<Machine>::new(&client, VMS);
    let list = vms.list(&ListParams::new()).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].name, "web");
}

#[tokio::test]
async fn test_scoped_list_builds_ordered_filter() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("GET"))
        .and(path(api("machine_drives")))
        .and(query_param(
            "filter",
            "(media eq 'disk' or media eq 'cdrom') and machine eq 7 and name like 'boot%'",
        ))
        .and(query_param("sort", "+orderid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"$key": 1}, {"$key": 2}])))
        .expect(1)
        .mount(&server)
        .await;

    let drives = ResourceManager::<Machine>::scoped(&client, DRIVES, "machine eq 7");
    let params = ListParams::new()
        .filter("media eq 'disk' or media eq 'cdrom'")
        .term("name", "boot*");
    let keys: Vec<u64> = drives.list(&params).await.unwrap().iter().map(Record::key).collect();
    assert_eq!(keys, vec![1, 2]);
}

#[tokio::test]
async fn test_list_all_pages_until_short_page() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("GET"))
        .and(path(api("vms")))
        .and(query_param("limit", "2"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"$key": 1}, {"$key": 2}])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("vms")))
        .and(query_param("limit", "2"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"$key": 3}])))
        .expect(1)
        .mount(&server)
        .await;

    let vms = ResourceManager::<Machine>::new(&client, VMS);
    let all = vms.list_all(&ListParams::new(), Some(2)).await.unwrap();
    assert_eq!(all.iter().map(Record::key).collect::<Vec<_>>(), vec![1, 2, 3]);
}

// ============================================================================
// Get Tests
// ============================================================================

#[tokio::test]
async fn test_get_by_key_null_is_not_found() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("GET"))
        .and(path(api("vms/42")))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&server)
        .await;

    let vms = ResourceManager::<Machine>::new(&client, VMS);
    let err = vms.get(Lookup::Key(42)).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_get_by_name_uses_limited_list() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("GET"))
        .and(path(api("vms")))
        .and(query_param("filter", "name eq 'o''brien'"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let vms = ResourceManager::<Machine>::new(&client, VMS);
    let err = vms.get(Lookup::Name("o'brien".into())).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_get_without_identifier_sends_nothing() {
    let server = MockServer::start().await;
    let _client = connected(&server).await;
    Mock::given(method("GET"))
        .and(path(api("vms")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = Lookup::<u64>::from_parts(None, None).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn test_filter_style_key_lookup() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let hex = "a1b2c3d4e5f60718293a4b5c6d7e8f9012345678";
    Mock::given(method("GET"))
        .and(path(api("vm_service_users")))
        .and(query_param("filter", format!("$key eq '{hex}'")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"$key": hex, "name": "svc"}])))
        .expect(1)
        .mount(&server)
        .await;

    let users = ResourceManager::<ServiceUser>::new(&client, USERS);
    let user = users.get_by_key(&NasUserKey::new(hex).unwrap()).await.unwrap();
    assert_eq!(user.key.as_str(), hex);
    assert_eq!(user.field("name"), Some(&json!("svc")));
}

// ============================================================================
// Write Tests
// ============================================================================

#[tokio::test]
async fn test_create_fetches_full_record() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("POST"))
        .and(path(api("vms")))
        .and(body_json(json!({"name": "web", "ram": 8192})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"$key": 9})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("vms/9")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "$key": 9, "name": "web", "ram": 8192, "machine": 31
        })))
        .expect(1)
        .mount(&server)
        .await;

    let vms = ResourceManager::<Machine>::new(&client, VMS);
    let vm = vms.create(body(json!({"name": "web", "ram": 8192}))).await.unwrap();
    assert_eq!(vm.ram, 8192);
    assert_eq!(vm.field("machine"), Some(&json!(31)));
}

#[tokio::test]
async fn test_create_waits_for_row_to_appear() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("POST"))
        .and(path(api("vms")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"location": "/v4/vms/12"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("vms/12")))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("vms/12")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"$key": 12, "name": "late"})))
        .expect(1)
        .mount(&server)
        .await;

    let vms = ResourceManager::<Machine>::new(&client, VMS);
    let vm = vms.create(body(json!({"name": "late"}))).await.unwrap();
    assert_eq!(vm.key, 12);
}

#[tokio::test]
async fn test_create_without_key_falls_back_to_name() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("POST"))
        .and(path(api("vms")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("vms")))
        .and(query_param("filter", "name eq 'anon'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"$key": 5, "name": "anon"}])))
        .expect(1)
        .mount(&server)
        .await;

    let vms = ResourceManager::<Machine>::new(&client, VMS);
    assert_eq!(vms.create(body(json!({"name": "anon"}))).await.unwrap().key, 5);
}

#[tokio::test]
async fn test_update_without_fields_only_reads() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("vms/3")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"$key": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let vms = ResourceManager::<Machine>::new(&client, VMS);
    vms.update(&3, Map::new()).await.unwrap();
}

#[tokio::test]
async fn test_update_sends_only_supplied_fields() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("PUT"))
        .and(path(api("vms/3")))
        .and(body_json(json!({"ram": 4096})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("vms/3")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"$key": 3, "ram": 4096})))
        .expect(1)
        .mount(&server)
        .await;

    let vms = ResourceManager::<Machine>::new(&client, VMS);
    let vm = vms.update(&3, body(json!({"ram": 4096}))).await.unwrap();
    assert_eq!(vm.ram, 4096);
}

#[tokio::test]
async fn test_delete_twice_reports_not_found() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("DELETE"))
        .and(path(api("vms/8")))
        .respond_with(ResponseTemplate::new(204))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(api("vms/8")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"err": "no such row"})))
        .mount(&server)
        .await;

    let vms = ResourceManager::<Machine>::new(&client, VMS);
    vms.delete(&8).await.unwrap();
    assert!(vms.delete(&8).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_action_posts_merged_body() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("POST"))
        .and(path(api("vm_actions")))
        .and(body_json(json!({
            "vm": 5,
            "action": "poweron",
            "params": {"preferred_node": 2}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task": 77})))
        .expect(1)
        .mount(&server)
        .await;

    let vms = ResourceManager::<Machine>::new(&client, VMS);
    let response = vms
        .action(&5, "poweron", body(json!({"params": {"preferred_node": 2}})))
        .await
        .unwrap();
    assert_eq!(response, Some(json!({"task": 77})));
}

#[tokio::test]
async fn test_action_without_endpoint_is_invalid() {
    let server = MockServer::start().await;
    let client = connected(&server).await;

    let drives = ResourceManager::<Machine>::new(&client, DRIVES);
    let err = drives.action(&1, "noop", Map::new()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

// ============================================================================
// Compensation Tests
// ============================================================================

#[tokio::test]
async fn test_compensation_rollback_deletes() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("DELETE"))
        .and(path(api("machine_snapshots/50")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let guard = Compensation::new(&client, "machine_snapshots/50");
    assert_eq!(guard.path(), "machine_snapshots/50");
    guard.rollback().await.unwrap();
}

#[tokio::test]
async fn test_compensation_commit_keeps_resource() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    Compensation::new(&client, "machine_snapshots/51").commit();
}

#[tokio::test]
async fn test_inline_action_puts_to_record() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("PUT"))
        .and(path(api("tasks/4")))
        .and(query_param("action", "execute"))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    const TASKS: Endpoint = Endpoint::new("tasks").inline_actions();
    let tasks = ResourceManager::<Machine>::new(&client, TASKS);
    assert_eq!(tasks.action(&4, "execute", Map::new()).await.unwrap(), None);
}
