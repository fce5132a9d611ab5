// Integration tests for `RestClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use xplink_api::Error;
use xplink_api::rest::{Capabilities, RestClient, ValueType};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup(version: &str) -> (MockServer, RestClient) {
    let server = MockServer::start().await;
    let uri = url::Url::parse(&server.uri()).expect("mock server uri");
    let mut client = RestClient::new(
        uri.host_str().expect("host"),
        uri.port().expect("port"),
        Duration::from_secs(5),
    )
    .expect("build client");
    client.set_version(version);
    (server, client)
}

// ── Capabilities & reachability ─────────────────────────────────────

#[tokio::test]
async fn capabilities_document_is_parsed() {
    let (server, client) = setup("v1").await;

    let body = json!({
        "api": { "versions": ["v1", "v2"] },
        "x-plane": { "version": "12.1.4" }
    });

    Mock::given(method("GET"))
        .and(path("/api/capabilities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let caps: Capabilities = client.capabilities().await.expect("capabilities");
    assert_eq!(caps.api.versions, vec!["v1".to_string(), "v2".to_string()]);
    assert_eq!(caps.xplane.version, "12.1.4");
}

#[tokio::test]
async fn capabilities_missing_is_an_error() {
    let (server, client) = setup("v1").await;

    Mock::given(method("GET"))
        .and(path("/api/capabilities"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client.capabilities().await.expect_err("must fail");
    assert!(matches!(err, Error::Rest { status: 404, .. }), "got {err:?}");
}

#[tokio::test]
async fn reachability_probe_uses_v1_count_endpoint() {
    let (server, client) = setup("v2").await;

    Mock::given(method("GET"))
        .and(path("/api/v1/datarefs/count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": 12345 })))
        .mount(&server)
        .await;

    assert!(client.reachable().await);
}

#[tokio::test]
async fn reachability_probe_false_on_error_status() {
    let (server, client) = setup("v2").await;

    Mock::given(method("GET"))
        .and(path("/api/v1/datarefs/count"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(!client.reachable().await);
}

// ── Metadata ────────────────────────────────────────────────────────

#[tokio::test]
async fn list_datarefs_unwraps_envelope() {
    let (server, client) = setup("v2").await;

    let body = json!({
        "data": [
            { "id": 1, "name": "sim/alt", "value_type": "float", "is_writable": false },
            { "id": 2, "name": "sim/gear", "value_type": "int_array", "is_writable": true },
        ]
    });

    Mock::given(method("GET"))
        .and(path("/api/v2/datarefs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let datarefs = client.list_datarefs().await.expect("list");
    assert_eq!(datarefs.len(), 2);
    assert_eq!(datarefs[0].name, "sim/alt");
    assert_eq!(datarefs[1].value_type, ValueType::IntArray);
    assert!(datarefs[1].is_writable);
}

#[tokio::test]
async fn find_dataref_filters_by_name() {
    let (server, client) = setup("v2").await;

    let body = json!({
        "data": [
            { "id": 7, "name": "sim/alt", "value_type": "double", "is_writable": true },
        ]
    });

    Mock::given(method("GET"))
        .and(path("/api/v2/datarefs"))
        .and(query_param("filter[name]", "sim/alt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let info = client.find_dataref("sim/alt").await.expect("find");
    let info = info.expect("present");
    assert_eq!(info.id, 7);
    assert_eq!(info.value_type, ValueType::Double);
}

#[tokio::test]
async fn find_dataref_unknown_name_is_none() {
    let (server, client) = setup("v2").await;

    Mock::given(method("GET"))
        .and(path("/api/v2/datarefs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    let info = client.find_dataref("sim/nope").await.expect("find");
    assert!(info.is_none());
}

#[tokio::test]
async fn list_commands_unwraps_envelope() {
    let (server, client) = setup("v2").await;

    let body = json!({
        "data": [
            { "id": 3, "name": "sim/lights/beacon_toggle", "description": "Toggle beacon light" },
            { "id": 4, "name": "sim/map/show_current" },
        ]
    });

    Mock::given(method("GET"))
        .and(path("/api/v2/commands"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let commands = client.list_commands().await.expect("list");
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].description, "Toggle beacon light");
    // description is optional on the wire
    assert_eq!(commands[1].description, "");
}

// ── Values & commands ───────────────────────────────────────────────

#[tokio::test]
async fn dataref_value_get() {
    let (server, client) = setup("v2").await;

    Mock::given(method("GET"))
        .and(path("/api/v2/datarefs/7/value"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": 1234.5 })))
        .mount(&server)
        .await;

    let value = client.dataref_value(7).await.expect("value");
    assert_eq!(value, json!(1234.5));
}

#[tokio::test]
async fn write_dataref_value_patches_envelope() {
    let (server, client) = setup("v2").await;

    Mock::given(method("PATCH"))
        .and(path("/api/v2/datarefs/7/value"))
        .and(body_json(json!({ "data": 99.0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": 99.0 })))
        .mount(&server)
        .await;

    client
        .write_dataref_value(7, &json!(99.0), None)
        .await
        .expect("write");
}

#[tokio::test]
async fn write_array_element_carries_index_query() {
    let (server, client) = setup("v2").await;

    Mock::given(method("PATCH"))
        .and(path("/api/v2/datarefs/9/value"))
        .and(query_param("index", "3"))
        .and(body_json(json!({ "data": 1.0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": 1.0 })))
        .mount(&server)
        .await;

    client
        .write_dataref_value(9, &json!(1.0), Some(3))
        .await
        .expect("write");
}

#[tokio::test]
async fn write_rejected_surfaces_status() {
    let (server, client) = setup("v2").await;

    Mock::given(method("PATCH"))
        .and(path("/api/v2/datarefs/7/value"))
        .respond_with(ResponseTemplate::new(400).set_body_string("not writable"))
        .mount(&server)
        .await;

    let err = client
        .write_dataref_value(7, &json!(1.0), None)
        .await
        .expect_err("must fail");
    match err {
        Error::Rest { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "not writable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn activate_command_posts_duration() {
    let (server, client) = setup("v2").await;

    Mock::given(method("POST"))
        .and(path("/api/v2/command/12/activate"))
        .and(body_json(json!({ "id": 12, "duration": 2.0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": true })))
        .mount(&server)
        .await;

    client.activate_command(12, 2.0).await.expect("activate");
}
