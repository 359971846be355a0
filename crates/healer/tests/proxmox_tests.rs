//! Proxmox client tests against a mock API server.

use vm_healer::{ControlClient, ControlError, ProxmoxClient, ProxmoxConfig, VmId, VmStatus};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AUTH: &str = "PVEAPIToken=root@pam!healer=s3cret";

fn client(server: &MockServer) -> ProxmoxClient {
    ProxmoxClient::new(ProxmoxConfig {
        api_url: format!("{}/api2/json", server.uri()),
        node: "pve".to_string(),
        token_id: "root@pam!healer".to_string(),
        token_secret: "s3cret".to_string(),
        verify_tls: false,
        timeout_secs: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn test_status_reads_current_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/100/status/current"))
        .and(header("Authorization", AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "status": "stopped", "vmid": 100, "name": "web-1" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let status = client(&server).status(VmId(100)).await.unwrap();

    assert_eq!(status, VmStatus::Stopped);
}

#[tokio::test]
async fn test_status_keeps_unrecognized_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/101/status/current"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "status": "prelaunch" }
        })))
        .mount(&server)
        .await;

    let status = client(&server).status(VmId(101)).await.unwrap();

    assert_eq!(status, VmStatus::Unknown("prelaunch".to_string()));
    assert!(!status.is_stopped());
}

#[tokio::test]
async fn test_status_without_data_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/100/status/current"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": null })))
        .mount(&server)
        .await;

    let err = client(&server).status(VmId(100)).await.unwrap_err();

    assert!(matches!(err, ControlError::Decode(_)));
}

#[tokio::test]
async fn test_status_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve/qemu/100/status/current"))
        .respond_with(ResponseTemplate::new(401).set_body_string("authentication failure"))
        .mount(&server)
        .await;

    let err = client(&server).status(VmId(100)).await.unwrap_err();

    match err {
        ControlError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "authentication failure");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_start_posts_to_start_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve/qemu/100/status/start"))
        .and(header("Authorization", AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": "UPID:pve:000A1B2C:0001:qmstart:100:root@pam:"
        })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).start(VmId(100)).await.unwrap();
}

#[tokio::test]
async fn test_start_failure_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve/qemu/100/status/start"))
        .respond_with(ResponseTemplate::new(500).set_body_string("VM is locked"))
        .mount(&server)
        .await;

    let err = client(&server).start(VmId(100)).await.unwrap_err();

    assert!(matches!(err, ControlError::Api { status: 500, .. }));
}

#[tokio::test]
async fn test_reboot_posts_to_reboot_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve/qemu/102/status/reboot"))
        .and(header("Authorization", AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": null })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).reboot(VmId(102)).await.unwrap();
}
