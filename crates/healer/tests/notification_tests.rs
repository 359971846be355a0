//! Notification delivery as seen from the remediation engine.

mod common;

use std::sync::Arc;
use std::time::Duration;

use notify::Notifier;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{scenario_mapping, FakeControl};
use vm_healer::{Alert, AlertKind, CooldownGuard, PolicyEngine, RemediationOutcome, VmStatus};

fn engine_with_slack(webhook_url: String, timeout: Duration) -> PolicyEngine {
    let notifier = Notifier::from_settings(None, Some(webhook_url), timeout).unwrap();
    PolicyEngine::new(
        scenario_mapping(),
        Arc::new(CooldownGuard::new(Duration::from_secs(300))),
        Arc::new(FakeControl::new(VmStatus::Stopped)),
        Arc::new(notifier),
    )
}

#[tokio::test]
async fn test_hanging_slack_webhook_does_not_stall_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let engine = engine_with_slack(
        format!("{}/hook", server.uri()),
        Duration::from_millis(200),
    );
    let batch = [Alert::firing(AlertKind::HighCpuUsage, "10.0.0.5:9100")];

    let report = tokio::time::timeout(Duration::from_secs(5), engine.handle_batch(&batch))
        .await
        .expect("batch was blocked by the Slack webhook");

    assert_eq!(report.processed, 1);
    assert_eq!(report.count(RemediationOutcome::Notified), 1);
}

#[tokio::test]
async fn test_slack_receives_started_notification() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine_with_slack(format!("{}/hook", server.uri()), Duration::from_secs(5));

    let outcome = engine
        .handle(&Alert::firing(AlertKind::InstanceDown, "10.0.0.5:9100"))
        .await
        .unwrap();

    assert_eq!(outcome, RemediationOutcome::Started);
}
