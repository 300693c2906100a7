mod common;

use common::can_bind_localhost;
use secrets_provisioner::Environment;
use secrets_provisioner::config::Credentials;
use secrets_provisioner::smoke::{SmokeSettings, SmokeStep, run_env_check};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STATIC_SECRET: &str = "/cvs/test/static";
const ROTATED_SECRET: &str = "/cvs/test/rotated";

fn settings(base_urls: Vec<String>) -> SmokeSettings {
    SmokeSettings {
        environment: Environment::Uat,
        base_urls,
        credentials: Credentials {
            access_id: "p-smoke".to_string(),
            access_key: "k-smoke".to_string(),
        },
        static_secret: STATIC_SECRET.to_string(),
        rotated_secret: ROTATED_SECRET.to_string(),
        rotation_target: "/cvs/test/target".to_string(),
    }
}

async fn mount_healthy(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth"))
        .and(body_partial_json(json!({ "access-id": "p-smoke", "access-key": "k-smoke" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t-smoke"})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/create-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
    // Left over from an earlier run.
    Mock::given(method("POST"))
        .and(path("/create-rotated-secret"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"error": "item already exists"})),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/get-secret-value"))
        .and(body_partial_json(json!({ "names": [STATIC_SECRET], "token": "t-smoke" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": "test secret"})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/get-rotated-secret-value"))
        .and(body_partial_json(json!({ "names": ROTATED_SECRET, "token": "t-smoke" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": {}})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/delete-item"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(server)
        .await;
}

#[tokio::test]
async fn healthy_url_passes_every_step() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_healthy(&server).await;

    let report = run_env_check(&settings(vec![server.uri()])).await;

    assert!(report.passed(), "{:?}", report.steps);
    let steps: Vec<_> = report.steps.iter().map(|s| s.step).collect();
    assert_eq!(
        steps,
        [
            SmokeStep::Authenticate,
            SmokeStep::CreateStatic,
            SmokeStep::CreateRotated,
            SmokeStep::GetStatic,
            SmokeStep::GetRotated,
            SmokeStep::DeleteStatic,
            SmokeStep::DeleteRotated,
        ]
    );
    assert!(report.steps.iter().all(|s| s.url == server.uri()));
}

#[tokio::test]
async fn failed_sign_in_skips_that_url_only() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let rejecting = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "invalid access key"})),
        )
        .mount(&rejecting)
        .await;
    let healthy = MockServer::start().await;
    mount_healthy(&healthy).await;

    let report = run_env_check(&settings(vec![rejecting.uri(), healthy.uri()])).await;

    assert!(!report.passed());
    assert_eq!(report.steps.len(), 8);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].url, rejecting.uri());
    assert_eq!(failures[0].step, SmokeStep::Authenticate);
    assert!(
        failures[0].error.as_deref().unwrap_or_default().contains("invalid access key"),
        "{:?}",
        failures[0].error
    );

    let received = rejecting.received_requests().await.unwrap_or_default();
    assert_eq!(received.len(), 1);
}
