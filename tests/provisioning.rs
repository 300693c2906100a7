mod common;

use common::{SESSION_TOKEN, app, can_bind_localhost, config};
use secrets_provisioner::prompts::Prompter;
use secrets_provisioner::provision::app as workflow;
use secrets_provisioner::{ProvisionError, Provisioned};
use secrets_provisioner::provision::auth_method::{self, AuthMethodKind};
use secrets_provisioner::provision::role::{self, Association};
use secrets_provisioner::provision::secret::{self, SecretRequest};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HEADER: &str = "template,path,secret_name,line_of_business,app_team,itpm,description,app_id,owner1,owner2,owner3\n";

async fn request_bodies(server: &MockServer, endpoint: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == endpoint)
        .map(|r| r.body_json::<Value>().unwrap())
        .collect()
}

#[tokio::test]
async fn second_create_reports_already_exists() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create-rotated-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/create-rotated-secret"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"error": "item already exists"})),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(&server.uri(), dir.path());
    let app = app();
    let request = SecretRequest {
        path: app.secret_path(),
        tags: config.default_tags.clone(),
        description: "test".to_string(),
        app_info: app.clone(),
    };

    let first = secret::add_rotated_secret(&config, &request).await;
    let second = secret::add_rotated_secret(&config, &request).await;

    assert_eq!(first, Provisioned::Created(app.secret_path()));
    assert_eq!(second, Provisioned::AlreadyExists(app.secret_path()));
    assert!(!config.error_log.path().exists());

    let bodies = request_bodies(&server, "/create-rotated-secret").await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["token"], SESSION_TOKEN);
    assert_eq!(bodies[0]["rotation-interval"], "90");
    assert_eq!(bodies[0]["target-name"], config.rotation_target.as_str());
}

#[tokio::test]
async fn bulk_load_submits_rows_in_file_order() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create-rotated-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("bulk.csv");
    std::fs::write(
        &csv_path,
        format!(
            "{HEADER}\
             n,,script_test_azure_secret,iam,asm,ITPM0123456789,,app-1,alice,bob,\n\
             n,/cvs/iam/asm-ITPM0123456789/secrets/azure/script_test_azure_secret_2,,,,,custom,app-2,alice,bob,carol\n"
        ),
    )
    .unwrap();

    let config = config(&server.uri(), dir.path());
    let mut prompter = Prompter::scripted("");
    let load = secret::load_bulk(&config, &mut prompter, Some(csv_path))
        .await
        .unwrap();

    let expected = [
        "/cvs/iam/asm-ITPM0123456789/secrets/azure/script_test_azure_secret",
        "/cvs/iam/asm-ITPM0123456789/secrets/azure/script_test_azure_secret_2",
    ];
    assert_eq!(load.paths, expected);
    assert_eq!(load.app_info.unwrap().app_id, "app-2");

    let bodies = request_bodies(&server, "/create-rotated-secret").await;
    let names: Vec<_> = bodies.iter().map(|b| b["name"].as_str().unwrap()).collect();
    assert_eq!(names, expected);
    assert_eq!(bodies[0]["tags"][0], "owner1:alice");
    assert_eq!(bodies[1]["application-id"], "app-2");
    assert_eq!(bodies[1]["description"], "custom");
}

#[tokio::test]
async fn failed_row_is_logged_and_the_rest_still_load() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let failing = "/cvs/iam/asm-ITPM1/secrets/azure/first";
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create-rotated-secret"))
        .and(body_partial_json(json!({ "name": failing })))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/create-rotated-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("bulk.csv");
    std::fs::write(
        &csv_path,
        format!("{HEADER}n,,first,iam,asm,ITPM1,,app-1,a,b,\nn,,second,iam,asm,ITPM1,,app-1,a,b,\n"),
    )
    .unwrap();

    let config = config(&server.uri(), dir.path());
    let mut prompter = Prompter::scripted("");
    let load = secret::load_bulk(&config, &mut prompter, Some(csv_path))
        .await
        .unwrap();

    assert_eq!(load.paths, ["/cvs/iam/asm-ITPM1/secrets/azure/second"]);
    let log = std::fs::read_to_string(config.error_log.path()).unwrap();
    assert!(log.contains(&format!("Secret Path: {failing}")), "{log}");
    assert!(log.contains("boom"), "{log}");
}

#[tokio::test]
async fn uid_method_comes_back_with_its_token() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create-auth-method-universal-identity"))
        .and(body_partial_json(json!({ "ttl": 4320 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_id": "p-uid1"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/uid-generate-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "u-first"})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(&server.uri(), dir.path());
    let app = app();
    let mut prompter = Prompter::scripted("");

    let outcome = auth_method::create_uid(&config, &mut prompter, Some(&app))
        .await
        .unwrap();

    let Provisioned::Created(record) = outcome else {
        panic!("expected a new auth method, got {outcome:?}");
    };
    assert_eq!(record.kind, AuthMethodKind::Uid);
    assert_eq!(
        record.path,
        "/cvs/iam/asm-ITPM0123456789/authmethod/uid/asm-ITPM0123456789-uid"
    );
    assert_eq!(record.access_id.as_deref(), Some("p-uid1"));
    assert_eq!(record.uid_token.as_deref(), Some("u-first"));

    let bodies = request_bodies(&server, "/uid-generate-token").await;
    assert_eq!(bodies[0]["auth-method-name"], record.path.as_str());
}

#[tokio::test]
async fn uid_method_without_token_is_still_created() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create-auth-method-universal-identity"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_id": "p-uid1"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/uid-generate-token"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "no token"})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(&server.uri(), dir.path());
    let mut prompter = Prompter::scripted("");

    let outcome = auth_method::create_uid(&config, &mut prompter, Some(&app()))
        .await
        .unwrap();

    assert!(outcome.is_new());
    assert_eq!(outcome.value().unwrap().uid_token, None);
    assert!(config.error_log.path().exists());
}

#[tokio::test]
async fn missing_auth_method_does_not_stop_association() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/assoc-role-am"))
        .and(body_partial_json(json!({ "am-name": "/cvs/missing" })))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not found"})))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/assoc-role-am"))
        .and(body_partial_json(json!({ "am-name": "/cvs/existing" })))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"error": "exists"})))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/assoc-role-am"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(&server.uri(), dir.path());
    let role_path = app().role_path();
    let methods = [
        Association::new("/cvs/missing"),
        Association::new("/cvs/existing"),
        Association::new("/cvs/new"),
    ];

    let associated = role::associate_auth_methods(&config, &role_path, &methods).await;

    assert_eq!(associated, ["/cvs/existing", "/cvs/new"]);
    let bodies = request_bodies(&server, "/assoc-role-am").await;
    assert_eq!(bodies.len(), 3);
    assert!(bodies.iter().all(|b| b["role-name"] == role_path.as_str()));
}

#[tokio::test]
async fn role_gets_default_deny_rules_in_order() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    for endpoint in ["/create-role", "/set-role-rule"] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let config = config(&server.uri(), dir.path());
    let role_path = app().role_path();

    role::apply_rules(&config, &role_path, &role::default_deny_rules())
        .await
        .unwrap();

    let bodies = request_bodies(&server, "/set-role-rule").await;
    let rule_types: Vec<_> = bodies
        .iter()
        .map(|b| b["rule-type"].as_str().unwrap())
        .collect();
    assert_eq!(rule_types, ["role-rule", "item-rule", "auth-method-rule"]);
    assert!(bodies.iter().all(|b| b["capability"] == json!(["deny"])));
}

#[tokio::test]
async fn bad_bulk_rows_are_logged_and_skipped() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create-rotated-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("bulk.csv");
    std::fs::write(
        &csv_path,
        format!(
            "{HEADER}\
             n,,short,iam\n\
             n,/somewhere/else,,,,,,app-1,a,b,\n\
             n,,good,iam,asm,ITPM1,,app-1,a,b,\n"
        ),
    )
    .unwrap();

    let config = config(&server.uri(), dir.path());
    let mut prompter = Prompter::scripted("");
    let load = secret::load_bulk(&config, &mut prompter, Some(csv_path))
        .await
        .unwrap();

    assert_eq!(load.paths, ["/cvs/iam/asm-ITPM1/secrets/azure/good"]);
    assert_eq!(request_bodies(&server, "/create-rotated-secret").await.len(), 1);

    let log = std::fs::read_to_string(config.error_log.path()).unwrap();
    assert!(log.contains("Bulk File: "), "{log}");
    assert!(log.contains("Row 2"), "{log}");
    assert!(log.contains("Row 3"), "{log}");
}

#[tokio::test]
async fn second_role_create_reports_already_exists() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create-role"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/create-role"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"error": "role exists"})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(&server.uri(), dir.path());
    let app = app();
    let mut prompter = Prompter::scripted("");

    let first = role::create_role(&config, &mut prompter, Some(&app))
        .await
        .unwrap();
    let second = role::create_role(&config, &mut prompter, Some(&app))
        .await
        .unwrap();

    assert_eq!(first, Provisioned::Created(app.role_path()));
    assert_eq!(second, Provisioned::AlreadyExists(app.role_path()));
    assert!(!config.error_log.path().exists());

    let bodies = request_bodies(&server, "/create-role").await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(
        bodies[0]["name"],
        "/cvs/iam/asm-ITPM0123456789/roles/asm-ITPM0123456789-read-all"
    );
}

#[tokio::test]
async fn azure_ad_asks_again_until_a_limitation_is_given() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create-auth-method-azure-ad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_id": "p-az1"})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&server.uri(), dir.path());
    config.tenant_id = Some("tenant-1".to_string());
    let app = app();

    // First round leaves everything blank, second picks VirtualMachines.
    let mut prompter = Prompter::scripted("\n\n\n1\nvm-1, vm-2\n\n\n");
    let outcome = auth_method::create_azure_ad(&config, &mut prompter, Some(&app))
        .await
        .unwrap();

    assert!(outcome.is_new());
    assert_eq!(outcome.value().unwrap().access_id.as_deref(), Some("p-az1"));

    let bodies = request_bodies(&server, "/create-auth-method-azure-ad").await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["bound-tenant-id"], "tenant-1");
    assert_eq!(bodies[0]["bound-resource-types"], json!(["VirtualMachines"]));
    assert_eq!(bodies[0]["bound-resource-names"], json!(["vm-1", "vm-2"]));
    assert_eq!(bodies[0]["bound-sub-id"], json!([]));
    assert_eq!(
        bodies[0]["name"],
        "/cvs/iam/asm-ITPM0123456789/authmethod/azure-ad/asm-ITPM0123456789-azure-ad"
    );
}

#[tokio::test]
async fn azure_ad_without_limitations_stops_at_end_of_input() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&server.uri(), dir.path());
    config.tenant_id = Some("tenant-1".to_string());

    let mut prompter = Prompter::scripted("\n\n\n");
    let result = auth_method::create_azure_ad(&config, &mut prompter, Some(&app())).await;

    assert!(matches!(result, Err(ProvisionError::Cancelled)));
    assert!(request_bodies(&server, "/create-auth-method-azure-ad").await.is_empty());
}

const CA_CERT: &str = "-----BEGIN CERTIFICATE-----\nMIIBszCCAVmgAwIBAgIUQ\n-----END CERTIFICATE-----";

#[tokio::test]
async fn k8s_method_validates_certificate_and_token() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gateway-create-k8s-auth-config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let bad_cert = dir.path().join("bad.pem");
    let good_cert = dir.path().join("ca.pem");
    std::fs::write(&bad_cert, "not a certificate").unwrap();
    std::fs::write(&good_cert, format!("{CA_CERT}\n")).unwrap();

    let mut config = config(&server.uri(), dir.path());
    config.default_k8s_cert_file = Some(bad_cert);

    let script = format!(
        "1\nhttps://k8s.example.com:6443\n{}\nnot-a-jwt\neyJhbGciOiJSUzI1NiJ9.e30.c2ln\n",
        good_cert.display()
    );
    let mut prompter = Prompter::scripted(&script);
    let outcome = auth_method::create_k8s(&config, &mut prompter, Some(&app()))
        .await
        .unwrap();

    assert!(outcome.is_new());
    let bodies = request_bodies(&server, "/gateway-create-k8s-auth-config").await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["cluster-api-type"], "native_k8s");
    assert_eq!(bodies[0]["k8s-auth-type"], "token");
    assert_eq!(bodies[0]["k8s-host"], "https://k8s.example.com:6443");
    assert_eq!(bodies[0]["k8s-ca-cert"], CA_CERT);
    assert_eq!(bodies[0]["token-reviewer-jwt"], "eyJhbGciOiJSUzI1NiJ9.e30.c2ln");
}

#[tokio::test]
async fn rancher_clusters_are_not_created() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&server.uri(), dir.path());

    let mut prompter = Prompter::scripted("2\n");
    let outcome = auth_method::create_k8s(&config, &mut prompter, Some(&app()))
        .await
        .unwrap();

    assert!(outcome.is_failed());
    assert!(request_bodies(&server, "/gateway-create-k8s-auth-config").await.is_empty());
}

#[tokio::test]
async fn app_workflow_ties_secrets_methods_and_role_together() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    for endpoint in [
        "/create-rotated-secret",
        "/create-role",
        "/set-role-rule",
        "/assoc-role-am",
    ] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/create-auth-method-universal-identity"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_id": "p-uid1"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/uid-generate-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "u-first"})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("bulk.csv");
    std::fs::write(
        &csv_path,
        format!("{HEADER}n,,script_test_azure_secret,iam,asm,ITPM0123456789,,app-1,alice,bob,\n"),
    )
    .unwrap();
    let mut config = config(&server.uri(), dir.path());
    config.default_bulk_file = Some(csv_path);

    // Bulk load, then the UID auth method.
    let mut prompter = Prompter::scripted("2\n5\n");
    let run = workflow::create_app_resources(&config, &mut prompter)
        .await
        .unwrap();

    let app = app();
    let uid_path = app.auth_method_path(AuthMethodKind::Uid.path_segment());
    assert_eq!(run.secrets.paths, [app.secret_path()]);
    assert_eq!(run.role.role, Provisioned::Created(app.role_path()));
    assert_eq!(run.role.associated, [uid_path.clone()]);

    let rules = request_bodies(&server, "/set-role-rule").await;
    let rule_paths: Vec<_> = rules.iter().map(|b| b["path"].as_str().unwrap()).collect();
    assert_eq!(rule_paths.len(), 4);
    assert_eq!(rule_paths[3], app.secrets_glob());
    assert_eq!(rules[3]["capability"], json!(["read", "list"]));

    let assoc = request_bodies(&server, "/assoc-role-am").await;
    assert_eq!(assoc.len(), 1);
    assert_eq!(assoc[0]["am-name"], uid_path.as_str());
    assert_eq!(assoc[0]["role-name"], app.role_path().as_str());

    let summary = workflow::render_summary(&run);
    assert!(summary.contains(&format!("\t\t{}", app.secret_path())), "{summary}");
    assert!(summary.contains("\t\tAccess ID: p-uid1"), "{summary}");
    assert!(summary.contains("\t\tUID Token: u-first"), "{summary}");
    assert!(summary.contains(&format!("\t\t{}", app.role_path())), "{summary}");
}
