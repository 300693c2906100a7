#![allow(dead_code)]

use secrets_provisioner::api::SecretsApi;
use secrets_provisioner::config::Engineer;
use secrets_provisioner::error_log::ErrorLog;
use secrets_provisioner::{AppInfo, Environment, ProvisionConfig};
use std::net::TcpListener;
use std::path::Path;

pub const SESSION_TOKEN: &str = "t-session";

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

pub fn engineer() -> Engineer {
    Engineer {
        name: "Sam Chen".to_string(),
        team: "iam".to_string(),
        email: "sam.chen@example.com".to_string(),
    }
}

/// Testing-mode session against `base_url`, logging errors under `dir`.
pub fn config(base_url: &str, dir: &Path) -> ProvisionConfig {
    let api = SecretsApi::new(base_url).unwrap();
    let mut config =
        ProvisionConfig::new(Environment::Uat, api, SESSION_TOKEN.to_string(), engineer());
    config.is_testing = true;
    config.error_log = ErrorLog::new(dir.join("errors.txt"));
    config
}

pub fn app() -> AppInfo {
    AppInfo {
        line_of_business: "iam".to_string(),
        app_team_name: "asm".to_string(),
        itpm: "ITPM0123456789".to_string(),
        secret_name: "script_test_azure_secret".to_string(),
        app_id: "app-1".to_string(),
    }
}
