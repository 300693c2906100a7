//! End-to-end onboarding of one Azure application: secrets, then auth
//! methods at derived paths, then a read role tying them together.

use super::Provisioned;
use super::auth_method::{AuthMethodKind, AuthMethodOutcomes, choose_auth_methods};
use super::role::{Association, RoleSetup, choose_role_option};
use super::secret::{SecretLoad, choose_secret_option};
use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::prompts::Prompter;
use std::fmt::Write as _;

/// Everything one application run produced.
#[derive(Debug, Clone)]
pub struct AppRun {
    pub secrets: SecretLoad,
    pub auth_methods: AuthMethodOutcomes,
    pub role: RoleSetup,
}

impl AppRun {
    /// Associations for every auth method that exists after the run.
    #[must_use]
    pub fn associations(auth_methods: &AuthMethodOutcomes) -> Vec<Association> {
        auth_methods
            .iter()
            .filter_map(|(_, outcome)| outcome.value())
            .map(Association::from)
            .collect()
    }
}

pub async fn create_app_resources(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
) -> Result<AppRun> {
    let secrets = choose_secret_option(config, prompter).await?;
    let app = secrets.app_info.as_ref();

    let auth_methods = choose_auth_methods(config, prompter, app).await?;
    let associations = AppRun::associations(&auth_methods);

    let role = choose_role_option(config, prompter, app, Some(&associations)).await?;

    Ok(AppRun {
        secrets,
        auth_methods,
        role,
    })
}

/// Operator-facing summary of a run. Secrets issued to new auth methods
/// (access ids, UID tokens, API keys) appear here and nowhere else.
#[must_use]
pub fn render_summary(run: &AppRun) -> String {
    let mut out = String::new();
    let role_path = run.role.role.value().map(String::as_str).unwrap_or("");

    let _ = writeln!(out, "Created secrets: ");
    let _ = writeln!(out, "\tSecret paths:");
    for path in &run.secrets.paths {
        let _ = writeln!(out, "\t\t{path}");
    }

    let _ = writeln!(out, "Created auth methods: ");
    for (kind, outcome) in &run.auth_methods {
        let Some(record) = outcome.value() else {
            continue;
        };
        let _ = writeln!(out, "\t{kind}:");

        if *kind == AuthMethodKind::Oidc {
            let groups = record
                .sub_claims
                .as_ref()
                .and_then(|claims| claims.get("groups"))
                .map(String::as_str)
                .unwrap_or("");
            let _ = writeln!(
                out,
                "\t\tOIDC access added with sub claims: 'groups={groups}' to the role '{role_path}'"
            );
        } else if outcome.is_new() {
            if let Some(access_id) = &record.access_id {
                let _ = writeln!(out, "\t\tAccess ID: {access_id}");
            }
            if let Some(uid_token) = &record.uid_token {
                let _ = writeln!(out, "\t\tUID Token: {uid_token}");
            }
            if let Some(access_key) = &record.access_key {
                let _ = writeln!(out, "\t\tAPI Access Key: {access_key}");
            }
        } else {
            let _ = writeln!(out, "\t\tAlready exists: {}", record.path);
        }
    }

    let _ = writeln!(out, "Created roles: ");
    let _ = writeln!(out, "\tRole paths:");
    match &run.role.role {
        Provisioned::Created(path) => {
            let _ = writeln!(out, "\t\t{path}");
        }
        Provisioned::AlreadyExists(path) => {
            let _ = writeln!(out, "\t\tAlready exists: {path}");
        }
        Provisioned::Failed(reason) => {
            let _ = writeln!(out, "\t\tNot created: {reason}");
        }
    }
    out
}
