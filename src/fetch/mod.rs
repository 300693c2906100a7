//! Sample secret fetch client
//!
//! Authenticates with one of the supported access types and reads a rotated
//! secret's value. Any failure writes a diagnostic report under
//! `./akeyless_error_logs/` before the error is returned.

pub mod cloud_id;
pub mod uid_token;

use crate::api::SecretsApi;
use crate::api::models::{AuthRequest, RotatedSecretGetValue};
use crate::config::SCRIPT_VERSION;
use crate::error::{ProvisionError, Result};
use crate::error_log::{DEFAULT_DIAGNOSTIC_DIR, DiagnosticLog};
use crate::prompts::Prompter;
use cloud_id::{aws_cloud_id, load_credentials};
use std::path::PathBuf;
use uid_token::TokenFile;
use zeroize::Zeroizing;

/// Sentinel access ids shipped in sample configuration.
const ACCESS_ID_SENTINELS: &[&str] = &["", "p-..."];

/// Sentinel secret paths shipped in sample configuration.
const SECRET_PATH_SENTINELS: &[&str] = &["", "...", "/cvs/..."];

/// How the fetch client authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FetchAuth {
    /// Access id and access key
    ApiKey,
    /// Universal identity token from the token file
    Uid,
    /// Signed AWS STS request from the default AWS credential chain
    AwsIam,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub base_url: String,
    pub access_id: String,
    pub secret_path: String,
    pub auth: FetchAuth,
    pub access_key: Option<String>,
    pub token_file: PathBuf,
    pub rotate_uid_token: bool,
    pub diagnostic_dir: PathBuf,
}

impl FetchOptions {
    #[must_use]
    pub fn new(base_url: &str, access_id: &str, secret_path: &str, auth: FetchAuth) -> Self {
        Self {
            base_url: base_url.to_string(),
            access_id: access_id.to_string(),
            secret_path: secret_path.to_string(),
            auth,
            access_key: None,
            token_file: PathBuf::from(uid_token::DEFAULT_TOKEN_FILE),
            rotate_uid_token: false,
            diagnostic_dir: PathBuf::from(DEFAULT_DIAGNOSTIC_DIR),
        }
    }

    /// Reject the placeholder values shipped with the sample configuration.
    pub fn validate(&self) -> Result<()> {
        if ACCESS_ID_SENTINELS.contains(&self.access_id.trim()) {
            return Err(ProvisionError::MissingConfig(
                "Access ID is not set. Pass --access-id or set FETCH_ACCESS_ID.".to_string(),
            ));
        }
        if SECRET_PATH_SENTINELS.contains(&self.secret_path.trim()) {
            return Err(ProvisionError::MissingConfig(
                "Secret path is not set. Pass --secret or set FETCH_SECRET_PATH.".to_string(),
            ));
        }
        Ok(())
    }

    fn diagnostic_log(&self) -> DiagnosticLog {
        let mut log = DiagnosticLog::in_dir(&self.diagnostic_dir);
        log.field("Access ID", &self.access_id);
        log.field("Secret Path", &self.secret_path);
        log.field("URL", &self.base_url);
        log.field("Client Version", SCRIPT_VERSION);
        if self.auth == FetchAuth::Uid {
            log.field("Token File Path", self.token_file.display());
        }
        log
    }
}

/// Step that failed, used as the report headline.
struct Failure {
    message: String,
    error: ProvisionError,
}

fn step<T>(result: Result<T>, message: impl FnOnce() -> String) -> std::result::Result<T, Failure> {
    result.map_err(|error| Failure {
        message: message(),
        error,
    })
}

/// Fetch the secret's value. Failures are written to a diagnostic report
/// and then returned.
pub async fn fetch_secret(
    options: &FetchOptions,
    prompter: &mut Prompter,
) -> Result<serde_json::Value> {
    options.validate()?;

    match run(options, prompter).await {
        Ok(value) => Ok(value),
        Err(Failure { message, error }) => {
            let log = options.diagnostic_log();
            if let Err(e) = log.write(&message, &error) {
                crate::warn!("Could not write diagnostic log {}: {e}", log.path().display());
            }
            Err(error)
        }
    }
}

async fn run(
    options: &FetchOptions,
    prompter: &mut Prompter,
) -> std::result::Result<serde_json::Value, Failure> {
    let api = step(SecretsApi::new(&options.base_url), || {
        format!("Invalid secrets service URL {}", options.base_url)
    })?;
    let auth_failed = || {
        format!(
            "Error during auth to the secrets service while trying to connect to {}",
            api.base_url()
        )
    };

    let token_file = TokenFile::new(&options.token_file);
    let mut uid_token: Option<Zeroizing<String>> = None;

    let request = match options.auth {
        FetchAuth::ApiKey => {
            let access_key = step(
                options.access_key.clone().ok_or_else(|| {
                    ProvisionError::MissingConfig(
                        "Access key is not set. Pass --access-key or set FETCH_ACCESS_KEY."
                            .to_string(),
                    )
                }),
                auth_failed,
            )?;
            AuthRequest::api_key(&options.access_id, &access_key)
        }
        FetchAuth::Uid => {
            let token = Zeroizing::new(step(
                token_file.read_or_prompt(prompter, &options.access_id),
                || format!("Could not read UID token from {}", token_file.path().display()),
            )?);
            let request = AuthRequest::universal_identity(&options.access_id, &token);
            uid_token = Some(token);
            request
        }
        FetchAuth::AwsIam => {
            let credentials = step(load_credentials().await, auth_failed)?;
            let cloud_id = step(aws_cloud_id(&credentials, chrono::Utc::now()), auth_failed)?;
            AuthRequest::aws_iam(&options.access_id, &cloud_id)
        }
    };

    let auth_token = Zeroizing::new(step(api.auth(&request).await, auth_failed)?.token);
    tracing::debug!(access_id = %options.access_id, "authenticated");

    let body = RotatedSecretGetValue {
        names: &options.secret_path,
        token: auth_token.as_str(),
    };
    let value = step(api.rotated_secret_get_value(&body).await, || {
        "Error during pulling rotated secret data from the secrets service".to_string()
    })?;

    if options.rotate_uid_token
        && let Some(current) = &uid_token
    {
        step(token_file.rotate(&api, current).await, || {
            "Error during UID token rotation".to_string()
        })?;
        crate::success!("UID token rotated and saved to {}", token_file.path().display());
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_rejected() {
        let mut options = FetchOptions::new("https://api.example.com", "p-...", "/cvs/a", FetchAuth::Uid);
        assert!(matches!(
            options.validate(),
            Err(ProvisionError::MissingConfig(_))
        ));

        options.access_id = "p-abc".to_string();
        options.secret_path = "/cvs/...".to_string();
        assert!(options.validate().is_err());

        options.secret_path = "/cvs/iam/asm-1/secrets/azure/s".to_string();
        assert!(options.validate().is_ok());
    }

    #[tokio::test]
    async fn missing_access_key_writes_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let mut options =
            FetchOptions::new("https://api.example.com", "p-abc", "/cvs/a", FetchAuth::ApiKey);
        options.diagnostic_dir = dir.path().join("diag");

        let mut prompter = Prompter::scripted("");
        let err = fetch_secret(&options, &mut prompter).await.unwrap_err();
        assert!(matches!(err, ProvisionError::MissingConfig(_)));

        let reports: Vec<_> = std::fs::read_dir(&options.diagnostic_dir)
            .unwrap()
            .collect();
        assert_eq!(reports.len(), 1);
    }
}
