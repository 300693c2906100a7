//! Environment smoke test
//!
//! For each API URL of an environment: authenticate, create a static and a
//! rotated test secret, read both back, then delete both. Every step is
//! timed. Conflicts on create are ignored so a previous interrupted run does
//! not fail the next one.

use crate::api::SecretsApi;
use crate::api::models::{
    CreateRotatedSecret, CreateSecret, DeleteItem, GetSecretValue, RotatedSecretGetValue,
};
use crate::config::{Credentials, Environment, authenticate, optional_var, required_var};
use crate::error::Result;
use crate::prompts::split_list;
use crate::provision::secret::ROTATION_INTERVAL_DAYS;
use std::fmt;
use std::time::{Duration, Instant};

/// Azure application the rotated test secret is bound to.
pub const SMOKE_APPLICATION_ID: &str = "d5d7953c-1209-4790-8be7-8185bbb3e795";

const STATIC_TEST_VALUE: &str = "test secret";

#[derive(Debug)]
pub struct SmokeSettings {
    pub environment: Environment,
    pub base_urls: Vec<String>,
    pub credentials: Credentials,
    pub static_secret: String,
    pub rotated_secret: String,
    pub rotation_target: String,
}

impl SmokeSettings {
    /// Read `{ENV}_API_ACCESS_ID`, `{ENV}_API_ACCESS_KEY`, `TEST_STATIC_SECRET`
    /// and `TEST_ROTATED_SECRET`. URLs come from `base_urls` when non-empty,
    /// else from `{ENV}_BASE_URL_LIST`.
    pub fn from_env(environment: Environment, base_urls: Vec<String>) -> Result<Self> {
        let base_urls = if base_urls.is_empty() {
            split_list(&required_var(&environment.var("BASE_URL_LIST"))?)
        } else {
            base_urls
        };

        Ok(Self {
            environment,
            base_urls,
            credentials: Credentials {
                access_id: required_var(&environment.var("API_ACCESS_ID"))?,
                access_key: required_var(&environment.var("API_ACCESS_KEY"))?,
            },
            static_secret: required_var("TEST_STATIC_SECRET")?,
            rotated_secret: required_var("TEST_ROTATED_SECRET")?,
            rotation_target: optional_var(&environment.var("ROTATION_TARGET"))
                .unwrap_or_else(|| environment.default_rotation_target().to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmokeStep {
    Authenticate,
    CreateStatic,
    CreateRotated,
    GetStatic,
    GetRotated,
    DeleteStatic,
    DeleteRotated,
}

impl fmt::Display for SmokeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Authenticate => "Authenticating",
            Self::CreateStatic => "Creating static secret",
            Self::CreateRotated => "Creating rotated secret",
            Self::GetStatic => "Retrieving static secret",
            Self::GetRotated => "Retrieving rotated secret",
            Self::DeleteStatic => "Deleting static secret",
            Self::DeleteRotated => "Deleting rotated secret",
        })
    }
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub url: String,
    pub step: SmokeStep,
    pub elapsed: Duration,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SmokeReport {
    pub steps: Vec<StepResult>,
}

impl SmokeReport {
    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| s.error.is_some())
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures().next().is_none()
    }

    fn record<T>(
        &mut self,
        url: &str,
        step: SmokeStep,
        started: Instant,
        result: Result<T>,
    ) -> Option<T> {
        let elapsed = started.elapsed();
        let is_create = matches!(step, SmokeStep::CreateStatic | SmokeStep::CreateRotated);
        let (value, error) = match result {
            Ok(value) => (Some(value), None),
            Err(e) if is_create && e.is_conflict() => (None, None),
            Err(e) => (None, Some(e.to_string())),
        };

        let secs = elapsed.as_secs_f64();
        match &error {
            None => println!("{step}... Completed in {secs:.4} seconds"),
            Some(e) => crate::error!("{step}... failed after {secs:.4} seconds: {e}"),
        }
        self.steps.push(StepResult {
            url: url.to_string(),
            step,
            elapsed,
            error,
        });
        value
    }
}

async fn check_url(settings: &SmokeSettings, url: &str, report: &mut SmokeReport) {
    let started = Instant::now();
    let api = match SecretsApi::new(url) {
        Ok(api) => api,
        Err(e) => {
            report.record::<()>(url, SmokeStep::Authenticate, started, Err(e));
            return;
        }
    };

    crate::success!("Authenticating to the secrets service @ {url}");
    let started = Instant::now();
    let Some(token) = report.record(
        url,
        SmokeStep::Authenticate,
        started,
        authenticate(&api, &settings.credentials).await,
    ) else {
        return;
    };

    let started = Instant::now();
    let body = CreateSecret {
        name: settings.static_secret.clone(),
        value: STATIC_TEST_VALUE.to_string(),
        description: "test secret made by the environment check".to_string(),
        token: token.clone(),
    };
    let result = api.create_secret(&body).await;
    report.record(url, SmokeStep::CreateStatic, started, result);

    let started = Instant::now();
    let body = CreateRotatedSecret {
        name: settings.rotated_secret.clone(),
        target_name: settings.rotation_target.clone(),
        description: "test secret made by the environment check".to_string(),
        authentication_credentials: "use-target-creds".to_string(),
        rotator_type: "api-key".to_string(),
        application_id: SMOKE_APPLICATION_ID.to_string(),
        rotation_interval: ROTATION_INTERVAL_DAYS.to_string(),
        auto_rotate: "true".to_string(),
        rotate_after_disconnect: "true".to_string(),
        tags: vec!["Environment Testing".to_string()],
        token: token.clone(),
    };
    let result = api.create_rotated_secret(&body).await;
    report.record(url, SmokeStep::CreateRotated, started, result);

    let started = Instant::now();
    let body = GetSecretValue {
        names: vec![settings.static_secret.clone()],
        token: token.clone(),
    };
    let result = api.get_secret_value(&body).await;
    report.record(url, SmokeStep::GetStatic, started, result);

    let started = Instant::now();
    let body = RotatedSecretGetValue {
        names: &settings.rotated_secret,
        token: &token,
    };
    let result = api.rotated_secret_get_value(&body).await;
    report.record(url, SmokeStep::GetRotated, started, result);

    for (step, name) in [
        (SmokeStep::DeleteStatic, &settings.static_secret),
        (SmokeStep::DeleteRotated, &settings.rotated_secret),
    ] {
        let started = Instant::now();
        let body = DeleteItem {
            name: name.clone(),
            token: token.clone(),
        };
        let result = api.delete_item(&body).await;
        report.record(url, step, started, result);
    }
}

/// Run every step against every URL and collect the results.
pub async fn run_env_check(settings: &SmokeSettings) -> SmokeReport {
    println!("Running tests against {}", settings.environment);
    let run_started = Instant::now();

    let mut report = SmokeReport::default();
    for url in &settings.base_urls {
        check_url(settings, url, &mut report).await;
    }

    if report.passed() {
        crate::success!("All URLs passed");
    }
    println!("Completed in {:.4} seconds", run_started.elapsed().as_secs_f64());
    report
}
