//! Session configuration: environment selection, credentials, engineer
//! identity and the defaults stamped onto every provisioned resource.

use crate::api::SecretsApi;
use crate::api::models::AuthRequest;
use crate::error::{ProvisionError, Result};
use crate::error_log::{DEFAULT_ERROR_LOG, ErrorLog};
use crate::prompts::Prompter;
use crate::success;
use serde::Deserialize;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Version stamped into descriptions and tags.
pub const SCRIPT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default environment file.
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Default engineer registry file.
pub const DEFAULT_ENGINEER_REGISTRY: &str = "engineers.toml";

/// Default audience for GCP auth methods.
pub const DEFAULT_GCP_AUDIENCE: &str = "cvs.akeyless.io";

/// Shared OIDC auth method that groups are granted through.
pub const DEFAULT_OIDC_AUTH_METHOD: &str = "/cvs/iam/asm/authmethod/oidc/pingid_sso_uat";

/// Values shipped in example env files that must be replaced before use.
const PLACEHOLDERS: &[&str] = &["p-...", "...", "/cvs/...", "changeme"];

/// Target secrets service environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Uat,
    Prod,
    Dev,
}

impl Environment {
    /// Prefix of the environment's variables, e.g. `UAT_API_ACCESS_ID`.
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Uat => "UAT",
            Self::Prod => "PROD",
            Self::Dev => "DEV",
        }
    }

    /// Environments offered when none is configured. DEV only while testing.
    #[must_use]
    pub fn choices(is_testing: bool) -> Vec<Self> {
        if is_testing {
            vec![Self::Uat, Self::Prod, Self::Dev]
        } else {
            vec![Self::Uat, Self::Prod]
        }
    }

    /// Rotation target used for Azure rotated secrets.
    #[must_use]
    pub fn default_rotation_target(&self) -> &'static str {
        match self {
            Self::Prod => "/cvs/iam/asm/target/azure/ar-enterprise-asm-prod",
            Self::Uat => "/cvs/iam/asm/target/azure/ar-enterprise-asm-uat",
            Self::Dev => "/Azure AD/Azure Target",
        }
    }

    pub(crate) fn var(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.prefix())
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for Environment {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "uat" | "u" => Ok(Self::Uat),
            "prod" | "prd" | "p" => Ok(Self::Prod),
            "dev" | "d" => Ok(Self::Dev),
            other => Err(ProvisionError::InvalidConfig(format!(
                "Unknown environment '{other}'. Possible values: UAT, PROD, DEV"
            ))),
        }
    }
}

/// Operator running the provisioning session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Engineer {
    pub name: String,
    pub team: String,
    pub email: String,
}

impl fmt::Display for Engineer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Immutable table of known engineers, in file order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineerRegistry {
    #[serde(default, rename = "engineer")]
    engineers: Vec<Engineer>,
}

impl EngineerRegistry {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let registry: Self = toml::from_str(content)?;
        if registry.engineers.is_empty() {
            return Err(ProvisionError::InvalidConfig(
                "Engineer registry has no [[engineer]] entries".to_string(),
            ));
        }
        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::MissingConfig(format!(
                "Could not read engineer registry {}: {e}\n   \
                 Set ENGINEER_REGISTRY or copy engineers.example.toml to engineers.toml",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Engineer> {
        self.engineers.iter().find(|e| e.name == name)
    }

    #[must_use]
    pub fn engineers(&self) -> &[Engineer] {
        &self.engineers
    }
}

/// API-key credential for the environment. Cleared from memory on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub access_id: String,
    pub access_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_id", &self.access_id)
            .field("access_key", &"<redacted>")
            .finish()
    }
}

/// Per-environment connection settings read from environment variables.
#[derive(Debug)]
pub struct EnvironmentSettings {
    pub environment: Environment,
    pub base_url: String,
    pub credentials: Credentials,
}

impl EnvironmentSettings {
    /// Read `{ENV}_LOAD_BALANCER_BASE_URL`, `{ENV}_API_ACCESS_ID` and
    /// `{ENV}_API_ACCESS_KEY`.
    pub fn from_env(environment: Environment) -> Result<Self> {
        Ok(Self {
            environment,
            base_url: required_var(&environment.var("LOAD_BALANCER_BASE_URL"))?,
            credentials: Credentials {
                access_id: required_var(&environment.var("API_ACCESS_ID"))?,
                access_key: required_var(&environment.var("API_ACCESS_KEY"))?,
            },
        })
    }
}

/// True for empty values and the placeholders shipped in example files.
#[must_use]
pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    value.is_empty()
        || PLACEHOLDERS.contains(&value)
        || (value.starts_with('<') && value.ends_with('>'))
}

pub(crate) fn required_var(name: &str) -> Result<String> {
    let value = std::env::var(name).unwrap_or_default();
    if is_placeholder(&value) {
        return Err(ProvisionError::MissingConfig(format!(
            "{name} is not set. Update your environment file with a real value."
        )));
    }
    Ok(value.trim().to_string())
}

pub(crate) fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !is_placeholder(v))
}

fn flag_var(name: &str) -> bool {
    optional_var(name)
        .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no"))
        .unwrap_or(false)
}

/// Load `KEY=VALUE` pairs from the environment file. A missing file is fine.
pub fn load_env_file(path: &Path) -> Result<()> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(()),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no environment file");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Pick the environment: explicit choice, then `ENV` when it names one of
/// [`Environment::choices`] exactly, then ask.
pub fn select_environment(
    explicit: Option<Environment>,
    prompter: &mut Prompter,
    is_testing: bool,
) -> Result<Environment> {
    if let Some(environment) = explicit {
        return Ok(environment);
    }
    let choices = Environment::choices(is_testing);
    if let Some(value) = optional_var("ENV") {
        match choices
            .iter()
            .find(|env| value.eq_ignore_ascii_case(env.prefix()))
        {
            Some(environment) => return Ok(*environment),
            None => crate::warn!("ENV={value} is not one of the offered environments"),
        }
    }

    Ok(*prompter.choose_one(&choices, "Select a number for the environment:")?)
}

/// Resolve the engineer from `DEFAULT_ENGINEER` or by asking, persisting an
/// interactive choice back into the environment file.
pub fn choose_engineer(
    registry: &EngineerRegistry,
    env_file: &Path,
    prompter: &mut Prompter,
) -> Result<Engineer> {
    if let Some(name) = optional_var("DEFAULT_ENGINEER") {
        if let Some(engineer) = registry.get(&name) {
            return Ok(engineer.clone());
        }
        crate::warn!("DEFAULT_ENGINEER '{name}' is not in the engineer registry");
    }

    let engineer = prompter
        .choose_one(
            registry.engineers(),
            "Who is loading the secret? Select a number:",
        )?
        .clone();
    persist_default_engineer(env_file, &engineer.name)?;
    Ok(engineer)
}

const DEFAULT_ENGINEER_KEY: &str = "DEFAULT_ENGINEER";

fn is_default_engineer_line(line: &str) -> bool {
    line.trim_start()
        .strip_prefix(DEFAULT_ENGINEER_KEY)
        .is_some_and(|rest| rest.trim_start().starts_with('='))
}

/// Set `DEFAULT_ENGINEER="<name>"` in the environment file.
///
/// An existing entry is rewritten in place and any later duplicates are
/// dropped; otherwise the entry is appended. The file is replaced
/// atomically.
pub fn persist_default_engineer(env_file: &Path, name: &str) -> Result<()> {
    let current = match std::fs::read_to_string(env_file) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    let entry = format!("{DEFAULT_ENGINEER_KEY}=\"{name}\"");

    let mut replaced = false;
    let mut content = String::with_capacity(current.len() + entry.len() + 1);
    for line in current.lines() {
        if is_default_engineer_line(line) {
            if replaced {
                continue;
            }
            replaced = true;
            content.push_str(&entry);
        } else {
            content.push_str(line);
        }
        content.push('\n');
    }
    if !replaced {
        content.push_str(&entry);
        content.push('\n');
    }

    let dir = match env_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(content.as_bytes())?;
    temp_file.flush()?;
    temp_file.persist(env_file).map_err(|e| e.error)?;
    Ok(())
}

/// Inputs to [`ProvisionConfig::bootstrap`].
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub env_file: PathBuf,
    pub environment: Option<Environment>,
    pub is_testing: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            env_file: PathBuf::from(DEFAULT_ENV_FILE),
            environment: None,
            is_testing: false,
        }
    }
}

/// Authenticated session plus the defaults applied to new resources.
///
/// Built once per run and passed by reference to every workflow.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub environment: Environment,
    pub api: SecretsApi,
    pub auth_token: String,
    pub engineer: Engineer,
    pub version: String,
    pub default_description: String,
    pub default_tags: Vec<String>,
    pub tenant_id: Option<String>,
    pub rotation_target: String,
    pub gcp_audience: String,
    pub oidc_auth_method: String,
    pub default_bulk_file: Option<PathBuf>,
    pub default_k8s_cert_file: Option<PathBuf>,
    pub is_testing: bool,
    pub error_log: ErrorLog,
}

impl ProvisionConfig {
    /// Session with defaults derived from `engineer`; optional settings take
    /// their built-in values.
    #[must_use]
    pub fn new(
        environment: Environment,
        api: SecretsApi,
        auth_token: String,
        engineer: Engineer,
    ) -> Self {
        let version = SCRIPT_VERSION.to_string();
        let default_description =
            format!("Created by {}. Script version: {version}.", engineer.name);
        let default_tags = vec![
            "csp:azure".to_string(),
            "type:service-account".to_string(),
            format!("vaulted-by:automation-script:{version}"),
            format!("support:{}-engineer:{}", engineer.team, engineer.email),
        ];

        Self {
            environment,
            api,
            auth_token,
            engineer,
            version,
            default_description,
            default_tags,
            tenant_id: None,
            rotation_target: environment.default_rotation_target().to_string(),
            gcp_audience: DEFAULT_GCP_AUDIENCE.to_string(),
            oidc_auth_method: DEFAULT_OIDC_AUTH_METHOD.to_string(),
            default_bulk_file: None,
            default_k8s_cert_file: None,
            is_testing: false,
            error_log: ErrorLog::default(),
        }
    }

    /// Load the environment file, pick the environment, authenticate, and
    /// resolve the engineer.
    ///
    /// Authentication failure is written to the error log and returned; the
    /// caller is expected to stop.
    pub async fn bootstrap(
        options: &BootstrapOptions,
        registry: &EngineerRegistry,
        prompter: &mut Prompter,
    ) -> Result<Self> {
        load_env_file(&options.env_file)?;

        let environment = select_environment(options.environment, prompter, options.is_testing)?;
        let settings = EnvironmentSettings::from_env(environment)?;
        let error_log = ErrorLog::new(
            optional_var("ERROR_LOG").unwrap_or_else(|| DEFAULT_ERROR_LOG.to_string()),
        );

        let api = SecretsApi::new(&settings.base_url)?;
        success!("Authenticating to the secrets service ({environment})");
        let auth_token = match authenticate(&api, &settings.credentials).await {
            Ok(token) => token,
            Err(e) => {
                error_log.record(
                    &format!(
                        "Authentication to {} failed for access id {}",
                        settings.base_url, settings.credentials.access_id
                    ),
                    &e,
                );
                return Err(e);
            }
        };

        if flag_var("DEBUG") {
            tracing::debug!(token = %auth_token, "session token");
        }

        let engineer = choose_engineer(registry, &options.env_file, prompter)?;

        let mut config = Self::new(environment, api, auth_token, engineer);
        config.is_testing = options.is_testing;
        config.error_log = error_log;
        config.tenant_id = optional_var("TENANT_ID");
        config.default_bulk_file = optional_var("DEFAULT_LOCATION_BULK_FILE").map(PathBuf::from);
        config.default_k8s_cert_file =
            optional_var("DEFAULT_LOCATION_K8s_CERT_FILE").map(PathBuf::from);
        if let Some(target) = optional_var(&environment.var("ROTATION_TARGET")) {
            config.rotation_target = target;
        }
        if let Some(audience) = optional_var("GCP_AUDIENCE") {
            config.gcp_audience = audience;
        }
        if let Some(oidc) = optional_var("OIDC_AUTH_METHOD_PATH") {
            config.oidc_auth_method = oidc;
        }

        Ok(config)
    }
}

/// Exchange an API-key credential for a session token.
pub async fn authenticate(api: &SecretsApi, credentials: &Credentials) -> Result<String> {
    let body = AuthRequest::api_key(&credentials.access_id, &credentials.access_key);
    Ok(api.auth(&body).await?.token)
}
