//! Auth method provisioning, one builder per identity provider
//!
//! When an [`AppInfo`] is available the method path is derived from it;
//! otherwise the operator is asked for an absolute path.

use super::{Provisioned, role};
use crate::api::models::{
    AuthMethodCreateApiKey, AuthMethodCreateAwsIam, AuthMethodCreateGcp, CreateAuthMethodAzureAd,
    CreateAuthMethodOutput, CreateAuthMethodUniversalIdentity, GatewayCreateK8sAuthConfig,
    UidGenerateToken,
};
use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::naming::AppInfo;
use crate::prompts::Prompter;
use crate::provision::secret::expand_path;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Lifetime in minutes of UID tokens issued for new methods.
pub const UID_TOKEN_TTL_MINUTES: u32 = 4320;

pub const CERT_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
pub const CERT_END: &str = "-----END CERTIFICATE-----";

/// Prefix of a base64url-encoded JWT.
const JWT_PREFIX: &str = "ey";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuthMethodKind {
    AzureAd,
    Gcp,
    Aws,
    Kubernetes,
    Uid,
    ApiKey,
    Oidc,
}

impl AuthMethodKind {
    pub const ALL: [Self; 7] = [
        Self::AzureAd,
        Self::Gcp,
        Self::Aws,
        Self::Kubernetes,
        Self::Uid,
        Self::ApiKey,
        Self::Oidc,
    ];

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::AzureAd => "Azure-AD",
            Self::Gcp => "GCP",
            Self::Aws => "AWS",
            Self::Kubernetes => "K8s",
            Self::Uid => "UID",
            Self::ApiKey => "API-Key",
            Self::Oidc => "OIDC",
        }
    }

    /// Segment used in derived auth method paths.
    #[must_use]
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::AzureAd => "azure-ad",
            Self::Gcp => "gcp",
            Self::Aws => "aws",
            Self::Kubernetes => "k8s",
            Self::Uid => "uid",
            Self::ApiKey => "api-key",
            Self::Oidc => "oidc",
        }
    }
}

impl fmt::Display for AuthMethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the run knows about one auth method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthMethodRecord {
    pub kind: AuthMethodKind,
    pub path: String,
    pub access_id: Option<String>,
    pub access_key: Option<String>,
    pub uid_token: Option<String>,
    pub sub_claims: Option<BTreeMap<String, String>>,
}

impl AuthMethodRecord {
    #[must_use]
    pub fn new(kind: AuthMethodKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            access_id: None,
            access_key: None,
            uid_token: None,
            sub_claims: None,
        }
    }

    fn with_output(mut self, output: CreateAuthMethodOutput) -> Self {
        self.access_id = output.access_id;
        self.access_key = output.access_key;
        self
    }
}

fn resolve_path(
    kind: AuthMethodKind,
    app: Option<&AppInfo>,
    prompter: &mut Prompter,
) -> Result<String> {
    match app {
        Some(app) => Ok(app.auth_method_path(kind.path_segment())),
        None => prompter.text("Auth method absolute path: "),
    }
}

fn finish(
    config: &ProvisionConfig,
    kind: AuthMethodKind,
    path: String,
    result: Result<CreateAuthMethodOutput>,
) -> Provisioned<AuthMethodRecord> {
    let context = format!("Auth Path: {path}");
    let record = AuthMethodRecord::new(kind, path);
    let outcome = Provisioned::classify(
        result.map(|output| record.clone().with_output(output)),
        || record.clone(),
        &config.error_log,
        &context,
    );
    report(&outcome);
    outcome
}

fn report(outcome: &Provisioned<AuthMethodRecord>) {
    match outcome {
        Provisioned::Created(record) => {
            crate::success!("Created {} auth method {}", record.kind, record.path);
            if let Some(access_id) = &record.access_id {
                println!("Access ID: {access_id}");
            }
        }
        Provisioned::AlreadyExists(record) => {
            crate::warn!("The auth method {} already exists", record.path);
        }
        Provisioned::Failed(_) => {}
    }
}

/// Azure AD method; at least one limitation is required.
pub async fn create_azure_ad(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
    app: Option<&AppInfo>,
) -> Result<Provisioned<AuthMethodRecord>> {
    let kind = AuthMethodKind::AzureAd;
    let Some(tenant_id) = config.tenant_id.clone() else {
        let reason = "TENANT_ID is not set; it is required for Azure AD auth methods".to_string();
        crate::error!("{reason}");
        return Ok(Provisioned::Failed(reason));
    };
    let path = resolve_path(kind, app, prompter)?;

    const RESOURCE_TYPES: [&str; 2] = ["VirtualMachines", "UserManagedIdentity"];
    let mut bound_resource_types = Vec::new();
    let mut bound_resource_names = Vec::new();
    let mut bound_sub_id = Vec::new();
    let mut bound_spid = Vec::new();

    while bound_resource_names.is_empty() && bound_sub_id.is_empty() && bound_spid.is_empty() {
        if prompter.at_end()? {
            return Err(ProvisionError::Cancelled);
        }
        prompter.say("At least one limitation is required to proceed.")?;

        bound_resource_types = prompter
            .choose_many(
                &RESOURCE_TYPES,
                "Select resource type limitation(s) (comma separated):",
            )?
            .into_iter()
            .map(|t| (*t).to_string())
            .collect();

        for resource_type in &bound_resource_types {
            let prompt = match resource_type.as_str() {
                "VirtualMachines" => "Input Virtual Machine names (comma separated):",
                _ => "Input User Managed Identity names (comma separated):",
            };
            bound_resource_names.extend(prompter.optional_list(prompt)?);
        }

        bound_sub_id = prompter.optional_list("Input Subscription IDs (comma separated):")?;
        bound_spid = prompter.optional_list("Input Object (principal) IDs (comma separated):")?;
    }

    let body = CreateAuthMethodAzureAd {
        name: path.clone(),
        description: config.default_description.clone(),
        bound_tenant_id: tenant_id,
        bound_resource_types,
        bound_resource_names,
        bound_sub_id,
        bound_spid,
        token: config.auth_token.clone(),
    };
    let result = config.api.create_auth_method_azure_ad(&body).await;
    Ok(finish(config, kind, path, result))
}

pub async fn create_gcp(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
    app: Option<&AppInfo>,
) -> Result<Provisioned<AuthMethodRecord>> {
    let kind = AuthMethodKind::Gcp;
    let path = resolve_path(kind, app, prompter)?;

    let bound_projects =
        prompter.list("Input the Google Project Names to allow access to (comma separated):")?;
    let gcp_type = prompter
        .choose_one(&["IAM", "GCE"], "Select the GCP auth type:")?
        .to_lowercase();

    let body = AuthMethodCreateGcp {
        name: path.clone(),
        description: config.default_description.clone(),
        bound_projects,
        gcp_type,
        audience: config.gcp_audience.clone(),
        token: config.auth_token.clone(),
    };
    let result = config.api.auth_method_create_gcp(&body).await;
    Ok(finish(config, kind, path, result))
}

pub async fn create_aws(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
    app: Option<&AppInfo>,
) -> Result<Provisioned<AuthMethodRecord>> {
    let kind = AuthMethodKind::Aws;
    let path = resolve_path(kind, app, prompter)?;

    let bound_aws_account_id =
        prompter.list("Input the AWS Account ID(s) to allow access to (comma separated):")?;

    let body = AuthMethodCreateAwsIam {
        name: path.clone(),
        description: config.default_description.clone(),
        bound_aws_account_id,
        token: config.auth_token.clone(),
    };
    let result = config.api.auth_method_create_aws_iam(&body).await;
    Ok(finish(config, kind, path, result))
}

/// Kubernetes cluster API flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterApiType {
    NativeK8s,
    Rancher,
}

impl ClusterApiType {
    pub const ALL: [Self; 2] = [Self::NativeK8s, Self::Rancher];

    #[must_use]
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::NativeK8s => "native_k8s",
            Self::Rancher => "rancher",
        }
    }
}

impl fmt::Display for ClusterApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NativeK8s => "Native K8s",
            Self::Rancher => "Rancher",
        })
    }
}

/// Loose PEM check: begin and end markers after trimming.
#[must_use]
pub fn is_pem_certificate(content: &str) -> bool {
    let content = content.trim();
    content.starts_with(CERT_BEGIN) && content.ends_with(CERT_END)
}

#[must_use]
pub fn is_service_account_token(token: &str) -> bool {
    token.trim().starts_with(JWT_PREFIX)
}

/// Read the cluster CA certificate, trying the configured file once and then
/// asking until a readable certificate is given.
fn read_ca_cert(config: &ProvisionConfig, prompter: &mut Prompter) -> Result<String> {
    let mut candidate: Option<PathBuf> = config.default_k8s_cert_file.clone();
    loop {
        let path = match candidate.take() {
            Some(path) => path,
            None => PathBuf::from(expand_path(
                &prompter.text("Input K8s cluster ca certificate file location: ")?,
            )?),
        };

        match std::fs::read_to_string(&path) {
            Ok(content) if is_pem_certificate(&content) => return Ok(content.trim().to_string()),
            Ok(_) => prompter.say(&format!(
                "Invalid value. It should start with \"{CERT_BEGIN}\" and end with \"{CERT_END}\". \
                 It could be an encoded certificate."
            ))?,
            Err(e) => prompter.say(&format!("Could not read {}: {e}", path.display()))?,
        }
    }
}

pub async fn create_k8s(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
    app: Option<&AppInfo>,
) -> Result<Provisioned<AuthMethodRecord>> {
    let kind = AuthMethodKind::Kubernetes;
    let path = resolve_path(kind, app, prompter)?;

    let api_type = *prompter.choose_one(&ClusterApiType::ALL, "Select K8s cluster api type:")?;
    if api_type == ClusterApiType::Rancher {
        let reason = "Rancher clusters are not supported yet".to_string();
        crate::warn!("{reason}");
        return Ok(Provisioned::Failed(reason));
    }

    let k8s_host = prompter.text("Input K8s cluster api endpoint: ")?;
    let k8s_ca_cert = read_ca_cert(config, prompter)?;
    let token_reviewer_jwt = loop {
        let token = prompter.text("Input K8s service account token: ")?;
        if is_service_account_token(&token) {
            break token;
        }
        prompter.say(&format!(
            "Invalid value. It should start with {JWT_PREFIX}. It could be an encoded token."
        ))?;
    };

    let body = GatewayCreateK8sAuthConfig {
        name: path.clone(),
        description: config.default_description.clone(),
        cluster_api_type: api_type.wire_name().to_string(),
        k8s_auth_type: "token".to_string(),
        k8s_host,
        k8s_ca_cert,
        token_reviewer_jwt,
        token: config.auth_token.clone(),
    };
    let result = config.api.gateway_create_k8s_auth_config(&body).await;
    Ok(finish(config, kind, path, result))
}

/// Universal identity method plus its first token.
///
/// If the method is created but token generation fails, the failure is
/// logged and the method is still reported as created, without a token.
pub async fn create_uid(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
    app: Option<&AppInfo>,
) -> Result<Provisioned<AuthMethodRecord>> {
    let kind = AuthMethodKind::Uid;
    let path = resolve_path(kind, app, prompter)?;

    let body = CreateAuthMethodUniversalIdentity {
        name: path.clone(),
        description: config.default_description.clone(),
        ttl: UID_TOKEN_TTL_MINUTES,
        token: config.auth_token.clone(),
    };
    let result = config.api.create_auth_method_universal_identity(&body).await;
    let mut outcome = finish(config, kind, path.clone(), result);

    if let Provisioned::Created(record) = &mut outcome {
        let body = UidGenerateToken {
            auth_method_name: path.clone(),
            token: config.auth_token.clone(),
        };
        match config.api.uid_generate_token(&body).await {
            Ok(output) => {
                println!("UID Token: {}", output.token);
                record.uid_token = Some(output.token);
            }
            Err(e) => config
                .error_log
                .record(&format!("UID token for auth path: {path}"), &e),
        }
    }
    Ok(outcome)
}

pub async fn create_api_key(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
    app: Option<&AppInfo>,
) -> Result<Provisioned<AuthMethodRecord>> {
    let kind = AuthMethodKind::ApiKey;
    let path = resolve_path(kind, app, prompter)?;

    let body = AuthMethodCreateApiKey {
        name: path.clone(),
        description: config.default_description.clone(),
        token: config.auth_token.clone(),
    };
    let result = config.api.auth_method_create_api_key(&body).await;
    Ok(finish(config, kind, path, result))
}

/// Sub-claims granting the listed AD groups.
#[must_use]
pub fn groups_sub_claims(groups: &[String]) -> BTreeMap<String, String> {
    BTreeMap::from([("groups".to_string(), groups.join(","))])
}

/// Grant AD groups through the shared OIDC method. Nothing is created.
///
/// Without app info there is no role coming later in the run, so the
/// operator names one and the association happens right away.
pub async fn attach_oidc(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
    app: Option<&AppInfo>,
) -> Result<Provisioned<AuthMethodRecord>> {
    let groups =
        prompter.list("Type the AD group names to add to the Sub Claims (comma separated): ")?;
    let mut record = AuthMethodRecord::new(AuthMethodKind::Oidc, config.oidc_auth_method.clone());
    record.sub_claims = Some(groups_sub_claims(&groups));

    if app.is_none() {
        let role_path =
            prompter.text("Type the absolute path of the role this will be attached to: ")?;
        let association = role::Association::from(&record);
        role::associate_auth_methods(config, &role_path, &[association]).await;
    }
    Ok(Provisioned::AlreadyExists(record))
}

/// Run one builder.
pub async fn create_auth_method(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
    kind: AuthMethodKind,
    app: Option<&AppInfo>,
) -> Result<Provisioned<AuthMethodRecord>> {
    match kind {
        AuthMethodKind::AzureAd => create_azure_ad(config, prompter, app).await,
        AuthMethodKind::Gcp => create_gcp(config, prompter, app).await,
        AuthMethodKind::Aws => create_aws(config, prompter, app).await,
        AuthMethodKind::Kubernetes => create_k8s(config, prompter, app).await,
        AuthMethodKind::Uid => create_uid(config, prompter, app).await,
        AuthMethodKind::ApiKey => create_api_key(config, prompter, app).await,
        AuthMethodKind::Oidc => attach_oidc(config, prompter, app).await,
    }
}

/// Outcome per selected kind, in selection order.
pub type AuthMethodOutcomes = Vec<(AuthMethodKind, Provisioned<AuthMethodRecord>)>;

/// Ask which kinds are needed and build each once, in the order chosen.
pub async fn choose_auth_methods(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
    app: Option<&AppInfo>,
) -> Result<AuthMethodOutcomes> {
    let selected = prompter.choose_many(
        &AuthMethodKind::ALL,
        "Select a number for the auth method types needed (comma separated):",
    )?;

    let mut kinds: Vec<AuthMethodKind> = Vec::with_capacity(selected.len());
    for kind in selected {
        if !kinds.contains(kind) {
            kinds.push(*kind);
        }
    }

    let mut outcomes = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let outcome = create_auth_method(config, prompter, kind, app).await?;
        outcomes.push((kind, outcome));
    }
    Ok(outcomes)
}
