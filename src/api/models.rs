//! Request and response bodies of the secrets service HTTP API.
//!
//! Field names follow the service's wire format (kebab-case requests,
//! snake_case responses).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthRequest {
    pub access_id: String,
    pub access_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(rename = "uid_token", skip_serializing_if = "Option::is_none")]
    pub uid_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_id: Option<String>,
}

impl AuthRequest {
    #[must_use]
    pub fn api_key(access_id: &str, access_key: &str) -> Self {
        Self {
            access_id: access_id.to_string(),
            access_type: "access_key".to_string(),
            access_key: Some(access_key.to_string()),
            uid_token: None,
            cloud_id: None,
        }
    }

    #[must_use]
    pub fn universal_identity(access_id: &str, uid_token: &str) -> Self {
        Self {
            access_id: access_id.to_string(),
            access_type: "universal_identity".to_string(),
            access_key: None,
            uid_token: Some(uid_token.to_string()),
            cloud_id: None,
        }
    }

    #[must_use]
    pub fn aws_iam(access_id: &str, cloud_id: &str) -> Self {
        Self {
            access_id: access_id.to_string(),
            access_type: "aws_iam".to_string(),
            access_key: None,
            uid_token: None,
            cloud_id: Some(cloud_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthOutput {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateRotatedSecret {
    pub name: String,
    pub target_name: String,
    pub description: String,
    pub authentication_credentials: String,
    pub rotator_type: String,
    pub application_id: String,
    pub rotation_interval: String,
    pub auto_rotate: String,
    pub rotate_after_disconnect: String,
    pub tags: Vec<String>,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateSecret {
    pub name: String,
    pub value: String,
    pub description: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GetSecretValue {
    pub names: Vec<String>,
    pub token: String,
}

/// Borrows the session token so callers holding it in a zeroizing buffer
/// do not need an extra copy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RotatedSecretGetValue<'a> {
    pub names: &'a str,
    pub token: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeleteItem {
    pub name: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateAuthMethodAzureAd {
    pub name: String,
    pub description: String,
    pub bound_tenant_id: String,
    pub bound_resource_types: Vec<String>,
    pub bound_resource_names: Vec<String>,
    pub bound_sub_id: Vec<String>,
    pub bound_spid: Vec<String>,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthMethodCreateGcp {
    pub name: String,
    pub description: String,
    pub bound_projects: Vec<String>,
    #[serde(rename = "type")]
    pub gcp_type: String,
    pub audience: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthMethodCreateAwsIam {
    pub name: String,
    pub description: String,
    pub bound_aws_account_id: Vec<String>,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GatewayCreateK8sAuthConfig {
    pub name: String,
    pub description: String,
    pub cluster_api_type: String,
    pub k8s_auth_type: String,
    pub k8s_host: String,
    pub k8s_ca_cert: String,
    pub token_reviewer_jwt: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateAuthMethodUniversalIdentity {
    pub name: String,
    pub description: String,
    pub ttl: u32,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthMethodCreateApiKey {
    pub name: String,
    pub description: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct UidGenerateToken {
    pub auth_method_name: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct UidRotateToken {
    pub uid_token: String,
}

/// Output of every auth-method creation endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAuthMethodOutput {
    #[serde(default)]
    pub access_id: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenOutput {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateRole {
    pub name: String,
    pub description: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SetRoleRule {
    pub role_name: String,
    pub rule_type: String,
    pub path: String,
    pub capability: Vec<String>,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssocRoleAuthMethod {
    pub role_name: String,
    pub am_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_claims: Option<BTreeMap<String, String>>,
    pub token: String,
}
