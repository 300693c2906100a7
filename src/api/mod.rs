//! HTTP client for the secrets service API
//!
//! Every endpoint is a JSON `POST` to `{base_url}/{operation}`. Each call is a
//! single attempt; conflicts and other failures come back as
//! `ProvisionError::Api` for the caller to classify.

pub mod models;

use crate::error::{ProvisionError, Result};
use models::{
    AssocRoleAuthMethod, AuthMethodCreateApiKey, AuthMethodCreateAwsIam, AuthMethodCreateGcp,
    AuthOutput, AuthRequest, CreateAuthMethodAzureAd, CreateAuthMethodOutput,
    CreateAuthMethodUniversalIdentity, CreateRole, CreateRotatedSecret, CreateSecret, DeleteItem,
    GatewayCreateK8sAuthConfig, GetSecretValue, RotatedSecretGetValue, SetRoleRule, TokenOutput,
    UidGenerateToken, UidRotateToken,
};
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Longest response excerpt kept in error messages.
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Clone)]
pub struct SecretsApi {
    base_url: String,
    http: reqwest::Client,
}

impl SecretsApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ProvisionError::InvalidConfig(format!(
                "Secrets service URL must start with http:// or https:// (got: '{base_url}')"
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            base_url: base_url.to_string(),
            http,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, operation: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{operation}", self.base_url);
        tracing::debug!(%url, "calling secrets service");

        let response = self
            .http
            .post(&url)
            .header("accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProvisionError::Network(format!(
                        "Request to {url} timed out after {} seconds. Check your network connection.",
                        if e.is_connect() {
                            CONNECT_TIMEOUT_SECS
                        } else {
                            REQUEST_TIMEOUT_SECS
                        }
                    ))
                } else if e.is_connect() {
                    ProvisionError::Network(format!(
                        "Could not connect to {}. Check network/firewall settings.",
                        self.base_url
                    ))
                } else {
                    ProvisionError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            ProvisionError::Network(format!("Could not read the response from {url}: {e}"))
        })?;

        if !status.is_success() {
            tracing::debug!(%url, %status, body = %text, "secrets service error");
            return Err(ProvisionError::Api {
                status: status.as_u16(),
                message: error_message(&text, status),
            });
        }

        let text = if text.trim().is_empty() { "null" } else { &text };
        Ok(serde_json::from_str(text)?)
    }

    pub async fn auth(&self, body: &AuthRequest) -> Result<AuthOutput> {
        self.post("auth", body).await
    }

    pub async fn create_rotated_secret(&self, body: &CreateRotatedSecret) -> Result<()> {
        self.post::<_, IgnoredAny>("create-rotated-secret", body).await?;
        Ok(())
    }

    pub async fn rotated_secret_get_value(
        &self,
        body: &RotatedSecretGetValue<'_>,
    ) -> Result<serde_json::Value> {
        self.post("get-rotated-secret-value", body).await
    }

    pub async fn create_secret(&self, body: &CreateSecret) -> Result<()> {
        self.post::<_, IgnoredAny>("create-secret", body).await?;
        Ok(())
    }

    pub async fn get_secret_value(&self, body: &GetSecretValue) -> Result<serde_json::Value> {
        self.post("get-secret-value", body).await
    }

    pub async fn delete_item(&self, body: &DeleteItem) -> Result<()> {
        self.post::<_, IgnoredAny>("delete-item", body).await?;
        Ok(())
    }

    pub async fn create_auth_method_azure_ad(
        &self,
        body: &CreateAuthMethodAzureAd,
    ) -> Result<CreateAuthMethodOutput> {
        self.post("create-auth-method-azure-ad", body).await
    }

    pub async fn auth_method_create_gcp(
        &self,
        body: &AuthMethodCreateGcp,
    ) -> Result<CreateAuthMethodOutput> {
        self.post("auth-method-create-gcp", body).await
    }

    pub async fn auth_method_create_aws_iam(
        &self,
        body: &AuthMethodCreateAwsIam,
    ) -> Result<CreateAuthMethodOutput> {
        self.post("auth-method-create-aws-iam", body).await
    }

    pub async fn gateway_create_k8s_auth_config(
        &self,
        body: &GatewayCreateK8sAuthConfig,
    ) -> Result<CreateAuthMethodOutput> {
        self.post("gateway-create-k8s-auth-config", body).await
    }

    pub async fn create_auth_method_universal_identity(
        &self,
        body: &CreateAuthMethodUniversalIdentity,
    ) -> Result<CreateAuthMethodOutput> {
        self.post("create-auth-method-universal-identity", body).await
    }

    pub async fn auth_method_create_api_key(
        &self,
        body: &AuthMethodCreateApiKey,
    ) -> Result<CreateAuthMethodOutput> {
        self.post("auth-method-create-api-key", body).await
    }

    pub async fn uid_generate_token(&self, body: &UidGenerateToken) -> Result<TokenOutput> {
        self.post("uid-generate-token", body).await
    }

    pub async fn uid_rotate_token(&self, body: &UidRotateToken) -> Result<TokenOutput> {
        self.post("uid-rotate-token", body).await
    }

    pub async fn create_role(&self, body: &CreateRole) -> Result<()> {
        self.post::<_, IgnoredAny>("create-role", body).await?;
        Ok(())
    }

    pub async fn set_role_rule(&self, body: &SetRoleRule) -> Result<()> {
        self.post::<_, IgnoredAny>("set-role-rule", body).await?;
        Ok(())
    }

    pub async fn assoc_role_auth_method(&self, body: &AssocRoleAuthMethod) -> Result<()> {
        self.post::<_, IgnoredAny>("assoc-role-am", body).await?;
        Ok(())
    }
}

/// Pull the service's `error` field out of a failure body, falling back to a
/// truncated copy of the raw text.
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: String,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.error;
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("Request failed: {status}");
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}
