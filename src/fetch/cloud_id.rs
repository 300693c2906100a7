//! AWS cloud id for `aws_iam` authentication
//!
//! The cloud id is a pre-signed `sts:GetCallerIdentity` request. The secrets
//! service replays it against STS to learn the caller's identity, so the
//! AWS secret key never leaves this process.

use crate::error::{ProvisionError, Result};
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_credential_types::provider::ProvideCredentials;
use aws_sigv4::http_request::{
    SignableBody, SignableRequest, SigningParams, SigningSettings, sign,
};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::SystemTime;

pub const STS_URL: &str = "https://sts.amazonaws.com/";
pub const STS_HOST: &str = "sts.amazonaws.com";
pub const STS_BODY: &str = "Action=GetCallerIdentity&Version=2011-06-15";
const STS_REGION: &str = "us-east-1";
const STS_SERVICE: &str = "sts";
const CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Resolve credentials through the AWS default provider chain: environment,
/// shared config and credentials files, web identity, then container and
/// instance metadata.
pub async fn load_credentials() -> Result<Credentials> {
    let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let provider = sdk_config.credentials_provider().ok_or_else(|| {
        ProvisionError::MissingConfig(
            "No AWS credentials provider is available for aws-iam authentication".to_string(),
        )
    })?;

    provider.provide_credentials().await.map_err(|e| {
        ProvisionError::MissingConfig(format!(
            "AWS credentials could not be resolved for aws-iam authentication: {e}"
        ))
    })
}

#[derive(Serialize)]
struct CloudIdPayload {
    sts_request_method: &'static str,
    sts_request_url: String,
    sts_request_body: String,
    sts_request_headers: String,
}

fn signing_error(e: impl Display) -> ProvisionError {
    ProvisionError::InvalidInput(format!("Could not sign the STS request: {e}"))
}

/// `x-amz-date` -> `X-Amz-Date`
fn header_case(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Headers of the signed STS request, including `Authorization`.
pub fn signed_sts_headers(
    credentials: &Credentials,
    now: DateTime<Utc>,
) -> Result<BTreeMap<String, String>> {
    let identity: Identity = credentials.clone().into();
    let params: SigningParams<'_> = v4::SigningParams::builder()
        .identity(&identity)
        .region(STS_REGION)
        .name(STS_SERVICE)
        .time(SystemTime::from(now))
        .settings(SigningSettings::default())
        .build()
        .map_err(signing_error)?
        .into();

    let request = SignableRequest::new(
        "POST",
        STS_URL,
        [("content-type", CONTENT_TYPE), ("host", STS_HOST)].into_iter(),
        SignableBody::Bytes(STS_BODY.as_bytes()),
    )
    .map_err(signing_error)?;
    let (instructions, _signature) = sign(request, &params).map_err(signing_error)?.into_parts();

    let mut headers = BTreeMap::from([("Content-Type".to_string(), CONTENT_TYPE.to_string())]);
    for (name, value) in instructions.headers() {
        headers.insert(header_case(name), value.to_string());
    }
    Ok(headers)
}

/// Base64 JSON envelope of the signed request, as the `cloud-id` auth field.
pub fn aws_cloud_id(credentials: &Credentials, now: DateTime<Utc>) -> Result<String> {
    let headers: BTreeMap<String, Vec<String>> = signed_sts_headers(credentials, now)?
        .into_iter()
        .map(|(name, value)| (name, vec![value]))
        .collect();

    let payload = CloudIdPayload {
        sts_request_method: "POST",
        sts_request_url: STANDARD.encode(STS_URL),
        sts_request_body: STANDARD.encode(STS_BODY),
        sts_request_headers: STANDARD.encode(serde_json::to_vec(&headers)?),
    };
    Ok(STANDARD.encode(serde_json::to_vec(&payload)?))
}
