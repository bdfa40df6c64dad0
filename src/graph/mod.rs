//! Bearer-authenticated calls to the directory API
//!
//! Responses are JSON documents. A successful status does not mean success:
//! the directory reports application errors in an envelope inside a 200 body,
//! which is surfaced as [`ApiCallError::Api`].

mod error;

pub use error::ApiCallError;

use crate::auth::Credential;
use crate::config::GraphConfig;
use anyhow::{Context, Result};
use serde_json::Value;

/// Fields that carry an error envelope (AAD Graph, Microsoft Graph)
const ERROR_ENVELOPE_FIELDS: &[&str] = &["odata.error", "error"];

/// Field holding the payload of a successful response
const PAYLOAD_FIELD: &str = "value";

/// Client for authenticated directory requests
pub struct GraphClient {
    http_client: reqwest::Client,
    endpoint: String,
    tenant: String,
    api_version: String,
}

impl GraphClient {
    /// Create a client from configuration
    pub fn from_config(config: &GraphConfig, tenant: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_client(
            http_client,
            &config.endpoint,
            tenant,
            &config.api_version,
        ))
    }

    pub fn with_client(
        http_client: reqwest::Client,
        endpoint: &str,
        tenant: &str,
        api_version: &str,
    ) -> Self {
        Self {
            http_client,
            endpoint: endpoint.to_string(),
            tenant: tenant.to_string(),
            api_version: api_version.to_string(),
        }
    }

    /// URL of the signed-in user's directory entry
    pub fn me_url(&self) -> String {
        let endpoint = if self.endpoint.ends_with('/') {
            self.endpoint.clone()
        } else {
            format!("{}/", self.endpoint)
        };
        format!("{}{}/v{}/me/", endpoint, self.tenant, self.api_version)
    }

    /// Look up the signed-in user
    pub async fn me(&self, credential: &Credential) -> Result<Value, ApiCallError> {
        let url = self.me_url();
        self.call(credential, &url).await
    }

    /// GET `endpoint` with the credential as a bearer token
    pub async fn call(
        &self,
        credential: &Credential,
        endpoint: &str,
    ) -> Result<Value, ApiCallError> {
        tracing::debug!("GET {} as {}", endpoint, credential.account_id);

        let response = self
            .http_client
            .get(endpoint)
            .bearer_auth(&credential.access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(ApiCallError::from_network_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("{} returned {}", endpoint, status);
            return Err(ApiCallError::from_status(status));
        }

        let body = response
            .text()
            .await
            .map_err(ApiCallError::from_network_error)?;

        decode_response(&body)
    }
}

/// Decode a successful response body into its payload
///
/// Returns the `value` field when present and the whole document otherwise.
pub fn decode_response(body: &str) -> Result<Value, ApiCallError> {
    let document: Value =
        serde_json::from_str(body).map_err(|e| ApiCallError::Decode(e.to_string()))?;

    for field in ERROR_ENVELOPE_FIELDS {
        if let Some(envelope) = document.get(*field) {
            return Err(parse_error_envelope(envelope)?);
        }
    }

    match document {
        Value::Object(mut map) => Ok(map
            .remove(PAYLOAD_FIELD)
            .unwrap_or(Value::Object(map))),
        other => Ok(other),
    }
}

/// Extract code and message from an error envelope
///
/// `message` is either a plain string or `{ "lang": .., "value": .. }`.
/// An envelope missing either part cannot be reported faithfully and is a
/// decode error.
fn parse_error_envelope(envelope: &Value) -> Result<ApiCallError, ApiCallError> {
    let code = envelope.get("code").and_then(Value::as_str);
    let message = envelope.get("message").and_then(|m| match m {
        Value::String(s) => Some(s.as_str()),
        other => other.get("value").and_then(Value::as_str),
    });

    match (code, message) {
        (Some(code), Some(message)) => Ok(ApiCallError::Api {
            code: code.to_string(),
            message: message.to_string(),
        }),
        _ => Err(ApiCallError::Decode(format!(
            "Incomplete error envelope: {}",
            envelope
        ))),
    }
}
