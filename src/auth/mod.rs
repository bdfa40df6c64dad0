//! Token acquisition and cache lifecycle
//!
//! This module holds the credential types, the collaborator traits the
//! acquirer talks to, and the concrete OAuth2 implementations of those traits.
//! The wire protocol lives entirely behind [`Authority`]; the acquirer only
//! decides between the cache, a silent refresh and an interactive challenge.

mod acquirer;
mod error;
mod oauth;
mod session_reset;
mod store;

pub use acquirer::TokenAcquirer;
pub use error::AuthError;
pub use oauth::{IdTokenClaims, OAuthAuthority, TokenResponse};
pub use session_reset::{BrowserLogout, NoopSessionReset};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tokens expiring within this window are treated as already expired
const EXPIRY_SKEW_SECS: i64 = 300;

/// Access credential issued by the authority for one account and resource
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token for API calls
    pub access_token: String,
    /// Stable account identifier (object id or subject)
    pub account_id: String,
    /// When the access token stops being valid
    pub expires_at: DateTime<Utc>,
    /// Resource the token was issued for
    pub resource_id: String,
    /// Refresh token for non-interactive renewal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Human-readable user name (UPN or email)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_id: Option<String>,
}

impl Credential {
    /// Check if the token is expired or will expire within 5 minutes
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expiry check against an explicit instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + Duration::seconds(EXPIRY_SKEW_SECS)
    }

    /// Name to show in the UI, falling back to the account id
    pub fn display_name(&self) -> &str {
        self.display_id.as_deref().unwrap_or(&self.account_id)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .field("expires_at", &self.expires_at)
            .field("resource_id", &self.resource_id)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("display_id", &self.display_id)
            .finish()
    }
}

/// Authority configuration for a sign-in attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthoritySession {
    /// Tenant-qualified authority, e.g. `https://login.microsoftonline.com/contoso.com`
    pub authority_url: String,
    pub client_id: String,
    pub redirect_uri: String,
}

impl AuthoritySession {
    pub fn new(
        authority_url: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            authority_url: authority_url.into(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Reject sessions with empty fields
    pub fn validate(&self) -> Result<(), AuthError> {
        for (name, value) in [
            ("authority_url", &self.authority_url),
            ("client_id", &self.client_id),
            ("redirect_uri", &self.redirect_uri),
        ] {
            if value.trim().is_empty() {
                return Err(AuthError::InvalidRequest(format!("{} is empty", name)));
            }
        }
        Ok(())
    }

    /// Authority URL without a trailing slash
    pub fn authority(&self) -> &str {
        self.authority_url.trim_end_matches('/')
    }

    pub fn authorize_endpoint(&self) -> String {
        format!("{}/oauth2/authorize", self.authority())
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/token", self.authority())
    }

    pub fn logout_endpoint(&self) -> String {
        format!("{}/oauth2/logout", self.authority())
    }
}

/// How a credential may be obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionMode {
    /// Cache or non-interactive refresh only
    Silent,
    /// Always prompt the user
    Interactive,
}

/// A single acquisition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionRequest {
    pub resource_id: String,
    pub mode: AcquisitionMode,
    /// Account whose cache entry the silent path should use
    pub account_hint: Option<String>,
}

impl AcquisitionRequest {
    pub fn silent(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            mode: AcquisitionMode::Silent,
            account_hint: None,
        }
    }

    pub fn interactive(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            mode: AcquisitionMode::Interactive,
            account_hint: None,
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_hint = Some(account_id.into());
        self
    }
}

/// Token-issuing authority
///
/// Implement this trait to plug a protocol (authorization code, device flow,
/// a test double) into [`TokenAcquirer`]. Implementations must report
/// failures through the [`AuthError`] taxonomy:
/// - silent: `InteractionRequired` or `Authority`
/// - interactive: `UserCancelled` or `Authority`
#[async_trait]
pub trait Authority: Send + Sync {
    /// Obtain a credential without prompting, using `stale` (the expired cache
    /// entry for the same account and resource) when available
    async fn acquire_silent(
        &self,
        session: &AuthoritySession,
        resource_id: &str,
        stale: Option<&Credential>,
    ) -> Result<Credential, AuthError>;

    /// Run a user-facing challenge
    async fn acquire_interactive(
        &self,
        session: &AuthoritySession,
        resource_id: &str,
    ) -> Result<Credential, AuthError>;
}

/// Ends interactive-challenge session artifacts (browser session state)
#[async_trait]
pub trait SessionReset: Send + Sync {
    async fn end_session(&self, session: &AuthoritySession) -> anyhow::Result<()>;
}
