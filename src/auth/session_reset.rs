//! Ending the identity provider's browser session on sign-out

use super::{AuthoritySession, SessionReset};
use anyhow::{Context, Result};
use async_trait::async_trait;

/// Opens the authority's logout endpoint in the system browser so the next
/// interactive sign-in does not silently reuse the provider's session cookie.
#[derive(Debug, Default, Clone)]
pub struct BrowserLogout {
    /// Where the provider sends the browser after logging out
    pub post_logout_redirect_uri: Option<String>,
}

impl BrowserLogout {
    pub fn new(post_logout_redirect_uri: Option<String>) -> Self {
        Self {
            post_logout_redirect_uri,
        }
    }

    /// Logout URL for the session's authority
    pub fn logout_url(&self, session: &AuthoritySession) -> String {
        match &self.post_logout_redirect_uri {
            Some(uri) => format!(
                "{}?post_logout_redirect_uri={}",
                session.logout_endpoint(),
                urlencoding::encode(uri)
            ),
            None => session.logout_endpoint(),
        }
    }
}

#[async_trait]
impl SessionReset for BrowserLogout {
    async fn end_session(&self, session: &AuthoritySession) -> Result<()> {
        let url = self.logout_url(session);
        tracing::debug!("Ending browser session via {}", url);
        open::that(&url).with_context(|| format!("Failed to open browser at {}", url))
    }
}

/// Session reset for environments without an interactive browser session
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSessionReset;

#[async_trait]
impl SessionReset for NoopSessionReset {
    async fn end_session(&self, _session: &AuthoritySession) -> Result<()> {
        Ok(())
    }
}
