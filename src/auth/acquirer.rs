//! Silent vs. interactive token acquisition

use super::{
    AcquisitionMode, AcquisitionRequest, Authority, AuthError, AuthoritySession, Credential,
    CredentialStore, SessionReset,
};
use chrono::Utc;
use std::sync::Arc;

/// Decides whether a credential can be produced from the cache or a silent
/// refresh, and otherwise drives an interactive challenge.
///
/// The acquirer does not serialize concurrent acquisitions for the same key;
/// callers should not start a second sign-in while one is outstanding.
pub struct TokenAcquirer {
    authority: Arc<dyn Authority>,
    store: Arc<dyn CredentialStore>,
    session_reset: Arc<dyn SessionReset>,
}

impl TokenAcquirer {
    pub fn new(
        authority: Arc<dyn Authority>,
        store: Arc<dyn CredentialStore>,
        session_reset: Arc<dyn SessionReset>,
    ) -> Self {
        Self {
            authority,
            store,
            session_reset,
        }
    }

    /// The credential cache backing this acquirer
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub async fn acquire_silent(
        &self,
        session: &AuthoritySession,
        resource_id: &str,
    ) -> Result<Credential, AuthError> {
        self.acquire(session, &AcquisitionRequest::silent(resource_id))
            .await
    }

    pub async fn acquire_interactive(
        &self,
        session: &AuthoritySession,
        resource_id: &str,
    ) -> Result<Credential, AuthError> {
        self.acquire(session, &AcquisitionRequest::interactive(resource_id))
            .await
    }

    /// Produce a credential for `request.resource_id`
    ///
    /// Silent mode returns a valid cached credential without touching the
    /// authority, and otherwise asks the authority for a non-interactive
    /// refresh. Interactive mode always challenges the user. Every credential
    /// obtained from the authority is cached before it is returned.
    pub async fn acquire(
        &self,
        session: &AuthoritySession,
        request: &AcquisitionRequest,
    ) -> Result<Credential, AuthError> {
        session.validate()?;
        if request.resource_id.trim().is_empty() {
            return Err(AuthError::InvalidRequest("resource_id is empty".to_string()));
        }

        match request.mode {
            AcquisitionMode::Silent => self.silent(session, request).await,
            AcquisitionMode::Interactive => self.interactive(session, request).await,
        }
    }

    async fn silent(
        &self,
        session: &AuthoritySession,
        request: &AcquisitionRequest,
    ) -> Result<Credential, AuthError> {
        let resource_id = request.resource_id.as_str();
        let account = self.cached_account(request);

        if let Some(account_id) = account.as_deref() {
            if let Some(cached) = self.store.get(account_id, resource_id) {
                tracing::debug!("Token cache hit for {} / {}", account_id, resource_id);
                return Ok(cached);
            }
        }

        let stale = account.as_deref().and_then(|account_id| {
            self.store
                .entries()
                .into_iter()
                .find(|c| c.account_id == account_id && c.resource_id == resource_id)
        });

        tracing::debug!(
            "Token cache miss for {}, attempting silent refresh (stale entry: {})",
            resource_id,
            stale.is_some()
        );

        let credential = self
            .authority
            .acquire_silent(session, resource_id, stale.as_ref())
            .await
            .map_err(|e| match e {
                AuthError::InteractionRequired => e,
                other => into_authority_error(other),
            })?;

        self.accept(credential, resource_id)
    }

    async fn interactive(
        &self,
        session: &AuthoritySession,
        request: &AcquisitionRequest,
    ) -> Result<Credential, AuthError> {
        let resource_id = request.resource_id.as_str();
        tracing::info!("Starting interactive sign-in for {}", resource_id);

        let credential = self
            .authority
            .acquire_interactive(session, resource_id)
            .await
            .map_err(|e| match e {
                AuthError::UserCancelled => e,
                other => into_authority_error(other),
            })?;

        self.accept(credential, resource_id)
    }

    /// Account the silent path should look at: the hint, or the only account
    /// holding an entry for the resource
    fn cached_account(&self, request: &AcquisitionRequest) -> Option<String> {
        if let Some(hint) = &request.account_hint {
            return Some(hint.clone());
        }

        let mut accounts: Vec<String> = self
            .store
            .entries()
            .into_iter()
            .filter(|c| c.resource_id == request.resource_id)
            .map(|c| c.account_id)
            .collect();
        accounts.sort();
        accounts.dedup();

        match accounts.len() {
            1 => accounts.pop(),
            0 => None,
            n => {
                tracing::debug!(
                    "{} cached accounts for {}, not picking one silently",
                    n,
                    request.resource_id
                );
                None
            }
        }
    }

    /// Enforce the issued-credential postconditions and cache it
    fn accept(
        &self,
        mut credential: Credential,
        resource_id: &str,
    ) -> Result<Credential, AuthError> {
        if credential.expires_at <= Utc::now() {
            return Err(AuthError::authority(
                "expired_token",
                format!(
                    "Authority issued a token that expired at {}",
                    credential.expires_at
                ),
            ));
        }

        if credential.resource_id != resource_id {
            tracing::warn!(
                "Authority issued a token for {} when {} was requested, caching under the requested resource",
                credential.resource_id,
                resource_id
            );
            credential.resource_id = resource_id.to_string();
        }

        self.store.put(credential.clone());
        tracing::info!(
            "Signed in as {} for {}",
            credential.display_name(),
            resource_id
        );
        Ok(credential)
    }

    /// Clear all cached credentials and end the interactive session
    ///
    /// Never fails: a session-reset error is logged and the local state is
    /// still reset.
    pub async fn sign_out(&self, session: &AuthoritySession) {
        self.store.clear();

        if let Err(e) = self.session_reset.end_session(session).await {
            tracing::warn!("Failed to end interactive session: {:#}", e);
        }

        tracing::info!("Signed out");
    }
}

fn into_authority_error(err: AuthError) -> AuthError {
    match err {
        AuthError::Authority { .. } => err,
        AuthError::InteractionRequired => {
            AuthError::authority("interaction_required", err.to_string())
        }
        AuthError::UserCancelled => AuthError::authority("user_cancelled", err.to_string()),
        AuthError::InvalidRequest(msg) => AuthError::authority("invalid_request", msg),
    }
}
