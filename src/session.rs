//! Per-UI-session sign-in state
//!
//! Front-ends call these operations and render the returned outcome; they never
//! talk to the acquirer or the directory client directly.

use crate::auth::{
    AcquisitionRequest, AuthError, AuthoritySession, BrowserLogout, Credential, CredentialStore,
    FileCredentialStore, MemoryCredentialStore, NoopSessionReset, OAuthAuthority, SessionReset,
    TokenAcquirer,
};
use crate::config::{CacheBackend, CacheConfig, Config};
use crate::graph::{ApiCallError, GraphClient};
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Where the session currently stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    SignedOut,
    SignedIn {
        account_id: String,
        display_id: String,
    },
}

impl SessionState {
    fn signed_in(credential: &Credential) -> Self {
        SessionState::SignedIn {
            account_id: credential.account_id.clone(),
            display_id: credential.display_name().to_string(),
        }
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(self, SessionState::SignedIn { .. })
    }
}

/// Result of an interactive sign-in
#[derive(Debug)]
pub enum SignInOutcome {
    SignedIn {
        credential: Credential,
        /// Directory lookup result, `None` when the lookup is disabled
        directory: Option<Result<Value, ApiCallError>>,
    },
    /// The user backed out; nothing to report
    Cancelled,
}

/// Failure of an operation that needs both a token and an API call
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiCallError),

    #[error("Directory lookup is disabled in configuration")]
    DirectoryDisabled,
}

/// Open the token cache selected by the `[cache]` section
pub fn credential_store(cache: &CacheConfig) -> Result<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match cache.backend {
        CacheBackend::Memory => Arc::new(MemoryCredentialStore::new()),
        CacheBackend::File => match &cache.path {
            Some(path) => Arc::new(FileCredentialStore::open(path)),
            None => Arc::new(FileCredentialStore::open_default()?),
        },
    };
    Ok(store)
}

/// Sign-in state machine: `SignedOut` ⇄ `SignedIn`
pub struct SignInSession {
    acquirer: TokenAcquirer,
    authority_session: AuthoritySession,
    resource_id: String,
    graph: Option<GraphClient>,
    state: SessionState,
}

impl SignInSession {
    pub fn new(
        acquirer: TokenAcquirer,
        authority_session: AuthoritySession,
        resource_id: impl Into<String>,
        graph: Option<GraphClient>,
    ) -> Self {
        Self {
            acquirer,
            authority_session,
            resource_id: resource_id.into(),
            graph,
            state: SessionState::SignedOut,
        }
    }

    /// Wire up the OAuth authority, the configured cache and the directory
    /// client
    pub fn from_config(config: &Config) -> Result<Self> {
        let authority_session = config.authority_session()?;

        let store = credential_store(&config.cache)?;

        let session_reset: Arc<dyn SessionReset> = if config.auth.browser_logout {
            Arc::new(BrowserLogout::default())
        } else {
            Arc::new(NoopSessionReset)
        };

        let authority = Arc::new(OAuthAuthority::new(std::time::Duration::from_secs(
            config.auth.interactive_timeout_secs,
        )));

        let graph = if config.graph.enabled {
            Some(GraphClient::from_config(&config.graph, &config.auth.tenant)?)
        } else {
            None
        };

        Ok(Self::new(
            TokenAcquirer::new(authority, store, session_reset),
            authority_session,
            config.auth.resource_id.clone(),
            graph,
        ))
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Silent request pinned to the signed-in account, if there is one
    fn silent_request(&self) -> AcquisitionRequest {
        let request = AcquisitionRequest::silent(self.resource_id.as_str());
        match &self.state {
            SessionState::SignedIn { account_id, .. } => {
                request.with_account(account_id.as_str())
            }
            SessionState::SignedOut => request,
        }
    }

    /// Try to restore a signed-in state without prompting
    ///
    /// A missing or unrefreshable token is not an error: the session simply
    /// stays signed out.
    pub async fn probe(&mut self) -> Result<&SessionState, AuthError> {
        let request = self.silent_request();
        match self.acquirer.acquire(&self.authority_session, &request).await {
            Ok(credential) => self.state = SessionState::signed_in(&credential),
            Err(AuthError::InteractionRequired) => {
                tracing::debug!("No cached sign-in available");
                self.state = SessionState::SignedOut;
            }
            Err(e) => return Err(e),
        }
        Ok(&self.state)
    }

    /// Prompt the user to sign in, then look them up in the directory if
    /// that is enabled
    ///
    /// A failed lookup is reported in the outcome; the sign-in itself stands.
    pub async fn sign_in(&mut self) -> Result<SignInOutcome, AuthError> {
        let credential = match self
            .acquirer
            .acquire_interactive(&self.authority_session, &self.resource_id)
            .await
        {
            Ok(credential) => credential,
            Err(AuthError::UserCancelled) => {
                tracing::info!("Sign-in cancelled");
                return Ok(SignInOutcome::Cancelled);
            }
            Err(e) => return Err(e),
        };

        self.state = SessionState::signed_in(&credential);

        let directory = match &self.graph {
            Some(graph) => Some(graph.me(&credential).await),
            None => None,
        };

        Ok(SignInOutcome::SignedIn {
            credential,
            directory,
        })
    }

    /// Look up the signed-in user with a silently acquired token
    pub async fn directory_lookup(&mut self) -> Result<Value, SessionError> {
        let graph = self.graph.as_ref().ok_or(SessionError::DirectoryDisabled)?;

        let request = self.silent_request();
        let credential = match self.acquirer.acquire(&self.authority_session, &request).await {
            Ok(credential) => credential,
            Err(e) => {
                if e == AuthError::InteractionRequired {
                    self.state = SessionState::SignedOut;
                }
                return Err(e.into());
            }
        };
        self.state = SessionState::signed_in(&credential);

        Ok(graph.me(&credential).await?)
    }

    /// Reset to signed out; always succeeds
    pub async fn sign_out(&mut self) {
        self.acquirer.sign_out(&self.authority_session).await;
        self.state = SessionState::SignedOut;
    }
}
