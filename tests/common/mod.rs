//! Collaborator doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use graph_signin::{AuthError, Authority, AuthoritySession, Credential, SessionReset};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn session() -> AuthoritySession {
    AuthoritySession::new(
        "https://login.microsoftonline.com/contoso.com",
        "client-123",
        "http://localhost:8400/callback",
    )
}

pub fn credential(account: &str, resource: &str, token: &str, ttl: Duration) -> Credential {
    Credential {
        access_token: token.to_string(),
        account_id: account.to_string(),
        expires_at: Utc::now() + ttl,
        resource_id: resource.to_string(),
        refresh_token: Some(format!("rt-{}", token)),
        display_id: None,
    }
}

/// Authority double with scripted results and call counters
#[derive(Default)]
pub struct FakeAuthority {
    pub silent_result: Mutex<Option<Result<Credential, AuthError>>>,
    pub interactive_result: Mutex<Option<Result<Credential, AuthError>>>,
    pub silent_calls: AtomicUsize,
    pub interactive_calls: AtomicUsize,
    pub last_stale: Mutex<Option<Credential>>,
}

impl FakeAuthority {
    pub fn silent(result: Result<Credential, AuthError>) -> Self {
        let fake = Self::default();
        *fake.silent_result.lock().unwrap() = Some(result);
        fake
    }

    pub fn interactive(result: Result<Credential, AuthError>) -> Self {
        let fake = Self::default();
        *fake.interactive_result.lock().unwrap() = Some(result);
        fake
    }

    pub fn calls(&self) -> usize {
        self.silent_calls.load(Ordering::SeqCst) + self.interactive_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authority for FakeAuthority {
    async fn acquire_silent(
        &self,
        _session: &AuthoritySession,
        _resource_id: &str,
        stale: Option<&Credential>,
    ) -> Result<Credential, AuthError> {
        self.silent_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_stale.lock().unwrap() = stale.cloned();
        self.silent_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Err(AuthError::InteractionRequired))
    }

    async fn acquire_interactive(
        &self,
        _session: &AuthoritySession,
        _resource_id: &str,
    ) -> Result<Credential, AuthError> {
        self.interactive_calls.fetch_add(1, Ordering::SeqCst);
        self.interactive_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Err(AuthError::UserCancelled))
    }
}

/// Session reset double that can be told to fail
#[derive(Default)]
pub struct FakeSessionReset {
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl SessionReset for FakeSessionReset {
    async fn end_session(&self, _session: &AuthoritySession) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("browser unavailable");
        }
        Ok(())
    }
}
