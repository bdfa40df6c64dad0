//! graph-signin: interactive OAuth2 sign-in with a token cache
//!
//! This library provides:
//! - Silent vs. interactive token acquisition over a pluggable authority
//! - A credential cache keyed by account and resource (memory or file)
//! - Sign-out that resets both the cache and the browser session
//! - Bearer-authenticated directory calls with error-envelope decoding

pub mod auth;
pub mod config;
pub mod graph;
pub mod session;
pub mod transport;

pub use auth::{
    AcquisitionMode, AcquisitionRequest, AuthError, Authority, AuthoritySession, Credential,
    CredentialStore, SessionReset, TokenAcquirer,
};
pub use config::Config;
pub use graph::{ApiCallError, GraphClient};
pub use session::{SessionState, SignInOutcome, SignInSession};
