//! Typed errors for token acquisition
//!
//! Provider failures are normalized into a small taxonomy so callers can tell
//! the expected negative results (`InteractionRequired`, `UserCancelled`)
//! apart from failures that must be reported to the user.

use thiserror::Error;

/// Token endpoint error codes that mean "a prompt is needed"
const INTERACTION_REQUIRED_CODES: &[&str] = &[
    "interaction_required",
    "user_interaction_required",
    "login_required",
    "consent_required",
    "invalid_grant",
];

/// Acquisition errors with typed variants
///
/// - `InteractionRequired` - silent path only; fall back to the signed-out state
/// - `UserCancelled` - interactive path only; the user backed out
/// - `Authority` - anything else the authority reported; show it verbatim
/// - `InvalidRequest` - the caller passed an empty session field or resource
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No usable cached token and the authority needs the user to sign in
    #[error("User interaction required")]
    InteractionRequired,

    /// The user cancelled the sign-in or denied access
    #[error("Sign-in cancelled by user")]
    UserCancelled,

    /// The authority rejected the request
    #[error("{code}: {message}")]
    Authority { code: String, message: String },

    /// Acquisition preconditions were not met
    #[error("Invalid acquisition request: {0}")]
    InvalidRequest(String),
}

impl AuthError {
    /// Build an `Authority` error
    pub fn authority(code: impl Into<String>, message: impl Into<String>) -> Self {
        AuthError::Authority {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Check if this error is an expected negative result rather than a failure
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            AuthError::InteractionRequired | AuthError::UserCancelled
        )
    }

    /// Map an OAuth token endpoint `error` / `error_description` pair
    pub fn from_token_endpoint(code: &str, description: Option<&str>) -> Self {
        if INTERACTION_REQUIRED_CODES.contains(&code) {
            return AuthError::InteractionRequired;
        }
        if code == "access_denied" {
            return AuthError::UserCancelled;
        }
        AuthError::authority(code, description.unwrap_or(code))
    }

    /// Convert a transport failure talking to the authority
    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AuthError::authority("timeout", format!("Request timeout: {}", e))
        } else if e.is_connect() {
            AuthError::authority("connection_failed", format!("Connection failed: {}", e))
        } else {
            AuthError::authority("network_error", e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interaction_codes_map_to_interaction_required() {
        for code in INTERACTION_REQUIRED_CODES {
            assert_eq!(
                AuthError::from_token_endpoint(code, Some("AADSTS50058")),
                AuthError::InteractionRequired
            );
        }
    }

    #[test]
    fn test_access_denied_is_user_cancelled() {
        let err = AuthError::from_token_endpoint("access_denied", None);
        assert_eq!(err, AuthError::UserCancelled);
        assert!(err.is_benign());
    }

    #[test]
    fn test_other_codes_are_authority_errors() {
        let err =
            AuthError::from_token_endpoint("invalid_client", Some("AADSTS7000215: bad secret"));
        assert_eq!(
            err,
            AuthError::authority("invalid_client", "AADSTS7000215: bad secret")
        );
        assert!(!err.is_benign());
        assert_eq!(err.to_string(), "invalid_client: AADSTS7000215: bad secret");
    }

    #[test]
    fn test_missing_description_falls_back_to_code() {
        let err = AuthError::from_token_endpoint("server_error", None);
        assert_eq!(err, AuthError::authority("server_error", "server_error"));
    }
}
