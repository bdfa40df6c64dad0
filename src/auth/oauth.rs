//! OAuth2 authority: authorization code + PKCE for interactive sign-in,
//! refresh-token grant for silent renewal.
//!
//! Endpoints follow the Azure AD v1 layout (`{authority}/oauth2/authorize`,
//! `{authority}/oauth2/token`) where tokens are requested per `resource`.

use super::{Authority, AuthError, AuthoritySession, Credential};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use url::{Host, Url};

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Account id used when the authority returns no id_token
const UNKNOWN_ACCOUNT: &str = "unknown";

/// OAuth2 token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    /// Seconds until expiry; Azure AD v1 sends this as a string
    #[serde(default, deserialize_with = "number_or_string")]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
}

/// Token endpoint error body
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

/// Identity claims read from an id_token payload
///
/// The signature is not checked: the token came straight from the token
/// endpoint over TLS and is only used to label the cache entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub oid: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub upn: Option<String>,
    #[serde(default)]
    pub unique_name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl IdTokenClaims {
    /// Decode the payload segment of a JWT
    pub fn decode(id_token: &str) -> Option<Self> {
        let payload = id_token.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn account_id(&self) -> Option<&str> {
        self.oid.as_deref().or(self.sub.as_deref())
    }

    pub fn display_id(&self) -> Option<&str> {
        self.upn
            .as_deref()
            .or(self.unique_name.as_deref())
            .or(self.preferred_username.as_deref())
            .or(self.email.as_deref())
    }
}

/// Query parameters delivered to the loopback redirect
#[derive(Debug, Clone, Default, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Generic OAuth2 authority
pub struct OAuthAuthority {
    http_client: reqwest::Client,
    interactive_timeout: std::time::Duration,
}

impl OAuthAuthority {
    pub fn new(interactive_timeout: std::time::Duration) -> Self {
        Self::with_client(reqwest::Client::new(), interactive_timeout)
    }

    pub fn with_client(
        http_client: reqwest::Client,
        interactive_timeout: std::time::Duration,
    ) -> Self {
        Self {
            http_client,
            interactive_timeout,
        }
    }

    /// Generate PKCE code verifier (random 128-character string)
    fn generate_code_verifier() -> String {
        rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(128)
            .map(char::from)
            .collect()
    }

    /// Generate PKCE code challenge from verifier (SHA256 + base64url)
    fn generate_code_challenge(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// Generate a random state parameter for CSRF protection
    fn generate_state() -> String {
        let random_bytes: Vec<u8> = (0..32).map(|_| rand::random::<u8>()).collect();
        URL_SAFE_NO_PAD.encode(&random_bytes)
    }

    /// Build the authorization URL for an interactive challenge
    fn build_authorization_url(
        session: &AuthoritySession,
        resource_id: &str,
        code_challenge: &str,
        state: &str,
    ) -> String {
        let params: [(&str, &str); 8] = [
            ("response_type", "code"),
            ("client_id", session.client_id.as_str()),
            ("redirect_uri", session.redirect_uri.as_str()),
            ("resource", resource_id),
            ("code_challenge", code_challenge),
            ("code_challenge_method", "S256"),
            ("state", state),
            // Interactive acquisition is an explicit re-authentication
            ("prompt", "login"),
        ];

        let query_string = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", session.authorize_endpoint(), query_string)
    }

    /// Address and path the loopback listener must serve
    fn loopback_target(redirect_uri: &str) -> Result<(SocketAddr, String), AuthError> {
        let url = Url::parse(redirect_uri).map_err(|e| {
            AuthError::authority("invalid_redirect_uri", format!("{}: {}", redirect_uri, e))
        })?;

        let ip = match url.host() {
            Some(Host::Domain("localhost")) => IpAddr::V4(Ipv4Addr::LOCALHOST),
            Some(Host::Ipv4(ip)) if ip.is_loopback() => IpAddr::V4(ip),
            Some(Host::Ipv6(ip)) if ip.is_loopback() => IpAddr::V6(ip),
            _ => {
                return Err(AuthError::authority(
                    "invalid_redirect_uri",
                    format!("Redirect URI must point at localhost: {}", redirect_uri),
                ))
            }
        };

        let port = url.port_or_known_default().ok_or_else(|| {
            AuthError::authority(
                "invalid_redirect_uri",
                format!("Could not determine port of {}", redirect_uri),
            )
        })?;

        let path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };
        Ok((SocketAddr::new(ip, port), path))
    }

    /// Turn the redirect's query into an authorization code
    fn authorization_code(query: CallbackQuery, expected_state: &str) -> Result<String, AuthError> {
        if let Some(error) = query.error {
            return Err(match error.as_str() {
                "access_denied" => AuthError::UserCancelled,
                _ => AuthError::authority(
                    error.as_str(),
                    query.error_description.as_deref().unwrap_or(error.as_str()),
                ),
            });
        }

        if query.state.as_deref() != Some(expected_state) {
            return Err(AuthError::authority(
                "state_mismatch",
                "Authorization response state does not match the request",
            ));
        }

        query.code.ok_or_else(|| {
            AuthError::authority("missing_code", "Authorization response carried no code")
        })
    }

    /// Start local HTTP server to receive the OAuth redirect
    async fn start_callback_server(
        addr: SocketAddr,
        path: &str,
    ) -> Result<(oneshot::Receiver<CallbackQuery>, tokio::task::JoinHandle<()>), AuthError> {
        use axum::{extract::Query, response::Html, routing::get, Router};

        let (tx, rx) = oneshot::channel::<CallbackQuery>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let app = Router::new().route(
            path,
            get(move |Query(query): Query<CallbackQuery>| async move {
                let response = if query.error.is_none() {
                    "<h1>Sign-in complete</h1><p>You can close this window and return to the terminal.</p>".to_string()
                } else {
                    format!(
                        "<h1>Sign-in failed</h1><p>Error: {}</p><p>Please close this window and try again.</p>",
                        query.error.as_deref().unwrap_or("unknown")
                    )
                };
                if let Some(sender) = tx.lock().await.take() {
                    let _ = sender.send(query);
                }
                Html(response)
            }),
        );

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            AuthError::authority(
                "callback_bind_failed",
                format!("Failed to bind redirect listener to {}: {}", addr, e),
            )
        })?;
        tracing::debug!("OAuth redirect listener on {}", addr);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("OAuth redirect listener error: {}", e);
            }
        });

        Ok((rx, handle))
    }

    /// Open browser to authorization URL
    fn open_browser(url: &str) {
        eprintln!("Opening browser for sign-in...");
        eprintln!("If the browser doesn't open automatically, visit:");
        eprintln!("{}", url);

        if let Err(e) = open::that(url) {
            tracing::warn!("Failed to open browser: {}", e);
        }
    }

    /// POST a grant to the token endpoint
    async fn request_token(
        &self,
        session: &AuthoritySession,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, AuthError> {
        let response = self
            .http_client
            .post(session.token_endpoint())
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await
            .map_err(AuthError::from_network_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(AuthError::from_network_error)?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => {
                    AuthError::from_token_endpoint(&err.error, err.error_description.as_deref())
                }
                Err(_) => AuthError::authority(
                    format!("http_{}", status.as_u16()),
                    format!("Token request failed ({}): {}", status, body),
                ),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            AuthError::authority(
                "invalid_token_response",
                format!("Failed to parse token response: {}", e),
            )
        })
    }

    /// Build a credential from a token response, carrying identity and the
    /// refresh token over from `previous` when the response omits them
    fn into_credential(
        tokens: TokenResponse,
        resource_id: &str,
        previous: Option<&Credential>,
    ) -> Result<Credential, AuthError> {
        let claims = tokens
            .id_token
            .as_deref()
            .and_then(IdTokenClaims::decode)
            .unwrap_or_default();

        let account_id = claims
            .account_id()
            .map(str::to_string)
            .or_else(|| previous.map(|p| p.account_id.clone()))
            .unwrap_or_else(|| UNKNOWN_ACCOUNT.to_string());
        let display_id = claims
            .display_id()
            .map(str::to_string)
            .or_else(|| previous.and_then(|p| p.display_id.clone()));
        let refresh_token = tokens
            .refresh_token
            .or_else(|| previous.and_then(|p| p.refresh_token.clone()));

        let expires_in = tokens.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        let expires_at = i64::try_from(expires_in)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                AuthError::authority(
                    "invalid_token_response",
                    format!("Token lifetime out of range: expires_in={}", expires_in),
                )
            })?;

        Ok(Credential {
            access_token: tokens.access_token,
            account_id,
            expires_at,
            resource_id: resource_id.to_string(),
            refresh_token,
            display_id,
        })
    }
}

#[async_trait]
impl Authority for OAuthAuthority {
    async fn acquire_silent(
        &self,
        session: &AuthoritySession,
        resource_id: &str,
        stale: Option<&Credential>,
    ) -> Result<Credential, AuthError> {
        let Some(refresh_token) = stale.and_then(|c| c.refresh_token.as_deref()) else {
            return Err(AuthError::InteractionRequired);
        };

        tracing::debug!("Refreshing token for {}", resource_id);

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", session.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("resource", resource_id),
        ];
        let tokens = self.request_token(session, &params).await?;

        Self::into_credential(tokens, resource_id, stale)
    }

    async fn acquire_interactive(
        &self,
        session: &AuthoritySession,
        resource_id: &str,
    ) -> Result<Credential, AuthError> {
        let code_verifier = Self::generate_code_verifier();
        let code_challenge = Self::generate_code_challenge(&code_verifier);
        let state = Self::generate_state();

        let (addr, path) = Self::loopback_target(&session.redirect_uri)?;
        let (callback, server_handle) = Self::start_callback_server(addr, &path).await?;

        let auth_url =
            Self::build_authorization_url(session, resource_id, &code_challenge, &state);
        Self::open_browser(&auth_url);

        let query = tokio::time::timeout(self.interactive_timeout, callback).await;
        server_handle.abort();

        let query = match query {
            Ok(Ok(query)) => query,
            Ok(Err(_)) => {
                return Err(AuthError::authority(
                    "callback_closed",
                    "Redirect listener stopped before the sign-in completed",
                ))
            }
            Err(_) => {
                tracing::info!(
                    "No sign-in response after {} seconds",
                    self.interactive_timeout.as_secs()
                );
                return Err(AuthError::UserCancelled);
            }
        };

        let code = Self::authorization_code(query, &state)?;

        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", session.client_id.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", session.redirect_uri.as_str()),
            ("code_verifier", code_verifier.as_str()),
            ("resource", resource_id),
        ];
        let tokens = self.request_token(session, &params).await?;

        Self::into_credential(tokens, resource_id, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> AuthoritySession {
        AuthoritySession::new(
            "https://login.microsoftonline.com/contoso.com",
            "client-123",
            "http://localhost:8400/callback",
        )
    }

    fn jwt(claims: serde_json::Value) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    #[test]
    fn test_code_challenge_is_s256_of_verifier() {
        // RFC 7636 appendix B
        let challenge = OAuthAuthority::generate_code_challenge(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk",
        );
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_code_verifier_length() {
        assert_eq!(OAuthAuthority::generate_code_verifier().len(), 128);
    }

    #[test]
    fn test_authorization_url() {
        let url = OAuthAuthority::build_authorization_url(
            &session(),
            "https://graph.windows.net",
            "challenge",
            "xyz",
        );
        assert!(url.starts_with("https://login.microsoftonline.com/contoso.com/oauth2/authorize?"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("resource=https%3A%2F%2Fgraph.windows.net"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8400%2Fcallback"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("state=xyz"));
        assert!(url.contains("prompt=login"));
    }

    #[test]
    fn test_loopback_target() {
        assert_eq!(
            OAuthAuthority::loopback_target("http://localhost:8400/callback").unwrap(),
            ("127.0.0.1:8400".parse().unwrap(), "/callback".to_string())
        );
        assert_eq!(
            OAuthAuthority::loopback_target("http://127.0.0.1").unwrap(),
            ("127.0.0.1:80".parse().unwrap(), "/".to_string())
        );
        assert_eq!(
            OAuthAuthority::loopback_target("http://[::1]:8400/callback").unwrap(),
            ("[::1]:8400".parse().unwrap(), "/callback".to_string())
        );
        assert!(OAuthAuthority::loopback_target("https://app.contoso.com/callback").is_err());
        assert!(OAuthAuthority::loopback_target("not a url").is_err());
    }

    #[test]
    fn test_callback_access_denied_is_cancel() {
        let query = CallbackQuery {
            error: Some("access_denied".to_string()),
            error_description: Some("AADSTS65004: User declined".to_string()),
            ..Default::default()
        };
        assert_eq!(
            OAuthAuthority::authorization_code(query, "s"),
            Err(AuthError::UserCancelled)
        );
    }

    #[test]
    fn test_callback_state_must_match() {
        let query = CallbackQuery {
            code: Some("code".to_string()),
            state: Some("other".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            OAuthAuthority::authorization_code(query, "expected"),
            Err(AuthError::Authority { code, .. }) if code == "state_mismatch"
        ));

        let query = CallbackQuery {
            code: Some("code".to_string()),
            state: Some("expected".to_string()),
            ..Default::default()
        };
        assert_eq!(
            OAuthAuthority::authorization_code(query, "expected").unwrap(),
            "code"
        );
    }

    #[test]
    fn test_id_token_claims() {
        let token = jwt(serde_json::json!({
            "oid": "object-1",
            "sub": "subject-1",
            "upn": "alice@contoso.com"
        }));
        let claims = IdTokenClaims::decode(&token).unwrap();
        assert_eq!(claims.account_id(), Some("object-1"));
        assert_eq!(claims.display_id(), Some("alice@contoso.com"));

        let token = jwt(serde_json::json!({ "sub": "subject-1", "email": "bob@contoso.com" }));
        let claims = IdTokenClaims::decode(&token).unwrap();
        assert_eq!(claims.account_id(), Some("subject-1"));
        assert_eq!(claims.display_id(), Some("bob@contoso.com"));

        assert!(IdTokenClaims::decode("garbage").is_none());
    }

    #[test]
    fn test_token_response_accepts_string_expiry() {
        let tokens: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":"3599"}"#).unwrap();
        assert_eq!(tokens.expires_in, Some(3599));

        let tokens: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":120}"#).unwrap();
        assert_eq!(tokens.expires_in, Some(120));
    }

    #[test]
    fn test_refresh_keeps_previous_identity() {
        let previous = Credential {
            access_token: "old".to_string(),
            account_id: "u1".to_string(),
            expires_at: Utc::now(),
            resource_id: "graph".to_string(),
            refresh_token: Some("rt-old".to_string()),
            display_id: Some("alice".to_string()),
        };
        let tokens = TokenResponse {
            access_token: "new".to_string(),
            refresh_token: None,
            id_token: None,
            expires_in: Some(3600),
            token_type: Some("Bearer".to_string()),
            resource: None,
        };

        let cred = OAuthAuthority::into_credential(tokens, "graph", Some(&previous)).unwrap();
        assert_eq!(cred.access_token, "new");
        assert_eq!(cred.account_id, "u1");
        assert_eq!(cred.display_id.as_deref(), Some("alice"));
        assert_eq!(cred.refresh_token.as_deref(), Some("rt-old"));
        assert!(!cred.is_expired());
    }

    #[test]
    fn test_out_of_range_lifetime_is_rejected() {
        for expires_in in [100_000_000_000_000_000, u64::MAX] {
            let tokens = TokenResponse {
                access_token: "a".to_string(),
                refresh_token: None,
                id_token: None,
                expires_in: Some(expires_in),
                token_type: None,
                resource: None,
            };

            let err = OAuthAuthority::into_credential(tokens, "graph", None).unwrap_err();
            assert!(matches!(
                err,
                AuthError::Authority { ref code, .. } if code == "invalid_token_response"
            ));
        }
    }
}
