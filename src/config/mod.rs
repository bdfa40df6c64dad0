//! Configuration management for graph-signin

use crate::auth::AuthoritySession;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Placeholder in `auth.aad_instance` replaced by the tenant
const TENANT_PLACEHOLDER: &str = "{tenant}";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub auth: AuthConfig,
    pub graph: GraphConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Authority URL template, `{tenant}` is substituted
    pub aad_instance: String,
    /// Directory tenant the application is registered in
    pub tenant: String,
    /// Application (client) id
    pub client_id: String,
    /// Where the authority returns OAuth responses; must be a localhost URL
    pub redirect_uri: String,
    /// Resource tokens are requested for
    pub resource_id: String,
    /// How long to wait for the browser sign-in to complete
    pub interactive_timeout_secs: u64,
    /// End the provider's browser session on sign-out
    pub browser_logout: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            aad_instance: format!("https://login.microsoftonline.com/{}", TENANT_PLACEHOLDER),
            tenant: String::new(),
            client_id: String::new(),
            redirect_uri: "http://localhost:8400/callback".to_string(),
            resource_id: "https://graph.windows.net".to_string(),
            interactive_timeout_secs: 120, // 2 minutes
            browser_logout: true,
        }
    }
}

impl AuthConfig {
    /// Tenant-qualified authority URL
    pub fn authority(&self) -> String {
        if self.aad_instance.contains(TENANT_PLACEHOLDER) {
            self.aad_instance.replace(TENANT_PLACEHOLDER, &self.tenant)
        } else {
            format!("{}/{}", self.aad_instance.trim_end_matches('/'), self.tenant)
        }
    }
}

/// Downstream directory API settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphConfig {
    /// Call the directory after sign-in
    pub enabled: bool,
    pub endpoint: String,
    pub api_version: String,
    pub timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://graph.windows.net/".to_string(),
            api_version: "1.6".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Override for the token cache file location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `path`, falling back to defaults if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "graph-signin") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Authority session for a sign-in attempt
    pub fn authority_session(&self) -> Result<AuthoritySession> {
        let session = AuthoritySession::new(
            self.auth.authority(),
            self.auth.client_id.clone(),
            self.auth.redirect_uri.clone(),
        );
        if self.auth.tenant.trim().is_empty() {
            anyhow::bail!("auth.tenant is not configured");
        }
        session.validate()?;
        Ok(session)
    }
}
