//! Credential cache keyed by account and resource
//!
//! The file-backed cache lives in ~/.local/share/graph-signin/token_cache.json
//! with 0600 permissions (owner read/write only).

use super::Credential;
use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

type CacheKey = (String, String);

fn key_of(credential: &Credential) -> CacheKey {
    (
        credential.account_id.clone(),
        credential.resource_id.clone(),
    )
}

/// Storage for issued credentials
///
/// At most one credential is kept per `(account_id, resource_id)`. `get` only
/// ever hands out credentials that are still valid; expired entries are
/// reachable through `entries` for callers that want to refresh them.
pub trait CredentialStore: Send + Sync {
    /// Valid credential for the account and resource, if any
    fn get(&self, account_id: &str, resource_id: &str) -> Option<Credential>;

    /// Insert or replace the entry for the credential's key
    fn put(&self, credential: Credential);

    /// Remove every entry
    fn clear(&self);

    /// All entries, expired ones included
    fn entries(&self) -> Vec<Credential>;
}

fn valid_entry(
    map: &DashMap<CacheKey, Credential>,
    account_id: &str,
    resource_id: &str,
) -> Option<Credential> {
    let key = (account_id.to_string(), resource_id.to_string());
    map.get(&key)
        .map(|entry| entry.value().clone())
        .filter(|cred| cred.resource_id == resource_id && !cred.is_expired())
}

/// Process-local credential cache
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: DashMap<CacheKey, Credential>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, account_id: &str, resource_id: &str) -> Option<Credential> {
        valid_entry(&self.entries, account_id, resource_id)
    }

    fn put(&self, credential: Credential) {
        self.entries.insert(key_of(&credential), credential);
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn entries(&self) -> Vec<Credential> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }
}

/// Cache file format with version for future migrations
#[derive(Debug, Serialize, Deserialize)]
struct StoredCache {
    /// Schema version for future migrations
    version: u32,
    /// When the cache was last written (Unix timestamp)
    stored_at: i64,
    entries: Vec<Credential>,
}

/// Credential cache persisted to a JSON file
///
/// Entries are mirrored in memory; the file is rewritten on every change.
/// Disk failures are logged and never surface to callers, so the cache keeps
/// working for the rest of the process even when the file cannot be written.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    entries: DashMap<CacheKey, Credential>,
}

impl FileCredentialStore {
    /// Current storage schema version
    const VERSION: u32 = 1;

    /// Open the cache at the default location
    pub fn open_default() -> Result<Self> {
        Ok(Self::open(Self::default_path()?))
    }

    /// Open the cache at `path`, loading any existing entries
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = DashMap::new();

        if path.exists() {
            match Self::load(&path) {
                Ok(loaded) => {
                    for cred in loaded {
                        entries.insert(key_of(&cred), cred);
                    }
                    tracing::debug!("Loaded {} cached credentials from {:?}", entries.len(), path);
                }
                Err(e) => {
                    tracing::warn!("Ignoring unreadable token cache {:?}: {:#}", path, e);
                }
            }
        }

        Self { path, entries }
    }

    /// Get the default cache file path
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .context("Failed to determine data directory")?;

        Ok(data_dir.join("graph-signin").join("token_cache.json"))
    }

    /// Get the cache file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<Vec<Credential>> {
        let content = std::fs::read_to_string(path).context("Failed to read token cache")?;
        let stored: StoredCache =
            serde_json::from_str(&content).context("Failed to parse token cache")?;

        if stored.version > Self::VERSION {
            anyhow::bail!(
                "Token cache version {} is newer than supported version {}",
                stored.version,
                Self::VERSION
            );
        }

        Ok(stored.entries)
    }

    fn persist(&self) -> Result<()> {
        let stored = StoredCache {
            version: Self::VERSION,
            stored_at: chrono::Utc::now().timestamp(),
            entries: self.entries(),
        };
        let content = serde_json::to_string_pretty(&stored)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        // Write to temp file first, then rename (atomic)
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content).context("Failed to write temp token cache")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&temp_path, perms)
                .context("Failed to set token cache permissions")?;
        }

        std::fs::rename(&temp_path, &self.path).context("Failed to save token cache")?;
        tracing::debug!("Saved token cache to {:?}", self.path);
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, account_id: &str, resource_id: &str) -> Option<Credential> {
        valid_entry(&self.entries, account_id, resource_id)
    }

    fn put(&self, credential: Credential) {
        self.entries.insert(key_of(&credential), credential);
        if let Err(e) = self.persist() {
            tracing::warn!("Failed to persist token cache: {:#}", e);
        }
    }

    fn clear(&self) {
        self.entries.clear();
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!("Failed to delete token cache {:?}: {}", self.path, e);
                return;
            }
            tracing::info!("Deleted token cache {:?}", self.path);
        }
    }

    fn entries(&self) -> Vec<Credential> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }
}
