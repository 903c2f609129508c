//! Session token storage
//!
//! The access/refresh pair is persisted under the keys `"access"` and
//! `"refresh"`. Both are written and cleared together; a refresh only
//! replaces the access half of a pair that already exists.

use crate::error::{ClientError, Result};
use crate::types::AuthTokens;
use papaya::HashMap;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

pub const ACCESS_KEY: &str = "access";
pub const REFRESH_KEY: &str = "refresh";

/// Storage backend for the session token pair
pub trait TokenStore: Send + Sync + 'static {
    fn access_token(&self) -> Option<String>;

    fn refresh_token(&self) -> Option<String>;

    /// Write both tokens of a freshly issued pair
    fn store(&self, tokens: AuthTokens) -> Result<()>;

    /// Replace the access token of the stored pair
    ///
    /// Fails when no refresh token is stored, so an access token never
    /// exists without its refresh token.
    fn set_access_token(&self, access_token: String) -> Result<()>;

    /// Remove both tokens
    fn clear(&self) -> Result<()>;

    /// The stored pair, if both halves are present
    fn tokens(&self) -> Option<AuthTokens> {
        let access_token = self.access_token()?;
        let refresh_token = self.refresh_token()?;
        Some(AuthTokens {
            access_token,
            refresh_token,
        })
    }
}

/// In-memory token store backed by a Papaya HashMap
///
/// Clones share the same underlying map.
#[derive(Clone)]
pub struct MemoryTokenStore {
    tokens: Arc<HashMap<&'static str, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self {
            tokens: Arc::new(HashMap::new()),
        }
    }

    pub fn with_tokens(tokens: AuthTokens) -> Self {
        let store = Self::new();
        store.insert_pair(tokens);
        store
    }

    // refresh goes in first and comes out last, so readers never observe
    // an access token without its refresh token
    fn insert_pair(&self, tokens: AuthTokens) {
        let map = self.tokens.pin();
        map.insert(REFRESH_KEY, tokens.refresh_token);
        map.insert(ACCESS_KEY, tokens.access_token);
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        self.tokens.pin().get(ACCESS_KEY).cloned()
    }

    fn refresh_token(&self) -> Option<String> {
        self.tokens.pin().get(REFRESH_KEY).cloned()
    }

    fn store(&self, tokens: AuthTokens) -> Result<()> {
        self.insert_pair(tokens);
        Ok(())
    }

    fn set_access_token(&self, access_token: String) -> Result<()> {
        let map = self.tokens.pin();
        if !map.contains_key(REFRESH_KEY) {
            return Err(ClientError::Storage("no refresh token stored".to_string()));
        }
        map.insert(ACCESS_KEY, access_token);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let map = self.tokens.pin();
        map.remove(ACCESS_KEY);
        map.remove(REFRESH_KEY);
        Ok(())
    }
}

/// Token store persisted as a JSON object on disk
///
/// The file is read once on open and rewritten on every mutation.
pub struct FileTokenStore {
    path: PathBuf,
    tokens: Mutex<BTreeMap<String, String>>,
}

impl FileTokenStore {
    /// Open the store at `path`; a missing file is an empty session
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let tokens = match fs::read_to_string(&path) {
            Ok(contents) => {
                let mut tokens: BTreeMap<String, String> = serde_json::from_str(&contents)?;
                if !(tokens.contains_key(ACCESS_KEY) && tokens.contains_key(REFRESH_KEY)) {
                    warn!(path = %path.display(), "Discarding incomplete token pair");
                    tokens.clear();
                }
                tokens
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(ClientError::Storage(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        debug!(path = %path.display(), has_session = !tokens.is_empty(), "Opened token file");

        Ok(Self {
            path,
            tokens: Mutex::new(tokens),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.tokens
            .lock()
            .map_err(|_| ClientError::Storage("token store lock poisoned".to_string()))
    }

    fn persist(&self, tokens: &BTreeMap<String, String>) -> Result<()> {
        if tokens.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(ClientError::Storage(format!(
                    "failed to remove {}: {e}",
                    self.path.display()
                ))),
            };
        }

        let contents = serde_json::to_string_pretty(tokens)?;
        let write_err = |e: std::io::Error| {
            ClientError::Storage(format!("failed to write {}: {e}", self.path.display()))
        };

        // Staged next to the target so the final rename stays on one filesystem
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(dir).map_err(write_err)?;
        staged.write_all(contents.as_bytes()).map_err(write_err)?;
        staged.as_file().sync_all().map_err(write_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(staged.path(), fs::Permissions::from_mode(0o600))
                .map_err(write_err)?;
        }

        staged.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn access_token(&self) -> Option<String> {
        self.lock().ok()?.get(ACCESS_KEY).cloned()
    }

    fn refresh_token(&self) -> Option<String> {
        self.lock().ok()?.get(REFRESH_KEY).cloned()
    }

    fn store(&self, tokens: AuthTokens) -> Result<()> {
        let mut map = self.lock()?;
        map.insert(ACCESS_KEY.to_string(), tokens.access_token);
        map.insert(REFRESH_KEY.to_string(), tokens.refresh_token);
        self.persist(&map)
    }

    fn set_access_token(&self, access_token: String) -> Result<()> {
        let mut map = self.lock()?;
        if !map.contains_key(REFRESH_KEY) {
            return Err(ClientError::Storage("no refresh token stored".to_string()));
        }
        map.insert(ACCESS_KEY.to_string(), access_token);
        self.persist(&map)
    }

    fn clear(&self) -> Result<()> {
        let mut map = self.lock()?;
        map.clear();
        self.persist(&map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryTokenStore::new();
        assert!(store.tokens().is_none());

        store.store(AuthTokens::new("access_123", "refresh_456")).unwrap();
        assert_eq!(store.access_token().as_deref(), Some("access_123"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh_456"));

        // Clones share state
        let other = store.clone();
        other.set_access_token("access_789".to_string()).unwrap();
        assert_eq!(store.access_token().as_deref(), Some("access_789"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh_456"));

        store.clear().unwrap();
        assert!(store.access_token().is_none());
        assert!(other.refresh_token().is_none());
    }

    #[test]
    fn test_set_access_requires_refresh() {
        let store = MemoryTokenStore::new();
        let result = store.set_access_token("orphan".to_string());
        assert!(matches!(result, Err(ClientError::Storage(_))));
        assert!(store.access_token().is_none());
    }

    #[test]
    fn test_file_store_persists_pair() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileTokenStore::open(&path).unwrap();
        assert!(store.tokens().is_none());
        store.store(AuthTokens::new("A1", "R1")).unwrap();
        store.set_access_token("A2".to_string()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"access": "A2", "refresh": "R1"}));

        let reopened = FileTokenStore::open(&path).unwrap();
        assert_eq!(reopened.tokens(), Some(AuthTokens::new("A2", "R1")));

        reopened.clear().unwrap();
        assert!(!path.exists());
        assert!(reopened.tokens().is_none());
    }

    #[test]
    fn test_file_store_replaces_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileTokenStore::open(&path).unwrap();
        store.store(AuthTokens::new("A1", "R1")).unwrap();
        store.store(AuthTokens::new("A2", "R2")).unwrap();

        // Only the session file remains; staging files were renamed over it
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            FileTokenStore::open(&path).unwrap().tokens(),
            Some(AuthTokens::new("A2", "R2"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileTokenStore::open(&path).unwrap();
        store.store(AuthTokens::new("A1", "R1")).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_file_store_discards_half_pair() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, r#"{"access": "A1"}"#).unwrap();

        let store = FileTokenStore::open(&path).unwrap();
        assert!(store.access_token().is_none());
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            FileTokenStore::open(&path),
            Err(ClientError::Serialization(_))
        ));
    }
}
