//! Durable session persistence.
//!
//! The session layer only needs a handful of string fields: the two tokens
//! and the identity of the logged-in user. [`SessionStore`] is the seam the
//! rest of the crate consumes; concrete stores live here and in
//! [`credentials`](super::credentials).

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::User;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session data is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain access failed: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Identity of the logged-in user, saved alongside the tokens at login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: i64,
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub level: i32,
    pub logged_in_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username.clone(),
            fullname: user.fullname.clone().unwrap_or_default(),
            email: user.email.clone().unwrap_or_default(),
            level: user.level,
            logged_in_at: Utc::now(),
        }
    }
}

/// Key/value persistence for the session.
///
/// Each method is a single atomic operation; implementations must never
/// expose a half-written value to a concurrent reader.
pub trait SessionStore: Send + Sync {
    fn access_token(&self) -> Result<Option<String>, StoreError>;

    fn refresh_token(&self) -> Result<Option<String>, StoreError>;

    fn save_access_token(&self, token: &str) -> Result<(), StoreError>;

    fn save_refresh_token(&self, token: &str) -> Result<(), StoreError>;

    fn identity(&self) -> Result<Option<SessionRecord>, StoreError>;

    fn save_identity(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Remove every stored field
    fn clear(&self) -> Result<(), StoreError>;

    /// A stored identity means a login happened and was not cleared since
    fn is_logged_in(&self) -> bool {
        matches!(self.identity(), Ok(Some(_)))
    }
}

/// Everything a store persists, in one serializable value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StoredSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity: Option<SessionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

/// Treat empty strings the same as absent values
fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

/// Process-local store, used by tests and embedders with their own persistence
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<StoredSession>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a token pair
    pub fn with_tokens(access_token: &str, refresh_token: &str) -> Self {
        Self {
            inner: Mutex::new(StoredSession {
                identity: None,
                access_token: Some(access_token.to_string()),
                refresh_token: Some(refresh_token.to_string()),
            }),
        }
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut StoredSession) -> T) -> T {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *inner)
    }
}

impl SessionStore for MemorySessionStore {
    fn access_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.with_inner(|s| non_empty(&s.access_token)))
    }

    fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.with_inner(|s| non_empty(&s.refresh_token)))
    }

    fn save_access_token(&self, token: &str) -> Result<(), StoreError> {
        self.with_inner(|s| s.access_token = Some(token.to_string()));
        Ok(())
    }

    fn save_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        self.with_inner(|s| s.refresh_token = Some(token.to_string()));
        Ok(())
    }

    fn identity(&self) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.with_inner(|s| s.identity.clone()))
    }

    fn save_identity(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.with_inner(|s| s.identity = Some(record.clone()));
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.with_inner(|s| *s = StoredSession::default());
        Ok(())
    }
}

/// Session persisted as a JSON file in the cache directory.
///
/// The whole file is rewritten under the lock on every mutation, so the
/// on-disk copy always matches the in-memory one.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    inner: Mutex<StoredSession>,
}

impl FileSessionStore {
    /// Open (or lazily create) `session.json` inside `cache_dir`
    pub fn open(cache_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = cache_dir.as_ref().join(SESSION_FILE);
        let stored = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            StoredSession::default()
        };
        debug!(path = %path.display(), has_identity = stored.identity.is_some(), "Session file opened");
        Ok(Self {
            path,
            inner: Mutex::new(stored),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, stored: &StoredSession) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(stored)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }

    fn mutate(&self, f: impl FnOnce(&mut StoredSession)) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = inner.clone();
        f(&mut next);
        self.write(&next)?;
        *inner = next;
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&StoredSession) -> T) -> T {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&*inner)
    }
}

impl SessionStore for FileSessionStore {
    fn access_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.read(|s| non_empty(&s.access_token)))
    }

    fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.read(|s| non_empty(&s.refresh_token)))
    }

    fn save_access_token(&self, token: &str) -> Result<(), StoreError> {
        self.mutate(|s| s.access_token = Some(token.to_string()))
    }

    fn save_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        self.mutate(|s| s.refresh_token = Some(token.to_string()))
    }

    fn identity(&self) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.read(|s| s.identity.clone()))
    }

    fn save_identity(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.mutate(|s| s.identity = Some(record.clone()))
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Disk first: a failed removal must not leave tokens for the next process
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        *inner = StoredSession::default();
        Ok(())
    }
}
