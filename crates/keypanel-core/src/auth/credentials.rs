use keyring::Entry;
use tracing::debug;

use super::store::{SessionRecord, SessionStore, StoreError};

const SERVICE_NAME: &str = "keypanel";

const ACCESS_TOKEN_ENTRY: &str = "access_token";
const REFRESH_TOKEN_ENTRY: &str = "refresh_token";
const IDENTITY_ENTRY: &str = "session";

/// Session stored in the OS keychain, one entry per field
#[derive(Debug, Clone)]
pub struct KeyringSessionStore {
    service: String,
}

impl KeyringSessionStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a custom keychain service name (e.g. one per server profile)
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, name: &str) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, name)?)
    }

    fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        match self.entry(name)?.get_password() {
            Ok(value) if value.is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.entry(name)?.set_password(value)?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        match self.entry(name)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for KeyringSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for KeyringSessionStore {
    fn access_token(&self) -> Result<Option<String>, StoreError> {
        self.get(ACCESS_TOKEN_ENTRY)
    }

    fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        self.get(REFRESH_TOKEN_ENTRY)
    }

    fn save_access_token(&self, token: &str) -> Result<(), StoreError> {
        self.set(ACCESS_TOKEN_ENTRY, token)
    }

    fn save_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        self.set(REFRESH_TOKEN_ENTRY, token)
    }

    fn identity(&self) -> Result<Option<SessionRecord>, StoreError> {
        match self.get(IDENTITY_ENTRY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_identity(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        self.set(IDENTITY_ENTRY, &json)
    }

    fn clear(&self) -> Result<(), StoreError> {
        debug!(service = %self.service, "Clearing keychain session entries");
        // Attempt every entry, then report the first failure
        [ACCESS_TOKEN_ENTRY, REFRESH_TOKEN_ENTRY, IDENTITY_ENTRY]
            .into_iter()
            .map(|name| self.delete(name))
            .fold(Ok(()), |first, result| first.and(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// Store under a per-process service name, or None when this machine has
    /// no usable keychain (headless CI, sandboxed containers).
    fn scratch_store(tag: &str) -> Option<KeyringSessionStore> {
        let store =
            KeyringSessionStore::with_service(format!("keypanel-test-{}-{}", tag, std::process::id()));
        match store.save_access_token("a1") {
            Ok(()) => Some(store),
            Err(e) => {
                eprintln!("skipping keychain test, no keychain available: {}", e);
                None
            }
        }
    }

    #[test]
    fn test_saved_values_survive_a_fresh_store() {
        let Some(store) = scratch_store("persist") else {
            return;
        };
        store.save_refresh_token("r1").unwrap();
        store
            .save_identity(&SessionRecord {
                user_id: 7,
                username: "alice".to_string(),
                fullname: String::new(),
                email: String::new(),
                level: 2,
                logged_in_at: Utc::now(),
            })
            .unwrap();

        // A second handle builds its own entries, as a new process would
        let reopened = store.clone();
        assert_eq!(reopened.access_token().unwrap().as_deref(), Some("a1"));
        assert_eq!(reopened.refresh_token().unwrap().as_deref(), Some("r1"));
        assert_eq!(reopened.identity().unwrap().map(|r| r.user_id), Some(7));

        reopened.clear().unwrap();
        assert_eq!(store.access_token().unwrap(), None);
        assert_eq!(store.refresh_token().unwrap(), None);
        assert!(!store.is_logged_in());
    }

    #[test]
    fn test_clear_without_entries_is_ok() {
        let Some(store) = scratch_store("clear") else {
            return;
        };
        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.access_token().unwrap(), None);
    }
}
