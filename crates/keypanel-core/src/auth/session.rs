use std::sync::Arc;

use tracing::{debug, info, warn};

use super::notifier::SessionExpiredNotifier;
use super::store::{SessionRecord, SessionStore};
use super::token_state::TokenState;

/// Shared state of one authenticated session.
///
/// Owns the live [`TokenState`] and ties it to the durable store and the
/// expiry notifier. Every request-issuing component holds the same
/// `Arc<SessionContext>`; nothing here is global.
pub struct SessionContext {
    tokens: Arc<TokenState>,
    store: Arc<dyn SessionStore>,
    notifier: Arc<SessionExpiredNotifier>,
}

impl SessionContext {
    /// Fresh, unauthenticated context
    pub fn new(store: Arc<dyn SessionStore>, notifier: Arc<SessionExpiredNotifier>) -> Self {
        Self {
            tokens: Arc::new(TokenState::new()),
            store,
            notifier,
        }
    }

    /// Context whose token state is seeded from whatever the store holds
    pub fn restore(store: Arc<dyn SessionStore>, notifier: Arc<SessionExpiredNotifier>) -> Self {
        let token = match store.access_token() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read stored access token, starting unauthenticated");
                None
            }
        };
        debug!(authenticated = token.is_some(), "Session restored from store");
        Self {
            tokens: Arc::new(TokenState::with_token(token)),
            store,
            notifier,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenState> {
        &self.tokens
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<SessionExpiredNotifier> {
        &self.notifier
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_authenticated()
    }

    pub fn identity(&self) -> Option<SessionRecord> {
        self.store.identity().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read stored identity");
            None
        })
    }

    /// Stored refresh credential; unreadable counts as absent
    pub fn refresh_token(&self) -> Option<String> {
        match self.store.refresh_token() {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read stored refresh token");
                None
            }
        }
    }

    /// Record a successful login: persist identity and both tokens, publish
    /// the access token and re-arm the expiry notifier.
    pub fn establish(&self, record: &SessionRecord, access_token: &str, refresh_token: Option<&str>) {
        if let Err(e) = self.store.save_identity(record) {
            warn!(error = %e, "Failed to save session identity");
        }
        self.persist_tokens(access_token, refresh_token);
        self.tokens.set(access_token);
        self.notifier.reset();
        info!(user_id = record.user_id, username = %record.username, "Session established");
    }

    /// Record a successful refresh exchange.
    ///
    /// The access token always overwrites; the refresh token only when the
    /// server rotated it. Returns false without writing anything once the
    /// session has expired, so a late exchange cannot revive a wiped session.
    pub fn apply_refresh(&self, access_token: &str, refresh_token: Option<&str>) -> bool {
        if self.notifier.has_emitted() {
            debug!("Session already expired, discarding refreshed tokens");
            return false;
        }
        self.persist_tokens(access_token, refresh_token);
        self.tokens.set(access_token);
        debug!(rotated = refresh_token.is_some(), "Access token refreshed");
        true
    }

    fn persist_tokens(&self, access_token: &str, refresh_token: Option<&str>) {
        if let Err(e) = self.store.save_access_token(access_token) {
            warn!(error = %e, "Failed to persist access token");
        }
        if let Some(refresh_token) = refresh_token.filter(|t| !t.is_empty()) {
            if let Err(e) = self.store.save_refresh_token(refresh_token) {
                warn!(error = %e, "Failed to persist refresh token");
            }
        }
    }

    /// User-initiated logout: wipe credentials without broadcasting expiry
    pub fn logout(&self) {
        self.wipe();
        info!("Logged out");
    }

    /// System-initiated logout after an unrecoverable authorization failure.
    /// Completes the wipe before observers are notified.
    pub fn force_logout(&self) {
        self.wipe();
        if self.notifier.emit() {
            warn!("Session expired, forced logout");
        }
    }

    fn wipe(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear session store");
        }
        self.tokens.clear();
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("authenticated", &self.is_authenticated())
            .field("notifier", &self.notifier)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemorySessionStore;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context_with(store: MemorySessionStore) -> SessionContext {
        SessionContext::restore(Arc::new(store), Arc::new(SessionExpiredNotifier::new()))
    }

    fn record() -> SessionRecord {
        SessionRecord {
            user_id: 1,
            username: "alice".to_string(),
            fullname: String::new(),
            email: String::new(),
            level: 3,
            logged_in_at: Utc::now(),
        }
    }

    #[test]
    fn test_restore_seeds_token_state() {
        let session = context_with(MemorySessionStore::with_tokens("a1", "r1"));
        assert_eq!(session.tokens().get().as_deref(), Some("a1"));
        assert_eq!(session.refresh_token().as_deref(), Some("r1"));

        let empty = context_with(MemorySessionStore::new());
        assert!(!empty.is_authenticated());
    }

    #[test]
    fn test_apply_refresh_keeps_old_refresh_token_when_not_rotated() {
        let session = context_with(MemorySessionStore::with_tokens("a1", "r1"));
        session.apply_refresh("a2", None);
        assert_eq!(session.tokens().get().as_deref(), Some("a2"));
        assert_eq!(session.store().access_token().unwrap().as_deref(), Some("a2"));
        assert_eq!(session.refresh_token().as_deref(), Some("r1"));

        session.apply_refresh("a3", Some("r3"));
        assert_eq!(session.refresh_token().as_deref(), Some("r3"));
    }

    #[test]
    fn test_apply_refresh_after_expiry_is_discarded() {
        let session = context_with(MemorySessionStore::with_tokens("a1", "r1"));
        session.force_logout();

        assert!(!session.apply_refresh("a2", Some("r2")));
        assert!(!session.is_authenticated());
        assert_eq!(session.store().access_token().unwrap(), None);
        assert_eq!(session.refresh_token(), None);
    }

    #[test]
    fn test_establish_resets_notifier() {
        let session = context_with(MemorySessionStore::new());
        session.notifier().emit();
        assert!(session.notifier().has_emitted());

        session.establish(&record(), "a1", Some("r1"));
        assert!(!session.notifier().has_emitted());
        assert_eq!(session.tokens().get().as_deref(), Some("a1"));
        assert!(session.store().is_logged_in());
        assert_eq!(session.identity().map(|r| r.username), Some("alice".to_string()));
    }

    #[test]
    fn test_logout_does_not_notify() {
        let session = context_with(MemorySessionStore::with_tokens("a1", "r1"));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let listener: crate::auth::SessionListener = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        session.notifier().add_listener(&listener);

        session.logout();
        assert!(!session.is_authenticated());
        assert_eq!(session.refresh_token(), None);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        session.force_logout();
        session.force_logout();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
