//! In-memory holder of the live access token.
//!
//! Every outbound request reads this slot; only the refresh protocol and
//! login/logout write it. Persistence is the caller's responsibility.

use std::sync::{PoisonError, RwLock};

/// Thread-safe slot holding the current access token.
///
/// Reads and writes replace the whole value under one lock, so a reader
/// never observes a partially written token.
#[derive(Debug, Default)]
pub struct TokenState {
    slot: RwLock<Option<String>>,
}

impl TokenState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slot already holding `token` (empty means unauthenticated)
    pub fn with_token(token: Option<String>) -> Self {
        let state = Self::new();
        if let Some(token) = token {
            state.set(token);
        }
        state
    }

    /// Current access token, or `None` when unauthenticated
    pub fn get(&self) -> Option<String> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the access token. An empty string clears the slot.
    pub fn set(&self, token: impl Into<String>) {
        let token = token.into();
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = if token.is_empty() { None } else { Some(token) };
    }

    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
