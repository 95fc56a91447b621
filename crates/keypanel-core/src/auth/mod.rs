//! Session state: live token, durable store, expiry broadcast.
//!
//! This module provides:
//! - `TokenState`: the in-memory access token read by every request
//! - `SessionStore`: persistence seam, with memory, file and keychain stores
//! - `SessionExpiredNotifier`: one-shot broadcast when recovery is impossible
//! - `SessionContext`: ties the three together for one login

pub mod credentials;
pub mod notifier;
pub mod session;
pub mod store;
pub mod token_state;

pub use credentials::KeyringSessionStore;
pub use notifier::{
    foreground_channel, ForegroundContext, ForegroundHandle, SessionExpiredNotifier,
    SessionListener,
};
pub use session::SessionContext;
pub use store::{FileSessionStore, MemorySessionStore, SessionRecord, SessionStore, StoreError};
pub use token_state::TokenState;
