//! keypanel-core - authenticated session layer for the key panel API.
//!
//! Attaches bearer credentials to outbound requests, recovers from expired
//! access tokens with a bounded refresh exchange, and tells observers once
//! when the session is beyond recovery.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
#[cfg(test)]
pub mod testutil;

pub use api::{ApiError, ApiRequest, SessionClient};
pub use auth::{SessionContext, SessionExpiredNotifier, SessionStore};
pub use config::Config;
