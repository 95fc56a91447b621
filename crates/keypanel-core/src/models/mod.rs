//! Wire models for the panel API.
//!
//! - `Envelope`: the `{status, message, data, total}` wrapper every endpoint returns
//! - `User`: the account record returned by login and profile calls
//! - Auth payloads: `LoginRequest`, `RefreshRequest`, `RefreshResponse`

pub mod auth;
pub mod envelope;
pub mod user;

pub use auth::{LoginRequest, RefreshRequest, RefreshResponse};
pub use envelope::Envelope;
pub use user::User;
