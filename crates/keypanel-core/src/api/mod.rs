//! REST API client module for the key panel.
//!
//! Requests carry the session's bearer token. An expired token is refreshed
//! through the panel's `api/refresh` endpoint and the request replayed; when
//! that is impossible the session is wiped and observers are notified.

pub mod authorizer;
pub mod client;
pub mod error;
pub mod refresh;
pub mod request;
pub mod transport;

pub use authorizer::RequestAuthorizer;
pub use client::SessionClient;
pub use error::ApiError;
pub use refresh::{GiveUpReason, Recovery, RefreshCoordinator, RefreshState};
pub use request::{ApiRequest, PreparedRequest};
pub use transport::{HttpTransport, RawResponse, ResponseClass, Transport};
