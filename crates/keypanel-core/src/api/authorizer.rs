use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use tracing::{trace, warn};

use super::request::{bearer_value, ApiRequest, PreparedRequest};
use crate::auth::TokenState;

/// Attaches the live access token to outbound requests.
///
/// Credential-exempt requests pass through untouched (minus the exemption
/// marker). A request that already carries an `Authorization` header, such
/// as a replay after refresh, keeps it. With no token the request goes out
/// unauthenticated and is expected to fail downstream.
#[derive(Debug, Clone)]
pub struct RequestAuthorizer {
    tokens: Arc<TokenState>,
}

impl RequestAuthorizer {
    pub fn new(tokens: Arc<TokenState>) -> Self {
        Self { tokens }
    }

    pub fn authorize(&self, request: &ApiRequest) -> PreparedRequest {
        let exempt = request.is_credential_exempt();
        let mut prepared = request.clone().prepare();

        if exempt || prepared.headers.contains_key(AUTHORIZATION) {
            return prepared;
        }

        match self.tokens.get() {
            Some(token) => match bearer_value(&token) {
                Ok(value) => {
                    prepared.headers.insert(AUTHORIZATION, value);
                }
                Err(e) => warn!(error = %e, "Sending request without credential"),
            },
            None => trace!(path = %prepared.path, "No access token, sending unauthenticated"),
        }
        prepared
    }
}
