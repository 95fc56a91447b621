//! Authenticated client for the panel REST API.
//!
//! [`SessionClient`] runs every request through the authorizer, sends it,
//! and on a 401 asks the [`RefreshCoordinator`] for a replay. Login, logout
//! and the refresh exchange itself bypass that loop and go straight to the
//! transport.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::authorizer::RequestAuthorizer;
use super::refresh::{Recovery, RefreshCoordinator};
use super::request::ApiRequest;
use super::transport::{HttpTransport, RawResponse, ResponseClass, Transport};
use super::ApiError;
use crate::auth::{SessionContext, SessionRecord};
use crate::config::Config;
use crate::models::{Envelope, LoginRequest, RefreshRequest, User};

const LOGIN_PATH: &str = "api/login";
const LOGOUT_PATH: &str = "api/logout";
const PROFILE_PATH: &str = "api/profile";

/// Clone is cheap; clones share the transport and the session.
#[derive(Clone)]
pub struct SessionClient {
    transport: Arc<dyn Transport>,
    session: Arc<SessionContext>,
    authorizer: RequestAuthorizer,
    coordinator: RefreshCoordinator,
}

impl SessionClient {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<SessionContext>) -> Self {
        let authorizer = RequestAuthorizer::new(Arc::clone(session.tokens()));
        let coordinator = RefreshCoordinator::new(Arc::clone(&transport), Arc::clone(&session));
        Self {
            transport,
            session,
            authorizer,
            coordinator,
        }
    }

    /// Client talking HTTP to the configured panel
    pub fn from_config(config: &Config, session: Arc<SessionContext>) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        debug!(base_url = %transport.base_url(), "HTTP transport ready");
        Ok(Self::new(Arc::new(transport), session).with_max_auth_attempts(config.max_auth_attempts))
    }

    pub fn with_max_auth_attempts(mut self, max_attempts: u32) -> Self {
        self.coordinator = self.coordinator.with_max_attempts(max_attempts);
        self
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Send a request, transparently recovering from an expired access token.
    ///
    /// Non-auth failures are returned as classified errors without retry.
    /// An unrecoverable 401 returns [`ApiError::Unauthorized`] after the
    /// session has been wiped and observers notified.
    pub async fn execute(&self, request: ApiRequest) -> Result<RawResponse, ApiError> {
        let mut request = request;
        let mut attempt: u32 = 1;

        loop {
            let prepared = self.authorizer.authorize(&request);
            let response = self.transport.send(prepared).await?;

            match response.class() {
                ResponseClass::Success => return Ok(response),
                ResponseClass::Failure => {
                    debug!(path = %request.path, status = response.status.as_u16(), "Request failed");
                    return Err(ApiError::from_status(response.status, &response.body));
                }
                ResponseClass::AuthorizationFailure => {
                    debug!(path = %request.path, attempt, "Request rejected with 401");
                    match self.coordinator.recover(&request, attempt).await {
                        Recovery::Replay(replay) => {
                            request = replay;
                            attempt += 1;
                        }
                        Recovery::GiveUp(_) => return Err(ApiError::Unauthorized),
                    }
                }
            }
        }
    }

    /// Execute and decode the response envelope
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<Envelope<T>, ApiError> {
        self.execute(request).await?.envelope()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, ApiError> {
        self.execute_json(ApiRequest::get(path)).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>, ApiError> {
        self.execute_json(ApiRequest::post(path, body)?).await
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>, ApiError> {
        self.execute_json(ApiRequest::put(path, body)?).await
    }

    pub async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, ApiError> {
        self.execute_json(ApiRequest::delete(path)).await
    }

    // ===== Session lifecycle =====

    /// Authenticate and establish a new session.
    ///
    /// Sent credential-exempt on the raw transport: a wrong password comes
    /// back as `Unauthorized` without disturbing any existing session.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, ApiError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let request = ApiRequest::post(LOGIN_PATH, &body)?.credential_exempt();

        let response = self
            .transport
            .send(request.prepare())
            .await?
            .error_for_status()?;
        let user: User = response.envelope()?.into_data()?;

        let access_token = user
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("Login response carried no token".into()))?;

        self.session.establish(
            &SessionRecord::from_user(&user),
            access_token,
            user.refresh_token.as_deref(),
        );
        info!(user_id = user.user_id, "Login successful");
        Ok(user)
    }

    /// End the session. The server is told on a best-effort basis; local
    /// credentials are wiped regardless and no expiry is broadcast.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = match self.session.refresh_token() {
            Some(refresh_token) => self.revoke(refresh_token).await,
            None => Ok(()),
        };
        if let Err(ref e) = result {
            warn!(error = %e, "Server-side logout failed, clearing local session anyway");
        }
        self.session.logout();
        result
    }

    async fn revoke(&self, refresh_token: String) -> Result<(), ApiError> {
        let request =
            ApiRequest::post(LOGOUT_PATH, &RefreshRequest { refresh_token })?.credential_exempt();
        self.transport
            .send(request.prepare())
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn profile(&self) -> Result<User, ApiError> {
        self.get_json::<User>(PROFILE_PATH).await?.into_data()
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("session", &self.session)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}
