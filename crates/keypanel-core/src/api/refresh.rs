//! Recovery from expired access tokens.
//!
//! When a request comes back 401 the [`RefreshCoordinator`] decides, for that
//! one request chain, whether a refresh exchange is worth attempting. A
//! successful exchange updates the session and yields a replay of the failed
//! request; any other outcome forces a logout and lets the 401 surface.
//!
//! The coordinator keeps no state between invocations. Concurrent failures
//! each run their own exchange; the session's atomic writes make the last
//! successful exchange win.

use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::request::ApiRequest;
use super::transport::{ResponseClass, Transport};
use crate::auth::SessionContext;
use crate::models::{RefreshRequest, RefreshResponse};

pub const REFRESH_PATH: &str = "api/refresh";

/// Number of attempts in one request chain after which refresh is abandoned
pub const DEFAULT_MAX_AUTH_ATTEMPTS: u32 = 3;

/// Lifecycle of one recovery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    AwaitingRefresh,
    Recovered,
    GivingUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GiveUpReason {
    /// The chain already used up its attempts
    AttemptsExhausted { attempts: u32 },
    /// The failing request was itself credential-exempt
    ExemptRequest,
    MissingRefreshToken,
    /// The refresh endpoint answered with a non-success status
    Rejected(StatusCode),
    /// The exchange succeeded but carried no usable access token
    EmptyAccessToken,
    /// Network failure or unreadable response
    ExchangeFailed(String),
    /// Another request chain ended the session while the exchange was in flight
    SessionExpired,
}

/// What the caller should do with the failed request
#[derive(Debug, Clone)]
pub enum Recovery {
    /// Resend this request; it carries the new credential
    Replay(ApiRequest),
    /// Let the authorization failure surface. The session has been wiped.
    GiveUp(GiveUpReason),
}

impl Recovery {
    pub fn state(&self) -> RefreshState {
        match self {
            Recovery::Replay(_) => RefreshState::Recovered,
            Recovery::GiveUp(_) => RefreshState::GivingUp,
        }
    }
}

/// Tracks the state of a single `recover` call for logging
struct RecoveryRun {
    state: RefreshState,
    attempt: u32,
}

impl RecoveryRun {
    fn enter(&mut self, next: RefreshState) {
        debug!(attempt = self.attempt, from = ?self.state, to = ?next, "Refresh state transition");
        self.state = next;
    }
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    /// Raw transport, never the intercepting client, so a failing refresh
    /// cannot trigger another refresh.
    transport: Arc<dyn Transport>,
    session: Arc<SessionContext>,
    max_attempts: u32,
}

impl RefreshCoordinator {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<SessionContext>) -> Self {
        Self {
            transport,
            session,
            max_attempts: DEFAULT_MAX_AUTH_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Handle a 401 for `failed`, the `attempt`-th send of its chain (1-based).
    ///
    /// Never returns an error: every failure degrades to
    /// [`Recovery::GiveUp`] after the forced logout has completed.
    pub async fn recover(&self, failed: &ApiRequest, attempt: u32) -> Recovery {
        let mut run = RecoveryRun {
            state: RefreshState::Idle,
            attempt,
        };

        if attempt >= self.max_attempts {
            return self.give_up(&mut run, GiveUpReason::AttemptsExhausted { attempts: attempt });
        }
        if failed.is_credential_exempt() {
            return self.give_up(&mut run, GiveUpReason::ExemptRequest);
        }
        let refresh_token = match self.session.refresh_token() {
            Some(token) => token,
            None => return self.give_up(&mut run, GiveUpReason::MissingRefreshToken),
        };

        run.enter(RefreshState::AwaitingRefresh);
        let refreshed = match self.exchange(&refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(reason) => return self.give_up(&mut run, reason),
        };

        // Checked by exchange(); the empty case is a give-up there
        let access_token = refreshed.access_token().unwrap_or_default();
        let replay = match failed.with_bearer(access_token) {
            Ok(replay) => replay,
            Err(e) => {
                return self.give_up(&mut run, GiveUpReason::ExchangeFailed(e.to_string()));
            }
        };

        if !self
            .session
            .apply_refresh(access_token, refreshed.rotated_refresh_token())
        {
            return self.give_up(&mut run, GiveUpReason::SessionExpired);
        }
        run.enter(RefreshState::Recovered);
        info!(path = %failed.path, attempt, "Access token refreshed, replaying request");
        Recovery::Replay(replay)
    }

    /// Exchange the refresh credential for a new token pair
    async fn exchange(&self, refresh_token: &str) -> Result<RefreshResponse, GiveUpReason> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        let request = ApiRequest::post(REFRESH_PATH, &body)
            .map_err(|e| GiveUpReason::ExchangeFailed(e.to_string()))?
            .credential_exempt();

        let response = self
            .transport
            .send(request.prepare())
            .await
            .map_err(|e| GiveUpReason::ExchangeFailed(e.to_string()))?;

        if response.class() != ResponseClass::Success {
            return Err(GiveUpReason::Rejected(response.status));
        }

        let refreshed = response
            .envelope::<RefreshResponse>()
            .map_err(|e| GiveUpReason::ExchangeFailed(e.to_string()))?
            .data
            .unwrap_or_default();

        if refreshed.access_token().is_none() {
            return Err(GiveUpReason::EmptyAccessToken);
        }
        Ok(refreshed)
    }

    fn give_up(&self, run: &mut RecoveryRun, reason: GiveUpReason) -> Recovery {
        run.enter(RefreshState::GivingUp);
        warn!(attempt = run.attempt, reason = ?reason, "Cannot recover session");
        self.session.force_logout();
        Recovery::GiveUp(reason)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}
