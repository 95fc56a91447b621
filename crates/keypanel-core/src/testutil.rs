//! Shared test helpers for the `#[cfg(test)]` modules in this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::api::{ApiError, PreparedRequest, RawResponse, Transport};
use crate::auth::{MemorySessionStore, SessionContext, SessionExpiredNotifier};

/// What a scripted route answers with
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    /// Transport-level failure (connection reset, DNS, ...)
    Fail(String),
}

impl Reply {
    pub fn ok(data: Value) -> Self {
        Reply::Status(200, json!({"status": "success", "data": data}).to_string())
    }

    pub fn unauthorized() -> Self {
        Reply::Status(401, json!({"status": "error", "message": "Unauthorized"}).to_string())
    }

    pub fn status(code: u16) -> Self {
        Reply::Status(code, json!({"status": "error"}).to_string())
    }

    /// Successful refresh exchange payload
    pub fn refreshed(access: &str, refresh: Option<&str>) -> Self {
        match refresh {
            Some(refresh) => Reply::ok(json!({"token": access, "refresh_token": refresh})),
            None => Reply::ok(json!({"token": access})),
        }
    }
}

type Handler = Box<dyn Fn(&PreparedRequest) -> Reply + Send + Sync>;

/// In-memory transport that records every request and answers per path.
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Handler>>,
    sent: Mutex<Vec<PreparedRequest>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering, so concurrent callers overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn route<F>(self, path: &str, handler: F) -> Self
    where
        F: Fn(&PreparedRequest) -> Reply + Send + Sync + 'static,
    {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Box::new(handler));
        self
    }

    /// Answer with `replies` in order; the last one repeats
    pub fn script(self, path: &str, replies: Vec<Reply>) -> Self {
        assert!(!replies.is_empty(), "script needs at least one reply");
        let next = AtomicUsize::new(0);
        self.route(path, move |_| {
            let i = next.fetch_add(1, Ordering::SeqCst).min(replies.len() - 1);
            replies[i].clone()
        })
    }

    /// Protected resource that only accepts the given bearer tokens
    pub fn protected(self, path: &str, accepted: &[&str]) -> Self {
        let accepted: Vec<String> = accepted.iter().map(|t| t.to_string()).collect();
        self.route(path, move |req| match req.bearer_token() {
            Some(token) if accepted.iter().any(|a| a == token) => Reply::ok(json!({"ok": true})),
            _ => Reply::unauthorized(),
        })
    }

    pub fn sent(&self) -> Vec<PreparedRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, path: &str) -> Vec<PreparedRequest> {
        self.sent().into_iter().filter(|r| r.path == path).collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.sent_to(path).len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: PreparedRequest) -> Result<RawResponse, ApiError> {
        self.sent.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = match self.routes.lock().unwrap().get(&request.path) {
            Some(handler) => handler(&request),
            None => Reply::status(404),
        };
        match reply {
            Reply::Status(code, body) => Ok(RawResponse::new(
                StatusCode::from_u16(code).unwrap(),
                body,
            )),
            Reply::Fail(reason) => Err(ApiError::Transport(reason)),
        }
    }
}

/// Session backed by a memory store holding the given tokens
pub fn session_with_tokens(access: &str, refresh: &str) -> Arc<SessionContext> {
    Arc::new(SessionContext::restore(
        Arc::new(MemorySessionStore::with_tokens(access, refresh)),
        Arc::new(SessionExpiredNotifier::new()),
    ))
}

/// Listener that counts its invocations
pub fn counting_listener(session: &SessionContext) -> (crate::auth::SessionListener, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let listener: crate::auth::SessionListener = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    session.notifier().add_listener(&listener);
    (listener, hits)
}
