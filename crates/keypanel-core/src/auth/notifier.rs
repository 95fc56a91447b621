//! One-shot "session expired" broadcast.
//!
//! Observers register callbacks; when the session cannot be recovered the
//! notifier fires each of them once. Further emissions are ignored until a
//! successful login calls [`SessionExpiredNotifier::reset`].
//!
//! Delivery happens on a designated foreground context when one is attached
//! (see [`foreground_channel`]), otherwise directly on the emitting thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Callback invoked when the session expires.
/// Identity is the `Arc` allocation: clone the `Arc` to remove it later.
pub type SessionListener = Arc<dyn Fn() + Send + Sync>;

type Job = Box<dyn FnOnce() + Send>;

/// Sending half of the foreground queue, held by the notifier
#[derive(Clone)]
pub struct ForegroundHandle {
    tx: mpsc::UnboundedSender<Job>,
}

/// Receiving half of the foreground queue.
///
/// Owned by the application's single foreground loop, which drains it with
/// [`ForegroundContext::run_pending`] or [`ForegroundContext::run_next`].
pub struct ForegroundContext {
    rx: mpsc::UnboundedReceiver<Job>,
}

pub fn foreground_channel() -> (ForegroundHandle, ForegroundContext) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ForegroundHandle { tx }, ForegroundContext { rx })
}

impl ForegroundContext {
    /// Run every queued callback without waiting. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait for the next callback and run it.
    /// Returns `false` once every handle has been dropped.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }
}

fn same_listener(a: &SessionListener, b: &SessionListener) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

pub struct SessionExpiredNotifier {
    listeners: Mutex<Vec<SessionListener>>,
    emitted: AtomicBool,
    foreground: Option<ForegroundHandle>,
}

impl SessionExpiredNotifier {
    /// Notifier that calls listeners directly on the emitting thread
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            emitted: AtomicBool::new(false),
            foreground: None,
        }
    }

    /// Notifier that queues listener calls onto a foreground context
    pub fn with_foreground(handle: ForegroundHandle) -> Self {
        Self {
            foreground: Some(handle),
            ..Self::new()
        }
    }

    /// Register a listener. Returns `false` if it was already registered.
    pub fn add_listener(&self, listener: &SessionListener) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if listeners.iter().any(|l| same_listener(l, listener)) {
            return false;
        }
        listeners.push(Arc::clone(listener));
        true
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, listener: &SessionListener) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Fire the session-expired notification.
    ///
    /// Only the first call since the last [`reset`](Self::reset) delivers
    /// anything; it returns `true`. Later calls are no-ops returning `false`.
    pub fn emit(&self) -> bool {
        if self
            .emitted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Session expiry already broadcast, skipping");
            return false;
        }

        let snapshot: Vec<SessionListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        info!(listeners = snapshot.len(), "Broadcasting session expiry");

        for listener in snapshot {
            match &self.foreground {
                Some(handle) => {
                    let job: Job = Box::new(move || (*listener)());
                    if let Err(mpsc::error::SendError(job)) = handle.tx.send(job) {
                        warn!("Foreground context is gone, delivering session expiry inline");
                        job();
                    }
                }
                None => (*listener)(),
            }
        }
        true
    }

    /// Re-arm the notifier after a fresh successful login
    pub fn reset(&self) {
        self.emitted.store(false, Ordering::Release);
    }

    pub fn has_emitted(&self) -> bool {
        self.emitted.load(Ordering::Acquire)
    }
}

impl Default for SessionExpiredNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionExpiredNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionExpiredNotifier")
            .field("listeners", &self.listener_count())
            .field("emitted", &self.has_emitted())
            .field("foreground", &self.foreground.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn counting_listener() -> (SessionListener, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        let listener: SessionListener = Arc::new(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        (listener, count)
    }

    #[test]
    fn test_emit_fires_each_listener_once() {
        let notifier = SessionExpiredNotifier::new();
        let (first, first_count) = counting_listener();
        let (second, second_count) = counting_listener();
        notifier.add_listener(&first);
        notifier.add_listener(&second);

        assert!(notifier.emit());
        assert!(!notifier.emit());
        assert!(!notifier.emit());

        assert_eq!(first_count.load(Ordering::SeqCst), 1);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_add_is_identity_based_and_idempotent() {
        let notifier = SessionExpiredNotifier::new();
        let (listener, count) = counting_listener();

        assert!(notifier.add_listener(&listener));
        assert!(!notifier.add_listener(&listener));
        assert!(!notifier.add_listener(&Arc::clone(&listener)));
        assert_eq!(notifier.listener_count(), 1);

        notifier.emit();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_identical_closures_are_distinct_listeners() {
        let notifier = SessionExpiredNotifier::new();
        let a: SessionListener = Arc::new(|| {});
        let b: SessionListener = Arc::new(|| {});
        assert!(notifier.add_listener(&a));
        assert!(notifier.add_listener(&b));
        assert_eq!(notifier.listener_count(), 2);
    }

    #[test]
    fn test_removed_listener_is_not_called() {
        let notifier = SessionExpiredNotifier::new();
        let (listener, count) = counting_listener();
        notifier.add_listener(&listener);

        assert!(notifier.remove_listener(&listener));
        assert!(!notifier.remove_listener(&listener));

        notifier.emit();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reset_allows_new_emission() {
        let notifier = SessionExpiredNotifier::new();
        let (listener, count) = counting_listener();
        notifier.add_listener(&listener);

        notifier.emit();
        assert!(notifier.has_emitted());
        notifier.reset();
        assert!(!notifier.has_emitted());
        assert!(notifier.emit());

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_emit_delivers_once() {
        let notifier = Arc::new(SessionExpiredNotifier::new());
        let (listener, count) = counting_listener();
        notifier.add_listener(&listener);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let notifier = Arc::clone(&notifier);
                thread::spawn(move || notifier.emit())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|emitted| *emitted)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_foreground_delivery_waits_for_drain() {
        let (handle, mut context) = foreground_channel();
        let notifier = SessionExpiredNotifier::with_foreground(handle);
        let (listener, count) = counting_listener();
        notifier.add_listener(&listener);

        notifier.emit();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert_eq!(context.run_pending(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(context.run_pending(), 0);
    }

    #[test]
    fn test_dropped_foreground_falls_back_to_inline() {
        let (handle, context) = foreground_channel();
        drop(context);
        let notifier = SessionExpiredNotifier::with_foreground(handle);
        let (listener, count) = counting_listener();
        notifier.add_listener(&listener);

        notifier.emit();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_next_reports_closed_channel() {
        let (handle, mut context) = foreground_channel();
        let notifier = SessionExpiredNotifier::with_foreground(handle);
        let (listener, count) = counting_listener();
        notifier.add_listener(&listener);
        notifier.emit();

        assert!(context.run_next().await);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        drop(notifier);
        assert!(!context.run_next().await);
    }
}
