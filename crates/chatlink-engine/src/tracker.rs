use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use thiserror::Error;
use tokio::{
    sync::{Notify, oneshot},
    task::JoinHandle,
    time::{self, Duration, Instant},
};
use tracing::debug;

/// Errors surfaced by the request tracker.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// A send request for this message id is already pending.
    #[error("send request for message '{0}' is already pending")]
    DuplicateRequest(String),
    /// No confirmation arrived within the registered timeout.
    #[error("send request for message '{0}' timed out")]
    Timeout(String),
    /// The tracker was dropped before the request resolved.
    #[error("request tracker closed before the request resolved")]
    Closed,
}

struct PendingRequest {
    complete: oneshot::Sender<Result<(), TrackerError>>,
    expiry: JoinHandle<()>,
}

/// Completion handle returned by [`RequestTracker::register`].
#[derive(Debug)]
pub struct SendReceipt {
    done: oneshot::Receiver<Result<(), TrackerError>>,
}

impl SendReceipt {
    /// Wait for the send to be confirmed or time out.
    pub async fn wait(self) -> Result<(), TrackerError> {
        match self.done.await {
            Ok(outcome) => outcome,
            Err(_) => Err(TrackerError::Closed),
        }
    }
}

/// Registry of in-flight send operations awaiting backend confirmation.
///
/// The backend does not return a synchronous id/ack mapping for sends; it
/// echoes the message id later through an independent event channel. The
/// tracker turns that racy echo into a bounded wait with exactly-once
/// resolution: the registry's atomic remove decides whether a confirmation or
/// the expiry timer wins, never both.
#[derive(Clone, Default)]
pub struct RequestTracker {
    pending: Arc<DashMap<String, PendingRequest>>,
    registered: Arc<Notify>,
}

impl RequestTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a send awaiting confirmation for `message_id`.
    ///
    /// Fails with [`TrackerError::DuplicateRequest`] when an entry for the id
    /// already exists. The returned receipt completes when the confirmation
    /// is observed, or with [`TrackerError::Timeout`] after `timeout`.
    pub fn register(
        &self,
        message_id: &str,
        timeout: Duration,
    ) -> Result<SendReceipt, TrackerError> {
        let (complete, done) = oneshot::channel();

        match self.pending.entry(message_id.to_owned()) {
            Entry::Occupied(_) => {
                return Err(TrackerError::DuplicateRequest(message_id.to_owned()));
            }
            Entry::Vacant(slot) => {
                let expiry = tokio::spawn(expire_after(
                    Arc::clone(&self.pending),
                    message_id.to_owned(),
                    timeout,
                ));
                slot.insert(PendingRequest { complete, expiry });
            }
        }

        self.registered.notify_waiters();
        debug!(message_id, timeout_ms = timeout.as_millis() as u64, "send registered");
        Ok(SendReceipt { done })
    }

    /// Complete the pending send for `message_id`, if one exists.
    ///
    /// Returns `false` when no request is pending; the caller treats that as
    /// "this confirmation belongs to an externally initiated event".
    pub fn resolve(&self, message_id: &str) -> bool {
        match self.pending.remove(message_id) {
            Some((_, request)) => {
                request.expiry.abort();
                let _ = request.complete.send(Ok(()));
                debug!(message_id, "send confirmed");
                true
            }
            None => false,
        }
    }

    /// Resolve the pending send for `message_id`, waiting up to `grace` for a
    /// late registration.
    ///
    /// Confirmation events can beat the registration that follows the send
    /// call; this bounded wait lets the registration win that race without a
    /// fixed delay.
    pub async fn resolve_within(&self, message_id: &str, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            // Enable the waiter before checking so a registration racing
            // with the check cannot be missed; `notified()` alone does not
            // watch for notifications until first polled.
            let mut registered = std::pin::pin!(self.registered.notified());
            registered.as_mut().enable();
            if self.resolve(message_id) {
                return true;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            if time::timeout(remaining, registered).await.is_err() {
                return self.resolve(message_id);
            }
        }
    }

    /// Whether a request is currently pending for `message_id`.
    pub fn is_pending(&self, message_id: &str) -> bool {
        self.pending.contains_key(message_id)
    }
}

async fn expire_after(
    pending: Arc<DashMap<String, PendingRequest>>,
    message_id: String,
    timeout: Duration,
) {
    time::sleep(timeout).await;
    if let Some((_, request)) = pending.remove(&message_id) {
        debug!(message_id = %message_id, "send expired before confirmation");
        let _ = request.complete.send(Err(TrackerError::Timeout(message_id)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_duplicate_registration() {
        let tracker = RequestTracker::new();
        let _receipt = tracker
            .register("m1", Duration::from_secs(1))
            .expect("first registration should work");

        let err = tracker
            .register("m1", Duration::from_secs(1))
            .expect_err("second registration must fail");
        assert_eq!(err, TrackerError::DuplicateRequest("m1".into()));

        // A different id is not blocked.
        tracker
            .register("m2", Duration::from_secs(1))
            .expect("distinct id should register");
    }

    #[tokio::test]
    async fn times_out_unconfirmed_sends() {
        let tracker = RequestTracker::new();
        let receipt = tracker
            .register("m1", Duration::from_millis(50))
            .expect("registration should work");

        let outcome = receipt.wait().await;
        assert_eq!(outcome, Err(TrackerError::Timeout("m1".into())));
        // The expired entry is gone; a late confirmation finds nothing.
        assert!(!tracker.resolve("m1"));
        assert!(!tracker.is_pending("m1"));
    }

    #[tokio::test]
    async fn resolve_completes_receipt_and_cancels_expiry() {
        let tracker = RequestTracker::new();
        let receipt = tracker
            .register("m1", Duration::from_millis(1_000))
            .expect("registration should work");

        assert!(tracker.resolve("m1"));
        assert_eq!(receipt.wait().await, Ok(()));
        assert!(!tracker.is_pending("m1"));

        // Resolving again is a no-op, not an error.
        assert!(!tracker.resolve("m1"));
    }

    #[tokio::test]
    async fn resolve_within_waits_for_late_registration() {
        let tracker = RequestTracker::new();

        let late = tracker.clone();
        let register_task = tokio::spawn(async move {
            time::sleep(Duration::from_millis(30)).await;
            late.register("m1", Duration::from_secs(5))
                .expect("late registration should work")
        });

        let started = Instant::now();
        assert!(tracker.resolve_within("m1", Duration::from_secs(10)).await);
        // The wait wakes on the registration notification, not the grace
        // deadline.
        assert!(started.elapsed() < Duration::from_secs(5));
        let receipt = register_task.await.expect("register task should finish");
        assert_eq!(receipt.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn resolve_within_gives_up_after_grace() {
        let tracker = RequestTracker::new();
        let started = Instant::now();
        assert!(!tracker.resolve_within("m1", Duration::from_millis(40)).await);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn concurrent_resolvers_win_exactly_once() {
        let tracker = RequestTracker::new();
        let receipt = tracker
            .register("m1", Duration::from_secs(60))
            .expect("registration should work");

        let a = tracker.clone();
        let b = tracker.clone();
        let (won_a, won_b) = tokio::join!(
            tokio::spawn(async move { a.resolve("m1") }),
            tokio::spawn(async move { b.resolve("m1") }),
        );
        let wins = [won_a.expect("task a"), won_b.expect("task b")]
            .iter()
            .filter(|won| **won)
            .count();

        assert_eq!(wins, 1);
        assert_eq!(receipt.wait().await, Ok(()));
    }
}
