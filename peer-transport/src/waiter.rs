//! The one-shot waiter primitive backing `pending[request_id]`.

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::TransportError;

type Outcome = Result<String, TransportError>;

/// A single-producer-single-consumer one-shot slot. The calling task
/// (`do_post`) holds the receiver; the inbound dispatch path (or `close`)
/// holds an `Arc<Waiter>` and calls [`Waiter::complete_ok`] or
/// [`Waiter::complete_err`].
///
/// A second completion call is a silent no-op: the underlying
/// [`oneshot::Sender`] lives behind a lock-guarded `Option` that is taken
/// exactly once.
pub(crate) struct Waiter {
    tx: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl Waiter {
    /// Creates a new waiter and its matching receiver.
    pub(crate) fn new() -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Completes the waiter with a successful payload. No-op if already completed.
    pub(crate) fn complete_ok(&self, payload: String) {
        self.complete(Ok(payload));
    }

    /// Completes the waiter with an error. No-op if already completed.
    pub(crate) fn complete_err(&self, err: TransportError) {
        self.complete(Err(err));
    }

    fn complete(&self, outcome: Outcome) {
        if let Some(tx) = self.tx.lock().take() {
            // The receiver may already be gone (e.g. `do_post` timed out
            // and dropped it); that is not our problem to report.
            let _ = tx.send(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_completion_is_a_silent_no_op() {
        let (waiter, rx) = Waiter::new();
        waiter.complete_ok("first".to_string());
        waiter.complete_err(TransportError::SessionClosed);
        assert_eq!(rx.await.expect("sent").expect("ok"), "first");
    }

    #[tokio::test]
    async fn propagates_errors() {
        let (waiter, rx) = Waiter::new();
        waiter.complete_err(TransportError::ReadTimeout);
        assert!(matches!(rx.await.expect("sent"), Err(TransportError::ReadTimeout)));
    }
}
