//! Correlation table for request/response calls awaiting an ack.
//!
//! Registration and bulk failure share one lock, and the table is *closed*
//! whenever the connection is down: a call can never register after the
//! connection task has already failed everything outstanding.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::ClientError;

/// Outcome delivered to a waiting call: the ack payload, or the reason it
/// will never arrive.
pub type AckOutcome = Result<serde_json::Value, ClientError>;

#[derive(Debug, Default)]
struct Table {
    open: bool,
    next_id: u64,
    waiting: HashMap<u64, oneshot::Sender<AckOutcome>>,
}

/// Pending acknowledgments keyed by correlation id.
#[derive(Debug, Default)]
pub struct PendingAcks {
    table: Mutex<Table>,
}

impl PendingAcks {
    /// Creates a closed, empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates a correlation id and the receiver its ack will arrive on.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] while the table is closed.
    pub fn register(&self) -> Result<(u64, oneshot::Receiver<AckOutcome>), ClientError> {
        let mut table = self.lock();
        if !table.open {
            return Err(ClientError::NotConnected);
        }
        table.next_id = table.next_id.wrapping_add(1);
        let id = table.next_id;
        let (tx, rx) = oneshot::channel();
        table.waiting.insert(id, tx);
        Ok((id, rx))
    }

    /// Resolves the call waiting on `id`. Returns `false` for unknown ids
    /// (late acks after a timeout, or acks the server invented).
    pub fn resolve(&self, id: u64, outcome: AckOutcome) -> bool {
        let waiter = self.lock().waiting.remove(&id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Forgets `id` without resolving it.
    pub fn cancel(&self, id: u64) {
        self.lock().waiting.remove(&id);
    }

    /// Accepts registrations.
    pub fn open(&self) {
        self.lock().open = true;
    }

    /// Refuses registrations and fails every waiting call with
    /// [`ClientError::ConnectionLost`]. Returns how many were failed.
    pub fn close(&self) -> usize {
        let drained: Vec<_> = {
            let mut table = self.lock();
            table.open = false;
            table.waiting.drain().map(|(_, tx)| tx).collect()
        };
        let count = drained.len();
        for tx in drained {
            let _ = tx.send(Err(ClientError::ConnectionLost));
        }
        count
    }

    /// Returns the number of calls awaiting an ack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().waiting.len()
    }

    /// Returns `true` if no call awaits an ack.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().waiting.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn closed_table_refuses_registration() {
        let acks = PendingAcks::new();
        assert!(matches!(acks.register(), Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn resolve_delivers_payload() {
        let acks = PendingAcks::new();
        acks.open();
        let Ok((id, rx)) = acks.register() else {
            panic!("registration should succeed");
        };
        assert!(acks.resolve(id, Ok(serde_json::json!({"roomId": "room-42"}))));
        let Ok(Ok(payload)) = rx.await else {
            panic!("payload expected");
        };
        assert_eq!(payload.get("roomId"), Some(&serde_json::json!("room-42")));
        assert!(acks.is_empty());
    }

    #[test]
    fn ids_are_unique() {
        let acks = PendingAcks::new();
        acks.open();
        let (Ok((a, _rx_a)), Ok((b, _rx_b))) = (acks.register(), acks.register()) else {
            panic!("registration should succeed");
        };
        assert_ne!(a, b);
        assert_eq!(acks.len(), 2);
    }

    #[tokio::test]
    async fn close_fails_waiters_and_blocks_new_ones() {
        let acks = PendingAcks::new();
        acks.open();
        let Ok((_, rx)) = acks.register() else {
            panic!("registration should succeed");
        };
        assert_eq!(acks.close(), 1);
        assert!(matches!(rx.await, Ok(Err(ClientError::ConnectionLost))));
        assert!(matches!(acks.register(), Err(ClientError::NotConnected)));
    }

    #[test]
    fn unknown_and_cancelled_ids_are_not_resolved() {
        let acks = PendingAcks::new();
        acks.open();
        assert!(!acks.resolve(99, Ok(serde_json::Value::Null)));
        let Ok((id, _rx)) = acks.register() else {
            panic!("registration should succeed");
        };
        acks.cancel(id);
        assert!(!acks.resolve(id, Ok(serde_json::Value::Null)));
    }
}
