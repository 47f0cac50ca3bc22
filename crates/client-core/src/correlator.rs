//! Command/result correlation
//!
//! Each transaction id owns one oneshot slot. The sending half is resolved
//! at most once; the receiving half is handed to at most one waiter. The
//! timeout that guarantees a result is armed by [`EventBus::begin_transaction`].
//!
//! [`EventBus::begin_transaction`]: crate::events::EventBus::begin_transaction

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;

use crate::call::TransactionId;
use crate::error::{ClientError, ClientResult};
use crate::events::ActionResult;

#[derive(Clone)]
pub struct Correlator {
    pending: Arc<DashMap<TransactionId, oneshot::Sender<ActionResult>>>,
    waiters: Arc<DashMap<TransactionId, oneshot::Receiver<ActionResult>>>,
    timeout: Duration,
}

impl Correlator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            waiters: Arc::new(DashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Open a slot for `transaction_id`. Returns `false` if one is already open
    /// or waiting to be consumed.
    pub fn register(&self, transaction_id: TransactionId) -> bool {
        if self.pending.contains_key(&transaction_id) || self.waiters.contains_key(&transaction_id) {
            return false;
        }
        let (tx, rx) = oneshot::channel();
        self.pending.insert(transaction_id, tx);
        self.waiters.insert(transaction_id, rx);
        debug!(transaction_id = %transaction_id, "Transaction registered");
        true
    }

    /// Deliver the result for its transaction.
    ///
    /// Returns `false` when the transaction is unknown or already resolved;
    /// such results are dropped.
    pub fn resolve(&self, result: ActionResult) -> bool {
        let transaction_id = result.transaction_id;
        match self.pending.remove(&transaction_id) {
            Some((_, tx)) => {
                // A dropped receiver means the waiter gave up; the result still counts.
                let _ = tx.send(result);
                true
            }
            None => {
                debug!(transaction_id = %transaction_id, "Dropping late or unknown result");
                false
            }
        }
    }

    /// Wait for the result of `transaction_id`. Only the first caller gets it.
    pub async fn wait(&self, transaction_id: TransactionId) -> ClientResult<ActionResult> {
        let rx = self
            .waiters
            .remove(&transaction_id)
            .map(|(_, rx)| rx)
            .ok_or(ClientError::UnknownTransaction { transaction_id })?;

        rx.await
            .map_err(|_| ClientError::channel_closed("transaction slot dropped without a result"))
    }

    /// Drop every trace of a transaction, resolved or not. Returns whether
    /// anything was still held.
    pub fn discard(&self, transaction_id: &TransactionId) -> bool {
        let pending = self.pending.remove(transaction_id).is_some();
        let waiter = self.waiters.remove(transaction_id).is_some();
        pending || waiter
    }

    /// Whether the id was registered and its result has not been consumed
    pub fn is_registered(&self, transaction_id: &TransactionId) -> bool {
        self.pending.contains_key(transaction_id) || self.waiters.contains_key(transaction_id)
    }

    /// Number of transactions still awaiting a result
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ActionOutcome;

    fn ok(transaction_id: TransactionId) -> ActionResult {
        ActionResult {
            transaction_id,
            call_id: None,
            result: Ok(ActionOutcome::HungUp),
        }
    }

    #[tokio::test]
    async fn result_reaches_single_waiter() {
        let correlator = Correlator::new(Duration::from_secs(10));
        let tid = TransactionId::new_v4();
        assert!(correlator.register(tid));
        assert!(!correlator.register(tid));
        assert_eq!(correlator.pending_count(), 1);

        assert!(correlator.resolve(ok(tid)));
        assert!(!correlator.resolve(ok(tid)));
        assert_eq!(correlator.pending_count(), 0);
        assert!(correlator.is_registered(&tid));

        let result = correlator.wait(tid).await.unwrap();
        assert_eq!(result.transaction_id, tid);
        assert!(!correlator.is_registered(&tid));

        let err = correlator.wait(tid).await.unwrap_err();
        assert_eq!(err, ClientError::UnknownTransaction { transaction_id: tid });
    }

    #[tokio::test]
    async fn waiter_registered_before_result() {
        let correlator = Correlator::new(Duration::from_secs(10));
        let tid = TransactionId::new_v4();
        correlator.register(tid);

        let waiting = {
            let correlator = correlator.clone();
            tokio::spawn(async move { correlator.wait(tid).await })
        };
        tokio::task::yield_now().await;
        correlator.resolve(ok(tid));

        let result = waiting.await.unwrap().unwrap();
        assert!(result.result.is_ok());
    }

    #[test]
    fn wait_stays_pending_until_resolved() {
        use tokio_test::{assert_pending, assert_ready, task};

        let correlator = Correlator::new(Duration::from_secs(10));
        let tid = TransactionId::new_v4();
        correlator.register(tid);

        let mut waiting = task::spawn(correlator.wait(tid));
        assert_pending!(waiting.poll());
        assert_pending!(waiting.poll());

        correlator.resolve(ok(tid));
        assert!(waiting.is_woken());
        let result = assert_ready!(waiting.poll()).unwrap();
        assert_eq!(result.transaction_id, tid);
    }

    #[tokio::test]
    async fn discarded_transaction_is_forgotten() {
        let correlator = Correlator::new(Duration::from_secs(10));
        let tid = TransactionId::new_v4();
        correlator.register(tid);
        correlator.resolve(ok(tid));

        assert!(correlator.discard(&tid));
        assert!(!correlator.is_registered(&tid));
        assert!(!correlator.discard(&tid));
        assert!(matches!(
            correlator.wait(tid).await,
            Err(ClientError::UnknownTransaction { .. })
        ));
        // The id may be reused once forgotten.
        assert!(correlator.register(tid));
    }

    #[test]
    fn unknown_results_are_dropped() {
        let correlator = Correlator::new(Duration::from_secs(1));
        assert!(!correlator.resolve(ok(TransactionId::new_v4())));
    }
}
