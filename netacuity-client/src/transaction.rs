//! Table of in-flight transactions
//!
//! Each sent query registers a one-shot completion under its transaction id.
//! The entry is removed by whichever comes first: the matching response, the
//! request's deadline timer, or the client shutting down. Removal is the only
//! way to reach the completion, so it fires at most once.

use std::collections::HashMap;

use netacuity_protocol::EdgeRecord;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{Error, Result};

pub(crate) type Completion = oneshot::Receiver<Result<EdgeRecord>>;

pub(crate) struct PendingTransaction {
    completion: oneshot::Sender<Result<EdgeRecord>>,
    started: Instant,
}

impl PendingTransaction {
    /// Resolve the transaction with an error
    pub(crate) fn fail(self, error: Error) {
        // The caller may have stopped waiting.
        let _ = self.completion.send(Err(error));
    }
}

#[derive(Default)]
pub(crate) struct TransactionTable {
    pending: HashMap<String, PendingTransaction>,
}

/// Generate a 32 character uppercase hex transaction id
pub(crate) fn generate_transaction_id() -> String {
    format!("{:032X}", rand::random::<u128>())
}

impl TransactionTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a new transaction under a fresh id
    pub(crate) fn register(&mut self) -> (String, Completion) {
        let mut id = generate_transaction_id();
        while self.pending.contains_key(&id) {
            id = generate_transaction_id();
        }

        let (completion, receiver) = oneshot::channel();
        self.pending.insert(
            id.clone(),
            PendingTransaction {
                completion,
                started: Instant::now(),
            },
        );
        (id, receiver)
    }

    /// Deliver a response to its transaction
    ///
    /// Returns false when no transaction with the record's id is pending.
    pub(crate) fn complete(&mut self, record: EdgeRecord) -> bool {
        let Some(pending) = self.pending.remove(&record.transaction_id) else {
            return false;
        };

        log::trace!(
            "transaction {} answered in {:?}",
            record.transaction_id,
            pending.started.elapsed()
        );

        // The caller may have stopped waiting; the record is dropped with the channel.
        let _ = pending.completion.send(Ok(record));
        true
    }

    /// Take a transaction out of the table so the caller can resolve it
    pub(crate) fn take(&mut self, id: &str) -> Option<PendingTransaction> {
        self.pending.remove(id)
    }

    /// Forget a transaction without completing it
    pub(crate) fn remove(&mut self, id: &str) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Drop every pending transaction, returning how many there were
    pub(crate) fn clear(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
