//! File transaction rendezvous
//!
//! Matches a requester with the host holding a file and tracks the
//! negotiation until it is reported finished or one side disconnects. No file
//! data passes through here.

use crate::core::SocketAddress;
use crate::storage::{FileQuery, FileStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Business-level reasons for refusing a transaction.
/// `Display` is the reason string sent back to the peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionRejection {
    #[error("file not found")]
    FileNotFound,
    #[error("transaction in progress")]
    InProgress,
    #[error("requester already holds file")]
    AlreadyHolder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Requester and holder have been paired
    Matched,
    Finished,
}

/// One rendezvous between a requester and a holder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub file_name: String,
    pub requester: SocketAddress,
    pub holder: SocketAddress,
    /// Where the requester waits for the holder
    pub establish_address: SocketAddress,
    pub state: TransactionState,
    pub started_at: DateTime<Utc>,
}

type TransactionKey = (String, SocketAddress);

/// Table of live transactions, at most one per `(file, requester)`
#[derive(Debug, Default)]
pub struct TransactionCoordinator {
    transactions: HashMap<TransactionKey, Transaction>,
}

impl TransactionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair `requester` with the connected host holding `file_name`
    pub fn start_transaction<F>(
        &mut self,
        file_name: &str,
        requester: &SocketAddress,
        establish_address: SocketAddress,
        store: &dyn FileStore,
        is_connected: F,
    ) -> Result<Transaction, TransactionRejection>
    where
        F: Fn(&SocketAddress) -> bool,
    {
        let record = store
            .lookup_file(&FileQuery::Name(file_name.to_string()))
            .filter(|r| is_connected(&r.owner))
            .ok_or(TransactionRejection::FileNotFound)?;

        let key = (file_name.to_string(), requester.clone());
        if self.transactions.contains_key(&key) {
            return Err(TransactionRejection::InProgress);
        }
        if &record.owner == requester {
            return Err(TransactionRejection::AlreadyHolder);
        }

        let transaction = Transaction {
            file_name: file_name.to_string(),
            requester: requester.clone(),
            holder: record.owner,
            establish_address,
            state: TransactionState::Matched,
            started_at: Utc::now(),
        };
        log::info!(
            "Transaction for {} matched: {} -> {}",
            transaction.file_name,
            transaction.holder,
            transaction.requester
        );
        self.transactions.insert(key, transaction.clone());

        Ok(transaction)
    }

    /// Close every transaction served by `sender`.
    ///
    /// Nothing checks that the transfer actually succeeded; an unknown sender
    /// is a no-op.
    pub fn finish_transaction(&mut self, sender: &SocketAddress) -> Vec<Transaction> {
        let finished = self.remove_where(|t| &t.holder == sender);
        for t in &finished {
            log::info!(
                "Transaction for {} finished after {}ms",
                t.file_name,
                (Utc::now() - t.started_at).num_milliseconds()
            );
        }
        finished
    }

    /// Drop every transaction involving `address` on either side
    pub fn discard_host(&mut self, address: &SocketAddress) -> Vec<Transaction> {
        let discarded = self.remove_where(|t| &t.holder == address || &t.requester == address);
        if !discarded.is_empty() {
            log::info!(
                "Discarded {} transaction(s) of disconnected host {}",
                discarded.len(),
                address
            );
        }
        discarded
    }

    fn remove_where<P>(&mut self, pred: P) -> Vec<Transaction>
    where
        P: Fn(&Transaction) -> bool,
    {
        let keys: Vec<TransactionKey> = self
            .transactions
            .iter()
            .filter(|(_, t)| pred(t))
            .map(|(k, _)| k.clone())
            .collect();

        keys.into_iter()
            .filter_map(|k| self.transactions.remove(&k))
            .map(|mut t| {
                t.state = TransactionState::Finished;
                t
            })
            .collect()
    }

    pub fn get(&self, file_name: &str, requester: &SocketAddress) -> Option<&Transaction> {
        self.transactions
            .get(&(file_name.to_string(), requester.clone()))
    }

    pub fn list(&self) -> Vec<Transaction> {
        self.transactions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FileInfo;
    use crate::storage::MemoryFileStore;

    fn alice() -> SocketAddress {
        SocketAddress::new("10.0.0.1", 9000)
    }

    fn bob() -> SocketAddress {
        SocketAddress::new("10.0.0.2", 9000)
    }

    fn bob_side_channel() -> SocketAddress {
        SocketAddress::new("10.0.0.2", 5000)
    }

    fn store_with_report() -> MemoryFileStore {
        let mut store = MemoryFileStore::new();
        store
            .register_file(FileInfo::new("report.pdf", 4096, "beef"), alice())
            .unwrap();
        store
    }

    #[test]
    fn test_start_returns_holder() {
        let store = store_with_report();
        let mut coordinator = TransactionCoordinator::new();

        let t = coordinator
            .start_transaction("report.pdf", &bob(), bob_side_channel(), &store, |_| true)
            .unwrap();

        assert_eq!(t.holder, alice());
        assert_eq!(t.establish_address, bob_side_channel());
        assert_eq!(t.state, TransactionState::Matched);
        assert_eq!(coordinator.get("report.pdf", &bob()), Some(&t));
    }

    #[test]
    fn test_second_request_rejected_while_pending() {
        let store = store_with_report();
        let mut coordinator = TransactionCoordinator::new();

        coordinator
            .start_transaction("report.pdf", &bob(), bob_side_channel(), &store, |_| true)
            .unwrap();
        let err = coordinator
            .start_transaction("report.pdf", &bob(), bob_side_channel(), &store, |_| true)
            .unwrap_err();

        assert_eq!(err.to_string(), "transaction in progress");
        assert_eq!(coordinator.len(), 1);
    }

    #[test]
    fn test_unknown_file() {
        let store = MemoryFileStore::new();
        let mut coordinator = TransactionCoordinator::new();

        let err = coordinator
            .start_transaction("report.pdf", &bob(), bob_side_channel(), &store, |_| true)
            .unwrap_err();
        assert_eq!(err, TransactionRejection::FileNotFound);
        assert_eq!(err.to_string(), "file not found");
    }

    #[test]
    fn test_holder_offline_is_not_found() {
        let store = store_with_report();
        let mut coordinator = TransactionCoordinator::new();

        let err = coordinator
            .start_transaction("report.pdf", &bob(), bob_side_channel(), &store, |a| {
                a != &alice()
            })
            .unwrap_err();
        assert_eq!(err, TransactionRejection::FileNotFound);
    }

    #[test]
    fn test_holder_cannot_request_own_file() {
        let store = store_with_report();
        let mut coordinator = TransactionCoordinator::new();

        let err = coordinator
            .start_transaction("report.pdf", &alice(), alice(), &store, |_| true)
            .unwrap_err();
        assert_eq!(err, TransactionRejection::AlreadyHolder);
        assert!(coordinator.is_empty());
    }

    #[test]
    fn test_finish_is_idempotent() {
        let store = store_with_report();
        let mut coordinator = TransactionCoordinator::new();
        coordinator
            .start_transaction("report.pdf", &bob(), bob_side_channel(), &store, |_| true)
            .unwrap();

        let finished = coordinator.finish_transaction(&alice());
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].state, TransactionState::Finished);
        assert!(coordinator.is_empty());

        assert!(coordinator.finish_transaction(&alice()).is_empty());

        // The pair may start again once finished
        assert!(coordinator
            .start_transaction("report.pdf", &bob(), bob_side_channel(), &store, |_| true)
            .is_ok());
    }

    #[test]
    fn test_discard_host_either_side() {
        let mut store = store_with_report();
        store
            .register_file(FileInfo::new("notes.txt", 10, "aa"), bob())
            .unwrap();
        let mut coordinator = TransactionCoordinator::new();

        coordinator
            .start_transaction("report.pdf", &bob(), bob_side_channel(), &store, |_| true)
            .unwrap();
        coordinator
            .start_transaction("notes.txt", &alice(), alice(), &store, |_| true)
            .unwrap();
        assert_eq!(coordinator.len(), 2);

        // Alice is holder of one and requester of the other
        let discarded = coordinator.discard_host(&alice());
        assert_eq!(discarded.len(), 2);
        assert!(coordinator.list().is_empty());
    }
}
