//! The puller seam: demand registration and session notifications.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use foliodb_protocol::RemoteSequence;
use parking_lot::Mutex;

use crate::error::ReplError;

/// Demand registered with the puller for one advertised change.
///
/// A `body_size` of 0 means the revision was not requested; any positive
/// value is a hint of the expected payload size (at least 1).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSequence {
    /// The peer's sequence cursor; absent for proposed changes, which carry
    /// no cursor.
    pub sequence: Option<RemoteSequence>,
    /// Expected body size, or 0 when the revision is not requested.
    pub body_size: u64,
}

impl ChangeSequence {
    /// Returns true if the revision was requested from the peer.
    pub fn is_requested(&self) -> bool {
        self.body_size > 0
    }
}

/// Receives the change-negotiation outcome.
///
/// Callbacks run on the replication worker's mailbox; they must be
/// fire-and-forget and must not wait on work scheduled through the same
/// mailbox.
pub trait RevFinderDelegate: Send + Sync {
    /// The peer has no more changes right now.
    fn caught_up(&self);

    /// Registers demand for an inbound batch: one entry per advertised
    /// change, in batch order. Always called before the response is sent,
    /// so revision bodies cannot arrive before the demand is known.
    fn expect_sequences(&self, sequences: Vec<ChangeSequence>);

    /// The remote-ancestor bookkeeping for a document changed.
    fn remote_ancestor_changed(&self, doc_id: &str, rev_id: &str);

    /// An unrecoverable error ended the negotiation for this session.
    fn replication_failed(&self, error: &ReplError);
}

impl<D: RevFinderDelegate + ?Sized> RevFinderDelegate for Arc<D> {
    fn caught_up(&self) {
        (**self).caught_up();
    }

    fn expect_sequences(&self, sequences: Vec<ChangeSequence>) {
        (**self).expect_sequences(sequences);
    }

    fn remote_ancestor_changed(&self, doc_id: &str, rev_id: &str) {
        (**self).remote_ancestor_changed(doc_id, rev_id);
    }

    fn replication_failed(&self, error: &ReplError) {
        (**self).replication_failed(error);
    }
}

/// A delegate that records its notifications, for testing.
#[derive(Debug, Default)]
pub struct RecordingDelegate {
    caught_up_count: AtomicU64,
    expectations: Mutex<Vec<Vec<ChangeSequence>>>,
    ancestor_changes: Mutex<Vec<(String, String)>>,
    failures: Mutex<Vec<String>>,
}

impl RecordingDelegate {
    /// Creates an empty recording delegate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many times `caught_up` was called.
    pub fn caught_up_count(&self) -> u64 {
        self.caught_up_count.load(Ordering::SeqCst)
    }

    /// Returns every `expect_sequences` batch, in call order.
    pub fn expectations(&self) -> Vec<Vec<ChangeSequence>> {
        self.expectations.lock().clone()
    }

    /// Returns the recorded remote-ancestor notifications.
    pub fn ancestor_changes(&self) -> Vec<(String, String)> {
        self.ancestor_changes.lock().clone()
    }

    /// Returns the recorded failure messages.
    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().clone()
    }
}

impl RevFinderDelegate for RecordingDelegate {
    fn caught_up(&self) {
        self.caught_up_count.fetch_add(1, Ordering::SeqCst);
    }

    fn expect_sequences(&self, sequences: Vec<ChangeSequence>) {
        self.expectations.lock().push(sequences);
    }

    fn remote_ancestor_changed(&self, doc_id: &str, rev_id: &str) {
        self.ancestor_changes
            .lock()
            .push((doc_id.to_string(), rev_id.to_string()));
    }

    fn replication_failed(&self, error: &ReplError) {
        self.failures.lock().push(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_sequence_request_flag() {
        let requested = ChangeSequence {
            sequence: Some(RemoteSequence::Number(4)),
            body_size: 100,
        };
        assert!(requested.is_requested());

        let skipped = ChangeSequence {
            sequence: None,
            body_size: 0,
        };
        assert!(!skipped.is_requested());
    }

    #[test]
    fn recording_delegate_captures_notifications() {
        let delegate = RecordingDelegate::new();
        delegate.caught_up();
        delegate.expect_sequences(vec![]);
        delegate.remote_ancestor_changed("doc1", "2-b");
        delegate.replication_failed(&ReplError::storage("boom"));

        assert_eq!(delegate.caught_up_count(), 1);
        assert_eq!(delegate.expectations().len(), 1);
        assert_eq!(delegate.ancestor_changes(), vec![("doc1".into(), "2-b".into())]);
        assert_eq!(delegate.failures(), vec!["storage error: boom"]);
    }
}
