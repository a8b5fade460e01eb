//! The storage seam for revision ancestry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ReplError, ReplResult};

/// Outcome of an ancestry lookup for one advertised revision.
#[derive(Debug, Clone, PartialEq)]
pub enum AncestryAnswer {
    /// The revision is stored and already marked current for this peer.
    Exists,
    /// The revision is stored but not yet marked as the peer's ancestor;
    /// the caller must update the remote-ancestor bookkeeping.
    ExistsButNotCurrent,
    /// The revision is not stored. `ancestors` is a JSON array (as text) of
    /// stored revision IDs that are candidate delta sources, if any.
    Missing {
        /// Raw JSON array of candidate ancestor revision IDs.
        ancestors: Option<String>,
    },
}

/// Current local state of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRevision {
    /// Current revision ID.
    pub rev_id: String,
    /// The current revision is a deletion (tombstone).
    pub deleted: bool,
}

impl LocalRevision {
    /// Creates a live revision.
    pub fn new(rev_id: impl Into<String>) -> Self {
        Self {
            rev_id: rev_id.into(),
            deleted: false,
        }
    }

    /// Creates a deleted (tombstone) revision.
    pub fn deleted(rev_id: impl Into<String>) -> Self {
        Self {
            rev_id: rev_id.into(),
            deleted: true,
        }
    }
}

/// Asks the storage layer for per-document ancestry information.
///
/// Implementations are called only from within the replication worker's
/// mailbox, so they need to be safe for single-threaded use; they may block
/// that thread.
pub trait AncestryOracle: Send + Sync {
    /// Looks up each `(doc-id, rev-id)` pair and reports whether the
    /// revision is stored and, if not, which stored revisions could serve
    /// as delta sources. At most `max_ancestors` candidates are returned
    /// per document; with `require_bodies`, only revisions whose bodies are
    /// still stored qualify.
    fn find_ancestors(
        &self,
        revs: &[(String, String)],
        max_ancestors: usize,
        require_bodies: bool,
    ) -> ReplResult<Vec<AncestryAnswer>>;

    /// Returns the document's current revision, or `None` if the document
    /// does not exist.
    fn current_revision(&self, doc_id: &str) -> ReplResult<Option<LocalRevision>>;

    /// Records that the peer stores `rev_id` of `doc_id`.
    fn set_remote_ancestor(&self, doc_id: &str, rev_id: &str) -> ReplResult<()>;

    /// Persists pending synced-revision markers so subsequent ancestry
    /// answers reflect current state.
    fn mark_revs_synced_now(&self) -> ReplResult<()>;
}

impl<O: AncestryOracle + ?Sized> AncestryOracle for Arc<O> {
    fn find_ancestors(
        &self,
        revs: &[(String, String)],
        max_ancestors: usize,
        require_bodies: bool,
    ) -> ReplResult<Vec<AncestryAnswer>> {
        (**self).find_ancestors(revs, max_ancestors, require_bodies)
    }

    fn current_revision(&self, doc_id: &str) -> ReplResult<Option<LocalRevision>> {
        (**self).current_revision(doc_id)
    }

    fn set_remote_ancestor(&self, doc_id: &str, rev_id: &str) -> ReplResult<()> {
        (**self).set_remote_ancestor(doc_id, rev_id)
    }

    fn mark_revs_synced_now(&self) -> ReplResult<()> {
        (**self).mark_revs_synced_now()
    }
}

/// An in-memory ancestry oracle for testing.
///
/// Documents inserted with [`MemoryAncestryOracle::insert`] answer
/// `Exists` when the advertised revision matches the current one and
/// `Missing` (with the current revision as the candidate ancestor)
/// otherwise. Specific answers can be pinned per `(doc-id, rev-id)` pair.
#[derive(Default)]
pub struct MemoryAncestryOracle {
    docs: Mutex<HashMap<String, LocalRevision>>,
    pinned: Mutex<HashMap<(String, String), AncestryAnswer>>,
    remote_ancestors: Mutex<Vec<(String, String)>>,
    synced_marker_flushes: AtomicU64,
    failing: AtomicBool,
}

impl MemoryAncestryOracle {
    /// Creates an empty oracle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a document's current revision.
    pub fn insert(&self, doc_id: impl Into<String>, revision: LocalRevision) {
        self.docs.lock().insert(doc_id.into(), revision);
    }

    /// Pins the ancestry answer for a `(doc-id, rev-id)` pair.
    pub fn pin_answer(
        &self,
        doc_id: impl Into<String>,
        rev_id: impl Into<String>,
        answer: AncestryAnswer,
    ) {
        self.pinned
            .lock()
            .insert((doc_id.into(), rev_id.into()), answer);
    }

    /// Makes every lookup fail with a storage error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the recorded remote-ancestor updates, in call order.
    pub fn remote_ancestors(&self) -> Vec<(String, String)> {
        self.remote_ancestors.lock().clone()
    }

    /// Returns how many times synced markers were flushed.
    pub fn synced_marker_flushes(&self) -> u64 {
        self.synced_marker_flushes.load(Ordering::SeqCst)
    }

    fn check_failing(&self) -> ReplResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ReplError::storage("simulated storage failure"))
        } else {
            Ok(())
        }
    }
}

impl AncestryOracle for MemoryAncestryOracle {
    fn find_ancestors(
        &self,
        revs: &[(String, String)],
        max_ancestors: usize,
        _require_bodies: bool,
    ) -> ReplResult<Vec<AncestryAnswer>> {
        self.check_failing()?;
        let docs = self.docs.lock();
        let pinned = self.pinned.lock();
        let answers = revs
            .iter()
            .map(|(doc_id, rev_id)| {
                if let Some(answer) = pinned.get(&(doc_id.clone(), rev_id.clone())) {
                    return answer.clone();
                }
                match docs.get(doc_id) {
                    Some(current) if current.rev_id == *rev_id => AncestryAnswer::Exists,
                    Some(current) if max_ancestors > 0 => AncestryAnswer::Missing {
                        ancestors: Some(format!("[\"{}\"]", current.rev_id)),
                    },
                    _ => AncestryAnswer::Missing { ancestors: None },
                }
            })
            .collect();
        Ok(answers)
    }

    fn current_revision(&self, doc_id: &str) -> ReplResult<Option<LocalRevision>> {
        self.check_failing()?;
        Ok(self.docs.lock().get(doc_id).cloned())
    }

    fn set_remote_ancestor(&self, doc_id: &str, rev_id: &str) -> ReplResult<()> {
        self.check_failing()?;
        self.remote_ancestors
            .lock()
            .push((doc_id.to_string(), rev_id.to_string()));
        Ok(())
    }

    fn mark_revs_synced_now(&self) -> ReplResult<()> {
        self.check_failing()?;
        self.synced_marker_flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_oracle_answers() {
        let oracle = MemoryAncestryOracle::new();
        oracle.insert("doc1", LocalRevision::new("2-b"));

        let answers = oracle
            .find_ancestors(
                &[
                    ("doc1".into(), "2-b".into()),
                    ("doc1".into(), "3-c".into()),
                    ("ghost".into(), "1-a".into()),
                ],
                10,
                true,
            )
            .unwrap();
        assert_eq!(answers[0], AncestryAnswer::Exists);
        assert_eq!(
            answers[1],
            AncestryAnswer::Missing {
                ancestors: Some("[\"2-b\"]".into())
            }
        );
        assert_eq!(answers[2], AncestryAnswer::Missing { ancestors: None });
    }

    #[test]
    fn pinned_answers_win() {
        let oracle = MemoryAncestryOracle::new();
        oracle.insert("doc1", LocalRevision::new("2-b"));
        oracle.pin_answer("doc1", "2-b", AncestryAnswer::ExistsButNotCurrent);

        let answers = oracle
            .find_ancestors(&[("doc1".into(), "2-b".into())], 10, true)
            .unwrap();
        assert_eq!(answers[0], AncestryAnswer::ExistsButNotCurrent);
    }

    #[test]
    fn failing_oracle_reports_storage_errors() {
        let oracle = MemoryAncestryOracle::new();
        oracle.set_failing(true);
        assert!(oracle.current_revision("doc1").is_err());
        assert!(oracle.mark_revs_synced_now().is_err());
    }

    #[test]
    fn bookkeeping_is_recorded() {
        let oracle = MemoryAncestryOracle::new();
        oracle.set_remote_ancestor("doc1", "2-b").unwrap();
        oracle.mark_revs_synced_now().unwrap();
        assert_eq!(oracle.remote_ancestors(), vec![("doc1".into(), "2-b".into())]);
        assert_eq!(oracle.synced_marker_flushes(), 1);
    }
}
