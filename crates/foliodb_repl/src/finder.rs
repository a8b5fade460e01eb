//! Change negotiation for pull replication.
//!
//! `RevFinder` handles inbound `changes` and `proposeChanges` messages one
//! at a time on its worker mailbox. For each advertised revision it
//! consults the ancestry oracle and decides whether to request the body,
//! accept without a body, update remote-ancestor bookkeeping, or reject
//! with a status code, then emits the positional response the protocol
//! expects.

use std::collections::VecDeque;
use std::time::Instant;

use foliodb_protocol::{
    parse_changes_body, parse_propose_changes_body, status, ChangeEntry, ChangesRequest,
    ChangesResponse, Profile, ProposedChangeEntry, ResponseBody,
};

use crate::bus::MessageBus;
use crate::config::PullConfig;
use crate::delegate::{ChangeSequence, RevFinderDelegate};
use crate::error::{ReplError, ReplResult};
use crate::oracle::{AncestryAnswer, AncestryOracle};

enum Batch {
    Changes(Vec<ChangeEntry>),
    Proposed(Vec<ProposedChangeEntry>),
}

/// Decides, per advertised document revision, whether to request it from
/// the peer.
///
/// A `RevFinder` lives for the duration of a replication session and owns
/// its waiting queue and in-flight counter. All methods must be called from
/// within a single [`WorkerMailbox`](crate::WorkerMailbox); the transport
/// posts inbound messages and revision receipts onto that mailbox.
pub struct RevFinder<O, D, B> {
    config: PullConfig,
    oracle: O,
    delegate: D,
    bus: B,
    revs_in_flight: u64,
    waiting: VecDeque<ChangesRequest>,
    announced_delta_support: bool,
}

impl<O, D, B> RevFinder<O, D, B>
where
    O: AncestryOracle,
    D: RevFinderDelegate,
    B: MessageBus,
{
    /// Creates a finder for one replication session.
    pub fn new(config: PullConfig, oracle: O, delegate: D, bus: B) -> Self {
        Self {
            config,
            oracle,
            delegate,
            bus,
            revs_in_flight: 0,
            waiting: VecDeque::new(),
            announced_delta_support: false,
        }
    }

    /// Returns the number of revisions requested from the peer but not yet
    /// received.
    pub fn revs_in_flight(&self) -> u64 {
        self.revs_in_flight
    }

    /// Returns the number of messages waiting for capacity.
    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    fn has_capacity(&self) -> bool {
        self.revs_in_flight < self.config.max_revs_in_flight
    }

    /// Accepts an inbound `changes` / `proposeChanges` message. Handled
    /// immediately when capacity allows, otherwise queued in FIFO order.
    pub fn handle_changes(&mut self, request: ChangesRequest) {
        if self.has_capacity() {
            self.handle_changes_now(request);
        } else {
            tracing::debug!(
                profile = request.profile.wire_name(),
                number = request.number,
                queued = self.waiting.len() + 1,
                "queued changes message until revs are received"
            );
            self.waiting.push_back(request);
        }
    }

    /// Notes that the peer delivered one requested revision, and drains the
    /// waiting queue while capacity remains.
    pub fn rev_received(&mut self) {
        self.revs_in_flight = self.revs_in_flight.saturating_sub(1);
        while self.has_capacity() {
            let Some(request) = self.waiting.pop_front() else {
                break;
            };
            self.handle_changes_now(request);
        }
    }

    /// Notes that the puller is re-requesting a revision it already counted
    /// as received (e.g. after a failed transfer).
    pub fn re_requesting_rev(&mut self) {
        self.revs_in_flight += 1;
    }

    fn handle_changes_now(&mut self, request: ChangesRequest) {
        let started = Instant::now();
        let proposed = request.profile == Profile::ProposeChanges;
        tracing::debug!(
            profile = request.profile.wire_name(),
            number = request.number,
            "handling changes message"
        );

        if !request.body.is_array() {
            tracing::warn!(number = request.number, "invalid body of changes message");
            self.bus
                .respond_error(request.number, status::BAD_REQUEST, "Invalid JSON body");
            return;
        }
        if request.body.as_array().map_or(0, Vec::len) == 0 {
            // An empty batch means the peer has no more changes right now.
            tracing::info!("caught up with remote changes");
            self.delegate.caught_up();
            self.bus.respond_ack(request.number);
            return;
        }
        if request.no_reply {
            tracing::warn!(
                number = request.number,
                "ignoring noreply changes message"
            );
            return;
        }
        if self.config.conflict_free_mode && !proposed {
            // In conflict-free mode the peer must send proposeChanges.
            self.bus
                .respond_error(request.number, status::CONFLICT, "proposeChanges required");
            return;
        }

        let batch = if proposed {
            parse_propose_changes_body(&request.body).map(Batch::Proposed)
        } else {
            parse_changes_body(&request.body).map(Batch::Changes)
        };
        let batch = match batch {
            Ok(batch) => batch,
            Err(error) => {
                tracing::warn!(
                    number = request.number,
                    %error,
                    "rejecting malformed changes batch"
                );
                self.bus
                    .respond_error(request.number, error.status_code(), &error.to_string());
                return;
            }
        };

        match &batch {
            Batch::Proposed(entries) => {
                tracing::info!(count = entries.len(), "received proposed changes");
            }
            Batch::Changes(entries) => {
                if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
                    tracing::info!(
                        count = entries.len(),
                        first = %first.sequence,
                        last = %last.sequence,
                        "received changes"
                    );
                }
                // Make sure the foreign-ancestor bookkeeping is current
                // before asking for ancestry.
                if let Err(error) = self.oracle.mark_revs_synced_now() {
                    self.session_failed(error);
                    return;
                }
            }
        }

        let mut response = ChangesResponse::new(self.config.max_history);
        response.blobs = self.config.blobs_enabled;
        if self.config.deltas_enabled && !self.announced_delta_support {
            response.deltas = true;
            self.announced_delta_support = true;
        }

        let mut body = ResponseBody::new();
        let outcome = match &batch {
            Batch::Changes(entries) => self.find_revs(entries, &mut body),
            Batch::Proposed(entries) => self.find_proposed_revs(entries, &mut body),
        };
        let (requested, sequences) = match outcome {
            Ok(found) => found,
            Err(error) => {
                self.session_failed(error);
                return;
            }
        };
        response.body = body.finish();

        // The order matters: register the demand before responding, so rev
        // bodies cannot arrive before the puller knows about them.
        self.revs_in_flight += u64::from(requested);
        self.delegate.expect_sequences(sequences);
        self.bus.respond(request.number, response);

        tracing::debug!(
            number = request.number,
            requested,
            elapsed_us = started.elapsed().as_micros() as u64,
            "responded to changes message"
        );
    }

    /// Classifies each `changes` entry, writes requested slots into the
    /// response body, and returns the request count with the per-entry
    /// demand vector.
    fn find_revs(
        &mut self,
        changes: &[ChangeEntry],
        body: &mut ResponseBody,
    ) -> ReplResult<(u32, Vec<ChangeSequence>)> {
        let mut sequences: Vec<ChangeSequence> = changes
            .iter()
            .map(|change| ChangeSequence {
                sequence: Some(change.sequence.clone()),
                body_size: change.body_size.max(1),
            })
            .collect();

        let revs: Vec<(String, String)> = changes
            .iter()
            .map(|change| (change.doc_id.clone(), change.rev_id.clone()))
            .collect();
        let answers = self.oracle.find_ancestors(
            &revs,
            self.config.max_ancestors,
            self.config.deltas_enabled,
        )?;
        if answers.len() != changes.len() {
            return Err(ReplError::storage(
                "ancestry oracle answered the wrong number of documents",
            ));
        }

        let mut requested = 0u32;
        for (i, answer) in answers.iter().enumerate() {
            let change = &changes[i];
            match answer {
                AncestryAnswer::Exists => {
                    sequences[i].body_size = 0;
                }
                AncestryAnswer::ExistsButNotCurrent => {
                    // Stored, but not yet marked as coming from this peer.
                    tracing::debug!(
                        doc_id = %change.doc_id,
                        rev_id = %change.rev_id,
                        "marking stored revision as remote ancestor"
                    );
                    self.oracle
                        .set_remote_ancestor(&change.doc_id, &change.rev_id)?;
                    self.delegate
                        .remote_ancestor_changed(&change.doc_id, &change.rev_id);
                    sequences[i].body_size = 0;
                }
                AncestryAnswer::Missing { ancestors } => {
                    requested += 1;
                    body.write_raw_at(i, ancestors.as_deref().unwrap_or("[]"));
                    tracing::debug!(
                        doc_id = %change.doc_id,
                        rev_id = %change.rev_id,
                        "requesting revision"
                    );
                }
            }
        }
        Ok((requested, sequences))
    }

    /// Classifies each `proposeChanges` entry, writes rejection statuses
    /// into the response body, and returns the accept count with the
    /// per-entry demand vector.
    fn find_proposed_revs(
        &mut self,
        changes: &[ProposedChangeEntry],
        body: &mut ResponseBody,
    ) -> ReplResult<(u32, Vec<ChangeSequence>)> {
        // Proposed entries carry no remote sequence cursor.
        let mut sequences = vec![
            ChangeSequence {
                sequence: None,
                body_size: 0,
            };
            changes.len()
        ];
        let mut requested = 0u32;
        for (i, change) in changes.iter().enumerate() {
            let proposal_status = self.find_proposed_change(change);
            if proposal_status == status::OK {
                tracing::debug!(
                    doc_id = %change.doc_id,
                    rev_id = %change.rev_id,
                    "accepting proposed change"
                );
                requested += 1;
                sequences[i].body_size = change.body_size.max(1);
            } else {
                tracing::info!(
                    doc_id = %change.doc_id,
                    rev_id = %change.rev_id,
                    status = proposal_status,
                    "rejecting proposed change"
                );
                body.write_status_at(i, proposal_status);
            }
        }
        Ok((requested, sequences))
    }

    /// Checks one proposed revision against the local document. Returns 0
    /// to accept, 304 when the revision is already stored, 409 on conflict,
    /// and 500 when the lookup fails.
    fn find_proposed_change(&self, change: &ProposedChangeEntry) -> u16 {
        let local = match self.oracle.current_revision(&change.doc_id) {
            Ok(local) => local,
            Err(error) => {
                tracing::error!(doc_id = %change.doc_id, %error, "ancestry lookup failed");
                return status::INTERNAL_ERROR;
            }
        };
        let Some(local) = local else {
            // No such document; a conflict only if the peer thinks there is.
            return if change.parent_rev_id.is_some() {
                status::CONFLICT
            } else {
                status::OK
            };
        };
        if local.rev_id == change.rev_id {
            return status::NOT_MODIFIED;
        }
        match &change.parent_rev_id {
            // Peer is creating the doc anew; fine if ours is deleted.
            None => {
                if local.deleted {
                    status::OK
                } else {
                    status::CONFLICT
                }
            }
            Some(parent) if *parent != local.rev_id => status::CONFLICT,
            Some(_) => status::OK,
        }
    }

    fn session_failed(&self, error: ReplError) {
        tracing::error!(%error, "change negotiation failed; ending session");
        self.delegate.replication_failed(&error);
    }
}
