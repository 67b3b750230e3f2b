//! # Vote Processing
//!
//! Vote admission mirrors the object pipeline with its own requested-set,
//! plus the parent lookup that queues unknown-parent votes as orphans and
//! solicits the parent from the sending peer.
//!
//! Per-object acceptance enforces, in order: masternode membership, slot
//! replacement rules (latest-wins, update spacing), signal authority, and
//! the signature itself. Accepted votes land in the object's vote file and
//! the vote index in the same frame.

use tracing::{debug, warn};

use crate::domain::entities::{short_hash, GovernanceVote, Hash, ObjectType};
use crate::domain::errors::{AdmissionFault, FaultSeverity};
use crate::domain::vote_file::VoteInstance;
use crate::ports::outbound::{PeerInfo, PeerMessage, REJECT_OBSOLETE};

use super::admission::take_requested;
use super::{
    only_voting_key_allowed, vote_inv, GovernanceManager, GovernanceState, PeerAction, TimedVote,
};

impl GovernanceManager {
    pub(crate) fn handle_vote(&self, from: &PeerInfo, vote: GovernanceVote) {
        let hash = vote.hash();
        self.peers.remove_ask_for(&hash);

        if from.version < self.cfg.min_peer_proto_version {
            debug!(peer = from.id, version = from.version, "obsolete peer version");
            self.peers.push_message(
                from.id,
                PeerMessage::Reject {
                    command: "govobjvote".into(),
                    code: REJECT_OBSOLETE,
                    reason: format!(
                        "version must be {} or greater",
                        self.cfg.min_peer_proto_version
                    ),
                },
            );
            return;
        }

        if !self.sync_oracle.is_blockchain_synced() {
            debug!("vote received before blockchain sync");
            return;
        }

        debug!(vote = %vote.describe(), "received governance vote");

        let mut actions = Vec::new();
        let result = {
            let mut state = self.state.lock();
            if !take_requested(&mut state.requested_votes, &hash) {
                debug!(hash = %short_hash(&hash), peer = from.id, "received unrequested vote");
                return;
            }
            let result = self.process_vote_locked(&mut state, &mut actions, Some(from), &vote);
            if result.is_ok() {
                actions.push(PeerAction::RelayInv(vote_inv(hash)));
                actions.push(PeerAction::NotifyVote(vote.clone()));
            }
            result
        };

        match &result {
            Ok(()) => {
                debug!(hash = %short_hash(&hash), "vote is new");
                self.sync_oracle.bump_asset_last_time("governance-vote");
            }
            Err(fault) => {
                match fault.severity {
                    FaultSeverity::Warning => {
                        debug!(hash = %short_hash(&hash), %fault, "vote not accepted")
                    }
                    _ => warn!(hash = %short_hash(&hash), %fault, "vote rejected"),
                }
                if fault.node_penalty != 0 && self.sync_oracle.is_synced() {
                    actions.push(PeerAction::Misbehaving(from.id, fault.node_penalty));
                }
            }
        }
        self.flush(actions);
    }

    /// Vote admission under the state lock.
    ///
    /// The unknown-parent branch queues the vote and defers a targeted
    /// object request; the send happens after the lock drops.
    pub(crate) fn process_vote_locked(
        &self,
        state: &mut GovernanceState,
        actions: &mut Vec<PeerAction>,
        from: Option<&PeerInfo>,
        vote: &GovernanceVote,
    ) -> Result<(), AdmissionFault> {
        let vote_hash = vote.hash();
        let parent_hash = vote.parent_hash;

        if state.vote_to_object.has_key(&vote_hash) {
            return Err(AdmissionFault::warning(format!(
                "already known valid vote {} for object {}",
                short_hash(&vote_hash),
                short_hash(&parent_hash)
            )));
        }

        if state.invalid_votes.has_key(&vote_hash) {
            return Err(AdmissionFault::permanent(
                format!(
                    "old invalid vote, masternode {}, object {}",
                    vote.masternode_outpoint.short(),
                    short_hash(&parent_hash)
                ),
                20,
            ));
        }

        if !state.store.has_accepted(&parent_hash) {
            let queued = state.orphan_votes.insert(
                parent_hash,
                TimedVote {
                    vote: vote.clone(),
                    expires_at: self.clock.now() + self.cfg.orphan_expiration_secs,
                },
            );
            if queued {
                if let Some(from) = from {
                    actions.push(self.build_object_request(state, from, &parent_hash, false));
                }
            }
            return Err(AdmissionFault::warning(format!(
                "unknown parent object {}, masternode {}",
                short_hash(&parent_hash),
                vote.masternode_outpoint.short()
            )));
        }

        self.check_vote_window(state, vote)?;
        self.accept_vote_into_object(state, vote)?;
        Ok(())
    }

    /// The record voting-window rule, and the delete/expiry gate for
    /// everything else.
    fn check_vote_window(
        &self,
        state: &GovernanceState,
        vote: &GovernanceVote,
    ) -> Result<(), AdmissionFault> {
        let Some(obj) = state.store.get(&vote.parent_hash) else {
            return Err(AdmissionFault::internal("parent vanished mid-check"));
        };

        if obj.object_type == ObjectType::Record {
            let Some(superblock_height) = obj.flags.collateral_superblock_height else {
                return Ok(());
            };
            // Heights past the tip cannot be compared yet; accept for now.
            if superblock_height > state.cached_height {
                debug!(superblock_height, "record funding superblock not yet mined");
                return Ok(());
            }
            let Some(superblock_time) = self.chain.block_time(superblock_height) else {
                debug!(superblock_height, "funding superblock time unavailable");
                return Ok(());
            };
            if vote.timestamp >= superblock_time {
                return Err(AdmissionFault::warning(format!(
                    "record vote at {} is past its funding superblock at {}",
                    vote.timestamp, superblock_time
                )));
            }
            Ok(())
        } else if obj.is_set_cached_delete() || obj.is_set_expired() {
            Err(AdmissionFault::warning(format!(
                "ignoring vote for expired or deleted object {}",
                short_hash(&vote.parent_hash)
            )))
        } else {
            Ok(())
        }
    }

    /// Per-object acceptance: membership, slot rules, authority, signature.
    pub(crate) fn accept_vote_into_object(
        &self,
        state: &mut GovernanceState,
        vote: &GovernanceVote,
    ) -> Result<(), AdmissionFault> {
        let now = self.clock.now();
        let vote_hash = vote.hash();
        let parent_hash = vote.parent_hash;

        let Some(mn) = self.directory.mn_by_collateral(&vote.masternode_outpoint) else {
            return Err(AdmissionFault::warning(format!(
                "masternode {} not found",
                vote.masternode_outpoint.short()
            )));
        };

        let (only_voting_key, existing): (bool, Option<VoteInstance>) = {
            let Some(obj) = state.store.get(&parent_hash) else {
                return Err(AdmissionFault::internal("parent vanished mid-acceptance"));
            };
            (
                only_voting_key_allowed(obj, vote.signal),
                obj.vote_file
                    .current_instance(&vote.masternode_outpoint, vote.signal)
                    .copied(),
            )
        };

        if let Some(instance) = existing {
            if vote.timestamp < instance.vote_timestamp {
                return Err(AdmissionFault::warning(format!(
                    "obsolete vote, slot already at {}",
                    instance.vote_timestamp
                )));
            }
            if vote.timestamp == instance.vote_timestamp {
                return Err(AdmissionFault::warning("duplicate vote timestamp"));
            }
            let delta = now - instance.created_at;
            if state.rate_checks_enabled && delta < self.cfg.vote_update_min_secs {
                return Err(AdmissionFault::temporary(format!(
                    "masternode {} voting too often, {}s since last update",
                    vote.masternode_outpoint.short(),
                    delta
                )));
            }
        }

        let mut signature_ok = self.signatures.verify(&vote_hash, &mn.voting_key, &vote.signature);
        if !signature_ok && !only_voting_key {
            signature_ok = self.signatures.verify(&vote_hash, &mn.operator_key, &vote.signature);
        }
        if !signature_ok {
            state.invalid_votes.insert(vote_hash, now);
            return Err(AdmissionFault::permanent(
                format!("invalid vote signature from {}", vote.masternode_outpoint.short()),
                20,
            ));
        }

        {
            let Some(obj) = state.store.get_mut(&parent_hash) else {
                return Err(AdmissionFault::internal("parent vanished mid-acceptance"));
            };
            if !obj.vote_file.add_vote(vote.clone(), now) {
                return Err(AdmissionFault::warning("vote already on file"));
            }
            obj.flags.dirty = true;
        }
        state.vote_to_object.insert(vote_hash, parent_hash);
        Ok(())
    }

    /// Re-drive orphan votes queued under a freshly admitted parent.
    ///
    /// Replays run with rate checks disabled so queued history is not
    /// rejected as voting-too-often. Each replay failure is logged with its
    /// own fault; failed votes stay queued until they expire.
    pub(crate) fn replay_orphan_votes(
        &self,
        state: &mut GovernanceState,
        actions: &mut Vec<PeerAction>,
        parent_hash: &Hash,
    ) {
        let queued = state.orphan_votes.get_all(parent_hash);
        if queued.is_empty() {
            return;
        }

        let saved = state.rate_checks_enabled;
        state.rate_checks_enabled = false;
        let now = self.clock.now();

        for timed in queued {
            let mut remove = false;
            if timed.expires_at < now {
                remove = true;
            } else {
                match self.accept_vote_into_object(state, &timed.vote) {
                    Ok(()) => {
                        actions.push(PeerAction::RelayInv(vote_inv(timed.vote.hash())));
                        remove = true;
                    }
                    Err(fault) => {
                        debug!(vote = %timed.vote.describe(), %fault, "orphan vote replay failed");
                    }
                }
            }
            if remove {
                state.orphan_votes.erase_pair(parent_hash, &timed);
            }
        }

        state.rate_checks_enabled = saved;
    }
}
