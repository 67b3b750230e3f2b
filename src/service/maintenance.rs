//! # Maintenance Loop
//!
//! Periodic cleanup invoked by the scheduler while synced: expired orphan
//! votes are dropped, missing parents are re-requested, masternode-orphan
//! objects are re-validated, the postponed queue is re-checked, and the main
//! cache/eviction sweep runs.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::domain::entities::{short_hash, ObjectType, OutPoint};
use crate::domain::validation;

use super::admission::CollateralCheck;
use super::{GovernanceManager, PeerAction};

impl GovernanceManager {
    /// The periodic cleanup pass.
    pub fn do_maintenance(&self) {
        if !self.sync_oracle.is_synced() || self.shutdown_requested() {
            return;
        }

        self.clean_orphan_votes();
        self.request_orphan_objects();
        self.check_orphan_objects();
        self.check_postponed_objects();
        self.update_caches_and_clean();
    }

    /// Drop orphan votes whose deferred expiration has passed.
    pub(crate) fn clean_orphan_votes(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let before = state.orphan_votes.len();
        state.orphan_votes.retain(|_, timed| timed.expires_at >= now);
        let dropped = before - state.orphan_votes.len();
        if dropped > 0 {
            debug!(dropped, "expired orphan votes removed");
        }
    }

    /// Ask regular peers for the parents of queued orphan votes.
    pub(crate) fn request_orphan_objects(&self) {
        let peers = self.peers.connected_peers();
        let mut actions = Vec::new();
        {
            let state = self.state.lock();
            let missing: Vec<_> = state
                .orphan_votes
                .keys()
                .into_iter()
                .filter(|hash| !state.store.has_accepted(hash))
                .collect();
            debug!(count = missing.len(), "requesting orphan parent objects");

            for hash in missing {
                for peer in &peers {
                    if peer.outbound_masternode {
                        continue;
                    }
                    actions.push(self.build_object_request(&state, peer, &hash, false));
                }
            }
        }
        self.flush(actions);
    }

    /// Re-validate masternode-orphan objects: admit the ones whose
    /// masternode appeared, keep the still-missing until they expire, and
    /// penalize the peer behind anything that expired unresolved.
    pub(crate) fn check_orphan_objects(&self) {
        let now = self.clock.now();
        let mut actions = Vec::new();
        {
            let mut state = self.state.lock();
            let saved = state.rate_checks_enabled;
            state.rate_checks_enabled = false;

            for hash in state.store.orphan_hashes() {
                let Some((mut obj, info)) = state.store.remove_orphan(&hash) else {
                    continue;
                };

                if info.expires_at >= now {
                    let outcome = self.validate_object(&mut obj, CollateralCheck::Skip);
                    if outcome.valid {
                        self.admit_object(&mut state, &mut actions, obj, None);
                    } else if outcome.masternode_missing {
                        // Masternode still invisible; keep waiting.
                        state.store.insert_orphan(obj, info);
                    } else {
                        debug!(
                            hash = %short_hash(&hash),
                            error = %outcome.error,
                            "orphan object became invalid, dropping"
                        );
                    }
                } else {
                    warn!(hash = %short_hash(&hash), "orphan object expired unresolved");
                    if let Some(peer) = info.from_peer {
                        actions.push(PeerAction::Misbehaving(peer, 20));
                    }
                }
            }

            state.rate_checks_enabled = saved;
        }
        self.flush(actions);
    }

    /// The main sweep: recompute dirty caches, expire triggers, purge
    /// deleted/expired objects past their delay, invalidate lapsed
    /// proposals, and forget expired erasures.
    pub(crate) fn update_caches_and_clean(&self) {
        debug!("governance cache update and clean");

        let dirty = self.meta.take_dirty_hashes();
        let mut actions = Vec::new();
        {
            let mut state = self.state.lock();
            let mn_list = self.directory.list_at_tip();
            let live: HashSet<OutPoint> =
                mn_list.masternodes.iter().map(|mn| mn.collateral).collect();

            for hash in dirty {
                let removed = match state.store.get_mut(&hash) {
                    Some(obj) => {
                        let removed = obj.vote_file.retain_masternodes(&live);
                        obj.flags.dirty = true;
                        removed
                    }
                    None => continue,
                };
                for vote_hash in removed {
                    state.vote_to_object.erase(&vote_hash);
                }
            }

            self.triggers.clean_and_remove();

            let saved = state.rate_checks_enabled;
            state.rate_checks_enabled = false;

            let now = self.clock.now();
            let enabled = mn_list.enabled_count();
            let cycle = self.cfg.consensus.superblock_cycle_seconds();

            for hash in state.store.accepted_hashes() {
                let mut purge = false;
                {
                    let Some(obj) = state.store.get_mut(&hash) else {
                        continue;
                    };

                    if obj.flags.dirty {
                        let outcome = self.validate_object(obj, CollateralCheck::Skip);
                        obj.flags.locally_valid = outcome.valid;
                        obj.flags.validity_error = outcome.error;
                        obj.update_sentinel_variables(enabled, now);
                    }

                    // Triggers past two cycles are spent.
                    if obj.object_type == ObjectType::Trigger
                        && obj.creation_time < now - 2 * cycle
                        && !obj.flags.expired
                    {
                        obj.flags.expired = true;
                        if obj.flags.deletion_time == 0 {
                            obj.flags.deletion_time = now;
                        }
                    }

                    let since_deletion = now - obj.flags.deletion_time;
                    debug!(
                        hash = %short_hash(&hash),
                        deletion_time = obj.flags.deletion_time,
                        since_deletion,
                        delete = obj.flags.cached_delete,
                        expired = obj.flags.expired,
                        record_locked = obj.flags.record_locked,
                        perm_locked = obj.flags.perm_locked,
                        "checking object for deletion"
                    );

                    if (obj.is_set_cached_delete() || obj.is_set_expired())
                        && !obj.is_retention_locked()
                        && since_deletion >= self.cfg.deletion_delay_secs
                    {
                        purge = true;
                    } else if obj.object_type == ObjectType::Proposal
                        || (obj.object_type == ObjectType::Record && !obj.is_retention_locked())
                    {
                        let lapsed = match obj.document() {
                            Ok(doc) if obj.object_type == ObjectType::Proposal => {
                                validation::proposal_fields_valid(&doc, now).is_err()
                            }
                            Ok(_) => false,
                            Err(_) => true,
                        };
                        if lapsed && !obj.flags.cached_delete {
                            info!(hash = %short_hash(&hash), "flagging lapsed object for deletion");
                            obj.mark_for_deletion(now);
                        }
                    }
                }

                if purge {
                    self.purge_object(&mut state, &mut actions, &hash, cycle);
                }
            }

            let forgotten = state.store.purge_expired_erased(now);
            if forgotten > 0 {
                debug!(forgotten, "expired erasure records forgotten");
            }
            state.rate_checks_enabled = saved;
        }
        self.flush(actions);

        info!(summary = %self.summary(), "governance cache update and clean complete");
    }

    /// Evict one accepted object: metadata, pin, vote index, erased marker.
    fn purge_object(
        &self,
        state: &mut super::GovernanceState,
        actions: &mut Vec<PeerAction>,
        hash: &crate::domain::entities::Hash,
        cycle: i64,
    ) {
        self.meta.remove_object(hash);

        let (object_type, creation_time, unpin) = match state.store.get(hash) {
            Some(obj) => (
                obj.object_type,
                obj.creation_time,
                (obj.object_type == ObjectType::Record && self.cfg.masternode_mode)
                    .then(|| obj.content_id())
                    .flatten(),
            ),
            None => return,
        };

        if let Some(cid) = unpin {
            actions.push(PeerAction::UnpinContent(cid));
        }

        // Scrub every vote back-reference into this object.
        state.vote_to_object.retain(|_, object_hash| object_hash != hash);

        // Proposals and records stay remembered forever; everything else for
        // two cycles past creation plus the deletion delay.
        let retain_until = match object_type {
            ObjectType::Proposal | ObjectType::Record => i64::MAX,
            _ => creation_time + 2 * cycle + self.cfg.deletion_delay_secs,
        };

        info!(hash = %short_hash(hash), "erasing governance object");
        state.store.erase_accepted(hash, retain_until);
    }
}
