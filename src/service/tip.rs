//! # Chain-Tip Watcher
//!
//! Reacts to a new best tip: refreshes the cached height, scrubs votes
//! invalidated by masternode key rotation, re-drives the postponed queue,
//! performs the scheduled additional trigger relays, and hands the height to
//! the superblock machinery.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::domain::entities::{short_hash, Hash, ObjectType};
use crate::ports::outbound::CollateralTx;

use super::admission::CollateralCheck;
use super::{object_inv, GovernanceManager, PeerAction};

impl GovernanceManager {
    /// Entry point for new best-tip notifications.
    pub fn updated_block_tip(&self, height: u64) {
        {
            self.state.lock().cached_height = height;
        }
        debug!(height, "governance observed new chain tip");

        if self.directory.is_deterministic_enforced(height) {
            self.remove_invalid_votes();
        }

        self.check_postponed_objects();

        self.triggers.execute_best_superblock(height);
    }

    /// Scrub votes cast under rotated or retired masternode keys.
    ///
    /// Records keep their votes once their funding superblock has been
    /// mined; everything else is scrubbed unconditionally. Removed hashes
    /// leave every vote index, including the requested set.
    pub(crate) fn remove_invalid_votes(&self) {
        if !self.sync_oracle.is_synced() {
            return;
        }

        let current = self.directory.list_at_tip();
        let mut state = self.state.lock();
        let changed = state.last_mn_list.changed_key_outpoints(&current);
        let height = state.cached_height;

        let mut all_removed: HashSet<Hash> = HashSet::new();
        for outpoint in &changed {
            for hash in state.store.accepted_hashes() {
                let removed = {
                    let Some(obj) = state.store.get_mut(&hash) else {
                        continue;
                    };
                    let scrub = match obj.object_type {
                        ObjectType::Record => obj
                            .flags
                            .collateral_superblock_height
                            .map(|superblock| height < superblock)
                            .unwrap_or(false),
                        _ => true,
                    };
                    if !scrub {
                        continue;
                    }
                    obj.vote_file.remove_votes_from(outpoint)
                };
                if removed.is_empty() {
                    continue;
                }
                info!(
                    masternode = %outpoint.short(),
                    object = %short_hash(&hash),
                    count = removed.len(),
                    "removed votes under rotated masternode key"
                );
                all_removed.extend(removed);
            }
        }

        if !all_removed.is_empty() {
            for vote_hash in &all_removed {
                state.vote_to_object.erase(vote_hash);
                state.invalid_votes.erase(vote_hash);
                state.requested_votes.remove(vote_hash);
            }
            state
                .orphan_votes
                .retain(|_, timed| !all_removed.contains(&timed.vote.hash()));
        }

        // Baseline for the next diff.
        state.last_mn_list = current;
    }

    /// Re-evaluate the postponed queue against fresh confirmation counts and
    /// run the scheduled additional trigger relays.
    pub(crate) fn check_postponed_objects(&self) {
        if !self.sync_oracle.is_synced() {
            return;
        }

        // Collateral lookups block; fetch them before taking the lock.
        let pending: Vec<(Hash, Hash)> = {
            let state = self.state.lock();
            state
                .store
                .postponed_hashes()
                .into_iter()
                .filter_map(|hash| {
                    state
                        .store
                        .get_postponed(&hash)
                        .map(|obj| (hash, obj.collateral_hash))
                })
                .collect()
        };
        let mut fetched: HashMap<Hash, Option<CollateralTx>> = pending
            .iter()
            .map(|(hash, collateral)| (*hash, self.chain.collateral_tx(collateral)))
            .collect();

        let mut actions = Vec::new();
        {
            let mut state = self.state.lock();

            for (hash, _) in pending {
                let Some(mut obj) = state.store.remove_postponed(&hash) else {
                    continue;
                };
                let tx = fetched.remove(&hash).flatten();

                match self.collateral_ready(&mut obj, tx) {
                    Ok(()) => {
                        let outcome = self.validate_object(&mut obj, CollateralCheck::Skip);
                        if outcome.valid {
                            self.admit_object(&mut state, &mut actions, obj, None);
                        } else {
                            info!(
                                hash = %short_hash(&hash),
                                error = %outcome.error,
                                "postponed object invalid, dropping"
                            );
                        }
                    }
                    Err(outcome) if outcome.missing_confirmations => {
                        // Wait for more confirmations.
                        state.store.insert_postponed(obj);
                    }
                    Err(outcome) => {
                        info!(
                            hash = %short_hash(&hash),
                            error = %outcome.error,
                            "postponed object collateral invalid, dropping"
                        );
                    }
                }
            }

            // Additional relays for triggers stamped near the future edge.
            let now = self.clock.now();
            let cycle = self.cfg.consensus.superblock_cycle_seconds();
            let future = self.cfg.max_time_future_deviation_secs;
            let propagation = self.cfg.reliable_propagation_secs;

            for hash in state.additional_relay.clone() {
                let keep = match state.store.get(&hash) {
                    Some(obj) => {
                        let timestamp = obj.creation_time;
                        let valid =
                            timestamp <= now + future && timestamp >= now - 2 * cycle;
                        let ready = timestamp <= now + future - propagation;
                        if valid && !ready {
                            true
                        } else {
                            if valid && ready {
                                info!(
                                    hash = %short_hash(&hash),
                                    "additional relay of trigger"
                                );
                                actions.push(PeerAction::RelayInv(object_inv(hash)));
                            }
                            false
                        }
                    }
                    None => {
                        warn!(
                            hash = %short_hash(&hash),
                            "additional relay scheduled for unknown object"
                        );
                        false
                    }
                };
                if !keep {
                    state.additional_relay.remove(&hash);
                }
            }
        }
        self.flush(actions);
    }
}
