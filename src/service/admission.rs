//! # Object Admission Pipeline
//!
//! Moves an incoming object through rate-check → validate → (accept |
//! postpone | orphan | drop) and admits accepted objects into the store.
//!
//! Ordering inside `handle_object` is load-bearing:
//!
//! 1. protocol gate, 2. sync gate, 3. request gate (consumes the
//! solicitation), 4. duplicate gate, 5. trigger rate check (bypassable),
//! 6. local validation, 7. post-signature rate re-check, 8. admit.
//!
//! Collateral transactions are fetched *before* the state lock is taken;
//! nothing blocking runs under the guard.

use tracing::{debug, info, warn};

use crate::domain::entities::{short_hash, GovernanceObject, Hash, ObjectType};
use crate::domain::errors::GovernanceError;
use crate::domain::rate_buffer::LastObjectRecord;
use crate::domain::store::OrphanInfo;
use crate::domain::validation;
use crate::ports::outbound::{CollateralTx, PeerInfo, PeerMessage, REJECT_OBSOLETE};

use super::{
    next_superblock_height, object_inv, pinning, GovernanceManager, GovernanceState, PeerAction,
};

/// Verdict of local validation.
#[derive(Debug, Clone, Default)]
pub(crate) struct ValidationOutcome {
    pub valid: bool,
    pub masternode_missing: bool,
    pub missing_confirmations: bool,
    pub error: String,
}

impl ValidationOutcome {
    fn ok() -> Self {
        Self { valid: true, ..Self::default() }
    }

    fn invalid(error: impl Into<String>) -> Self {
        Self { error: error.into(), ..Self::default() }
    }

    fn masternode_missing(error: impl Into<String>) -> Self {
        Self {
            masternode_missing: true,
            error: error.into(),
            ..Self::default()
        }
    }

    fn missing_confirmations(error: impl Into<String>) -> Self {
        Self {
            missing_confirmations: true,
            error: error.into(),
            ..Self::default()
        }
    }
}

/// How to treat the collateral during validation.
pub(crate) enum CollateralCheck {
    /// Re-validation of an already vetted object; skip the chain lookup.
    Skip,
    /// Full check against a prefetched chain view of the transaction.
    With(Option<CollateralTx>),
}

/// Consume a solicitation; only one acceptance per request.
pub(crate) fn take_requested(
    set: &mut std::collections::HashSet<Hash>,
    hash: &Hash,
) -> bool {
    set.remove(hash)
}

impl GovernanceManager {
    pub(crate) fn handle_object(&self, from: &PeerInfo, obj: GovernanceObject) {
        let hash = obj.hash();
        self.peers.remove_ask_for(&hash);

        if from.version < self.cfg.min_peer_proto_version {
            debug!(peer = from.id, version = from.version, "obsolete peer version");
            self.peers.push_message(
                from.id,
                PeerMessage::Reject {
                    command: "govobj".into(),
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
            debug!("object received before blockchain sync");
            return;
        }

        debug!(hash = %short_hash(&hash), "received governance object");

        // Collateral is a chain fetch; do it before taking the state lock.
        let collateral = match obj.object_type {
            ObjectType::Proposal | ObjectType::Record => {
                CollateralCheck::With(self.chain.collateral_tx(&obj.collateral_hash))
            }
            _ => CollateralCheck::With(None),
        };

        let mut actions = Vec::new();
        {
            let mut state = self.state.lock();

            if !take_requested(&mut state.requested_objects, &hash) {
                warn!(hash = %short_hash(&hash), "received unrequested object");
                return;
            }

            if state.store.contains_anywhere(&hash) {
                debug!(hash = %short_hash(&hash), "received already seen object");
                return;
            }

            let (rate_ok, bypassed) = self.masternode_rate_check(&mut state, &obj, true, false);
            if !rate_ok {
                warn!(
                    hash = %short_hash(&hash),
                    height = state.cached_height,
                    "masternode rate check failed"
                );
                return;
            }

            let mut obj = obj;
            let outcome = self.validate_object(&mut obj, collateral);

            if bypassed && (outcome.valid || outcome.masternode_missing) {
                let (rate_ok, _) = self.masternode_rate_check(&mut state, &obj, true, true);
                if !rate_ok {
                    warn!(
                        hash = %short_hash(&hash),
                        height = state.cached_height,
                        "masternode rate check failed after signature verification"
                    );
                    return;
                }
            }

            if !outcome.valid {
                self.route_rejected_object(&mut state, &mut actions, obj, from, outcome);
            } else if validation::content_id_admissible(&obj) {
                self.admit_object(&mut state, &mut actions, obj, Some(from));
            } else {
                warn!(hash = %short_hash(&hash), "content id not admissible");
            }
        }
        self.flush(actions);
    }

    /// Route an invalid object to the orphan queue, the postponed queue, or
    /// the ban path.
    fn route_rejected_object(
        &self,
        state: &mut GovernanceState,
        actions: &mut Vec<PeerAction>,
        obj: GovernanceObject,
        from: &PeerInfo,
        outcome: ValidationOutcome,
    ) {
        let hash = obj.hash();
        if outcome.masternode_missing {
            let count = state.store.orphan_count_for(&obj.masternode_outpoint);
            if count >= self.cfg.max_orphans_per_masternode {
                debug!(
                    masternode = %obj.masternode_outpoint.short(),
                    "too many orphan objects for missing masternode"
                );
                // Ask for this object again once the fetch backoff elapses.
                actions.push(PeerAction::AskFor(from.id, object_inv(hash)));
                return;
            }
            let expires_at = self.clock.now() + self.cfg.orphan_expiration_secs;
            state.store.insert_orphan(
                obj,
                OrphanInfo { from_peer: Some(from.id), expires_at },
            );
            warn!(
                hash = %short_hash(&hash),
                error = %outcome.error,
                "missing masternode, object queued as orphan"
            );
        } else if outcome.missing_confirmations {
            if validation::content_id_admissible(&obj) {
                if let Some(action) = pinning::pin_action_for(&self.cfg, &obj) {
                    actions.push(action);
                }
                warn!(
                    hash = %short_hash(&hash),
                    error = %outcome.error,
                    "not enough collateral confirmations, object postponed"
                );
                state.store.insert_postponed(obj);
            } else {
                warn!(hash = %short_hash(&hash), "content id not admissible");
            }
        } else {
            warn!(
                hash = %short_hash(&hash),
                error = %outcome.error,
                "governance object is invalid"
            );
            actions.push(PeerAction::Misbehaving(from.id, 20));
        }
    }

    /// Admit a validated object into the accepted population and perform the
    /// admission tail: trigger registration, relay, rate update, orphan-vote
    /// replay, pinning, and observer notification.
    pub(crate) fn admit_object(
        &self,
        state: &mut GovernanceState,
        actions: &mut Vec<PeerAction>,
        mut obj: GovernanceObject,
        from: Option<&PeerInfo>,
    ) -> bool {
        let now = self.clock.now();
        let hash = obj.hash();
        let enabled = self.directory.list_at_tip().enabled_count();

        obj.update_sentinel_variables(enabled, now);

        // Final sanity pass; collateral was vetted on the way in.
        let outcome = self.validate_object(&mut obj, CollateralCheck::Skip);
        if !outcome.valid {
            warn!(
                hash = %short_hash(&hash),
                error = %outcome.error,
                height = state.cached_height,
                "refusing to admit invalid object"
            );
            return false;
        }

        debug!(
            hash = %short_hash(&hash),
            object_type = ?obj.object_type,
            "adding governance object"
        );

        let object_type = obj.object_type;
        let pin = pinning::pin_action_for(&self.cfg, &obj);
        let notify = obj.clone();

        if !state.store.insert_accepted(obj) {
            warn!(hash = %short_hash(&hash), "already have governance object");
            return false;
        }

        if object_type == ObjectType::Trigger && !self.triggers.add_new_trigger(hash) {
            debug!(hash = %short_hash(&hash), "undo adding invalid trigger object");
            if let Some(objref) = state.store.get_mut(&hash) {
                objref.mark_for_deletion(now);
            }
            return true;
        }

        info!(
            hash = %short_hash(&hash),
            peer = from.map(|p| p.id).unwrap_or_default(),
            "governance object is new"
        );
        actions.push(PeerAction::RelayInv(object_inv(hash)));

        self.masternode_rate_update(state, &hash);
        self.sync_oracle.bump_asset_last_time("governance-object");

        // Orphan votes may have been waiting for this parent.
        self.replay_orphan_votes(state, actions, &hash);

        if let Some(action) = pin {
            actions.push(action);
        }
        actions.push(PeerAction::NotifyObject(notify));
        true
    }

    /// Local submission path used by the daemon's RPC: same tail as peer
    /// admission, without a soliciting peer.
    pub fn submit(&self, obj: GovernanceObject) -> Result<Hash, GovernanceError> {
        let hash = obj.hash();
        let collateral = self.chain.collateral_tx(&obj.collateral_hash);

        let mut actions = Vec::new();
        let admitted = {
            let mut state = self.state.lock();
            if state.store.contains_anywhere(&hash) {
                return Err(GovernanceError::InvalidObject("already known".into()));
            }
            let mut obj = obj;
            let outcome = self.validate_object(&mut obj, CollateralCheck::With(collateral));
            if outcome.missing_confirmations && validation::content_id_admissible(&obj) {
                if let Some(action) = pinning::pin_action_for(&self.cfg, &obj) {
                    actions.push(action);
                }
                state.store.insert_postponed(obj);
                true
            } else if outcome.valid {
                self.admit_object(&mut state, &mut actions, obj, None)
            } else {
                return Err(GovernanceError::InvalidObject(outcome.error));
            }
        };
        self.flush(actions);

        if admitted {
            Ok(hash)
        } else {
            Err(GovernanceError::InvalidObject("admission failed".into()))
        }
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Validate an object against the local chain snapshot.
    ///
    /// On a full collateral check this also resolves the superblock height
    /// the collateral funds, caching it on the object for the record
    /// voting-window rule.
    pub(crate) fn validate_object(
        &self,
        obj: &mut GovernanceObject,
        collateral: CollateralCheck,
    ) -> ValidationOutcome {
        let now = self.clock.now();

        if let Err(e) = validation::check_payload_size(obj) {
            return ValidationOutcome::invalid(e);
        }
        let doc = match obj.document() {
            Ok(doc) => doc,
            Err(e) => return ValidationOutcome::invalid(e.to_string()),
        };

        if !validation::timestamp_within_window(
            obj.creation_time,
            now,
            self.cfg.consensus.superblock_cycle_seconds(),
            self.cfg.max_time_future_deviation_secs,
        ) {
            return ValidationOutcome::invalid(format!(
                "creation time {} out of range at {}",
                obj.creation_time, now
            ));
        }

        match obj.object_type {
            ObjectType::Trigger => {
                if obj.masternode_outpoint.is_null() {
                    return ValidationOutcome::invalid("trigger without masternode outpoint");
                }
                let Some(mn) = self.directory.mn_by_collateral(&obj.masternode_outpoint) else {
                    return ValidationOutcome::masternode_missing(format!(
                        "masternode {} not found",
                        obj.masternode_outpoint.short()
                    ));
                };
                if !self.signatures.verify(&obj.hash(), &mn.operator_key, &obj.signature) {
                    return ValidationOutcome::invalid("invalid trigger signature");
                }
                ValidationOutcome::ok()
            }
            ObjectType::Proposal | ObjectType::Record => {
                if let CollateralCheck::With(tx) = collateral {
                    if let Some(outcome) = self.check_collateral_fields(obj, &doc, tx) {
                        return outcome;
                    }
                }
                if obj.object_type == ObjectType::Proposal {
                    if let Err(e) = validation::proposal_fields_valid(&doc, now) {
                        return ValidationOutcome::invalid(e);
                    }
                }
                ValidationOutcome::ok()
            }
            ObjectType::Other => ValidationOutcome::ok(),
        }
    }

    /// Collateral amount/confirmation checks plus the tier-dependent
    /// content-id and identity rules. `None` means all checks passed.
    fn check_collateral_fields(
        &self,
        obj: &mut GovernanceObject,
        doc: &crate::domain::entities::PayloadDocument,
        tx: Option<CollateralTx>,
    ) -> Option<ValidationOutcome> {
        let params = &self.cfg.consensus;
        let Some(tx) = tx else {
            return Some(ValidationOutcome::missing_confirmations(format!(
                "collateral transaction {} not found",
                short_hash(&obj.collateral_hash)
            )));
        };

        if tx.amount != params.high_collateral && tx.amount != params.low_collateral {
            return Some(ValidationOutcome::invalid(format!(
                "unexpected collateral amount {}",
                tx.amount
            )));
        }

        if obj.object_type == ObjectType::Record {
            let cid = doc.content_id.as_deref().unwrap_or_default();
            if !validation::peer_content_id_valid(cid, tx.amount, params) {
                return Some(ValidationOutcome::invalid(format!(
                    "content id not valid for collateral tier: {cid}"
                )));
            }
        }

        if let Some(identity) = doc.identity.as_deref() {
            let in_use = self.directory.identities_in_use();
            if !validation::identity_valid(identity, tx.amount, &in_use, params) {
                return Some(ValidationOutcome::invalid(format!(
                    "identity not valid or already in use: {identity}"
                )));
            }
        }

        if tx.confirmations < params.min_collateral_confirmations {
            return Some(ValidationOutcome::missing_confirmations(format!(
                "collateral has {} of {} confirmations",
                tx.confirmations, params.min_collateral_confirmations
            )));
        }

        if let Some(height) = tx.block_height {
            obj.flags.collateral_superblock_height =
                Some(next_superblock_height(height, params.superblock_cycle_blocks));
        }
        None
    }

    /// Collateral-only re-check used by the postponed queue.
    pub(crate) fn collateral_ready(
        &self,
        obj: &mut GovernanceObject,
        tx: Option<CollateralTx>,
    ) -> Result<(), ValidationOutcome> {
        let doc = match obj.document() {
            Ok(doc) => doc,
            Err(e) => return Err(ValidationOutcome::invalid(e.to_string())),
        };
        match self.check_collateral_fields(obj, &doc, tx) {
            None => Ok(()),
            Some(outcome) => Err(outcome),
        }
    }

    // =========================================================================
    // TRIGGER RATE LIMITING
    // =========================================================================

    /// Evaluate the per-masternode trigger rate cap.
    ///
    /// Returns `(ok, bypassed)`. A masternode whose last check passed is
    /// bypassed on the pre-signature pass and re-checked with `force` after
    /// signature validation; the canonical buffer is never mutated here.
    pub(crate) fn masternode_rate_check(
        &self,
        state: &mut GovernanceState,
        obj: &GovernanceObject,
        update_fail_status: bool,
        force: bool,
    ) -> (bool, bool) {
        if !self.sync_oracle.is_synced() || !state.rate_checks_enabled {
            return (true, false);
        }
        if obj.object_type != ObjectType::Trigger {
            return (true, false);
        }

        let timestamp = obj.creation_time;
        let now = self.clock.now();
        let cycle_seconds = self.cfg.consensus.superblock_cycle_seconds();

        if timestamp < now - 2 * cycle_seconds {
            warn!(
                hash = %short_hash(&obj.hash()),
                masternode = %obj.masternode_outpoint.short(),
                timestamp,
                now,
                "trigger rejected, timestamp too old"
            );
            return (false, false);
        }
        if timestamp > now + self.cfg.max_time_future_deviation_secs {
            warn!(
                hash = %short_hash(&obj.hash()),
                masternode = %obj.masternode_outpoint.short(),
                timestamp,
                now,
                "trigger rejected, timestamp too far in the future"
            );
            return (false, false);
        }

        let Some(record) = state.last_masternode_object.get_mut(&obj.masternode_outpoint) else {
            return (true, false);
        };

        if record.status_ok && !force {
            return (true, true);
        }

        let max_rate = self.cfg.max_trigger_rate();
        // What-if copy: the canonical buffer only advances on admission.
        let mut buffer = record.trigger_buffer.clone();
        buffer.add_timestamp(timestamp);
        let rate = buffer.rate();

        if rate < max_rate {
            return (true, false);
        }

        warn!(
            hash = %short_hash(&obj.hash()),
            masternode = %obj.masternode_outpoint.short(),
            rate,
            max_rate,
            "trigger rate too high"
        );
        if update_fail_status {
            record.status_ok = false;
        }
        (false, false)
    }

    /// Advance the canonical rate buffer after an admission, and schedule an
    /// additional relay for triggers stamped near the future edge.
    pub(crate) fn masternode_rate_update(&self, state: &mut GovernanceState, hash: &Hash) {
        let Some(obj) = state.store.get(hash) else {
            return;
        };
        if obj.object_type != ObjectType::Trigger {
            return;
        }
        let outpoint = obj.masternode_outpoint;
        let timestamp = obj.creation_time;

        let record = state
            .last_masternode_object
            .entry(outpoint)
            .or_insert_with(|| LastObjectRecord::new(true));
        record.trigger_buffer.add_timestamp(timestamp);
        record.status_ok = true;

        let relay_edge = self.clock.now() + self.cfg.max_time_future_deviation_secs
            - self.cfg.reliable_propagation_secs;
        if timestamp > relay_edge {
            state.additional_relay.insert(*hash);
        }
    }
}
