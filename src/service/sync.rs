//! # Sync Protocol
//!
//! Serves governance traffic to peers: the one-shot full object dump, the
//! bloom-filtered single-object vote delta, and the outbound targeted vote
//! refresh. Also owns the inventory-confirmation hook that records which
//! hashes this node solicited.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::domain::bloom::VoteFilter;
use crate::domain::entities::{short_hash, GovernanceVote, Hash, ObjectType};
use crate::ports::outbound::{
    Inv, InvKind, MasternodeList, PeerInfo, PeerMessage, REJECT_OBSOLETE,
};

use super::{
    is_full_sync_request, object_inv, only_voting_key_allowed, vote_inv, GovernanceManager,
    GovernanceState, PeerAction,
};

/// Label for the per-peer full-sync once-only record.
const FULL_SYNC_LABEL: &str = "governance-sync";

impl GovernanceManager {
    pub(crate) fn handle_governance_sync(
        &self,
        from: &PeerInfo,
        parent: Hash,
        filter: Option<VoteFilter>,
    ) {
        if !self.sync_oracle.is_blockchain_synced() {
            return;
        }

        if from.version < self.cfg.min_peer_proto_version {
            debug!(peer = from.id, version = from.version, "obsolete peer version");
            self.peers.push_message(
                from.id,
                PeerMessage::Reject {
                    command: "govsync".into(),
                    code: REJECT_OBSOLETE,
                    reason: format!(
                        "version must be {} or greater",
                        self.cfg.min_peer_proto_version
                    ),
                },
            );
            return;
        }

        // A full dump is heavy; hold it back until our own sync finished.
        if !self.sync_oracle.is_synced() {
            return;
        }

        if is_full_sync_request(&parent) {
            self.sync_objects(from);
        } else {
            self.sync_single_object_votes(from, &parent, filter.unwrap_or_default());
        }
        debug!(peer = from.id, "synced governance data to peer");
    }

    /// Serve the full object inventory, once per peer.
    fn sync_objects(&self, from: &PeerInfo) {
        if self.peers.has_fulfilled(from.id, FULL_SYNC_LABEL) {
            warn!(peer = from.id, "peer already asked for the object list");
            self.peers.misbehaving(from.id, 20);
            return;
        }
        self.peers.add_fulfilled(from.id, FULL_SYNC_LABEL);

        let mut actions = Vec::new();
        let mut count = 0usize;
        {
            let state = self.state.lock();
            for (hash, obj) in state.store.accepted() {
                if (obj.is_set_cached_delete() || obj.is_set_expired())
                    && obj.object_type != ObjectType::Record
                {
                    debug!(
                        hash = %short_hash(hash),
                        "not syncing deleted/expired object"
                    );
                    continue;
                }
                actions.push(PeerAction::Inventory(from.id, object_inv(*hash)));
                count += 1;
            }
        }
        actions.push(PeerAction::Message(
            from.id,
            PeerMessage::SyncStatusCount { kind: InvKind::Object, count },
        ));
        self.flush(actions);
        info!(peer = from.id, count, "sent governance objects");
    }

    /// Serve one object's votes, minus what the peer's filter already holds.
    fn sync_single_object_votes(&self, from: &PeerInfo, parent: &Hash, filter: VoteFilter) {
        let mut actions = Vec::new();
        let mut count = 0usize;
        {
            let state = self.state.lock();
            let Some(obj) = state.store.get(parent) else {
                debug!(
                    hash = %short_hash(parent),
                    peer = from.id,
                    "no matching object for vote sync"
                );
                return;
            };

            if (obj.is_set_cached_delete() || obj.is_set_expired())
                && obj.object_type != ObjectType::Record
            {
                warn!(
                    hash = %short_hash(parent),
                    peer = from.id,
                    "not syncing votes of deleted/expired object"
                );
                return;
            }

            let mn_list = self.directory.list_at_tip();
            for vote in obj.vote_file.votes() {
                let vote_hash = vote.hash();
                if filter.contains(&vote_hash) {
                    continue;
                }
                let only_voting_key = only_voting_key_allowed(obj, vote.signal);
                if !self.vote_valid_for_sync(&mn_list, vote, only_voting_key) {
                    continue;
                }
                actions.push(PeerAction::Inventory(from.id, vote_inv(vote_hash)));
                count += 1;
            }
        }
        actions.push(PeerAction::Message(
            from.id,
            PeerMessage::SyncStatusCount { kind: InvKind::Vote, count },
        ));
        self.flush(actions);
        info!(peer = from.id, count, "sent governance votes");
    }

    /// Whether a stored vote is still worth relaying: its masternode must be
    /// live and its signature must check out under the signal's authority.
    fn vote_valid_for_sync(
        &self,
        mn_list: &MasternodeList,
        vote: &GovernanceVote,
        only_voting_key: bool,
    ) -> bool {
        let Some(mn) = mn_list.by_collateral(&vote.masternode_outpoint) else {
            return false;
        };
        let digest = vote.hash();
        if self.signatures.verify(&digest, &mn.voting_key, &vote.signature) {
            return true;
        }
        !only_voting_key && self.signatures.verify(&digest, &mn.operator_key, &vote.signature)
    }

    /// Build a single-object sync request, attaching a filter of the votes
    /// we already hold when the peer speaks the filtered protocol.
    pub(crate) fn build_object_request(
        &self,
        state: &GovernanceState,
        to: &PeerInfo,
        hash: &Hash,
        use_filter: bool,
    ) -> PeerAction {
        debug!(hash = %short_hash(hash), peer = to.id, "requesting governance object");

        if to.version < self.cfg.filter_proto_version {
            return PeerAction::Message(
                to.id,
                PeerMessage::GovernanceSync { parent: *hash, filter: None },
            );
        }

        let filter = if use_filter {
            state.store.get(hash).map(|obj| {
                let tweak = rand::thread_rng().gen_range(0..1_000_000);
                let mut filter = VoteFilter::with_fpr(
                    self.cfg.consensus.governance_filter_elements,
                    self.cfg.consensus.governance_filter_fp_rate,
                    tweak,
                );
                for vote in obj.vote_file.votes() {
                    filter.insert(&vote.hash());
                }
                filter
            })
        } else {
            None
        };

        PeerAction::Message(
            to.id,
            PeerMessage::GovernanceSync { parent: *hash, filter },
        )
    }

    /// Targeted vote refresh: pick one object (triggers first), ask up to
    /// three eligible peers, each at most once per cooldown window.
    pub fn request_object_votes(&self) -> i32 {
        let peers = self.peers.connected_peers();
        self.request_object_votes_from(&peers)
    }

    /// As [`Self::request_object_votes`], against an explicit peer set.
    pub fn request_object_votes_from(&self, peers: &[PeerInfo]) -> i32 {
        if peers.is_empty() {
            return -1;
        }

        let now = self.clock.now();
        let timeout = self.cfg.vote_ask_timeout_secs;
        let mut actions = Vec::new();

        let remaining = {
            let mut state = self.state.lock();
            if state.store.accepted_len() == 0 {
                return -2;
            }

            let mut trigger_hashes = Vec::new();
            let mut other_hashes = Vec::new();
            for hash in state.store.accepted_hashes() {
                if let Some(asked) = state.asked_recently.get_mut(&hash) {
                    asked.retain(|_, deadline| *deadline >= now);
                    if asked.len() >= self.cfg.peers_per_hash_max {
                        continue;
                    }
                }
                match state.store.get(&hash).map(|obj| obj.object_type) {
                    Some(ObjectType::Trigger) => trigger_hashes.push(hash),
                    Some(_) => other_hashes.push(hash),
                    None => {}
                }
            }

            debug!(
                triggers = trigger_hashes.len(),
                others = other_hashes.len(),
                "targeted vote refresh start"
            );

            let mut rng = rand::thread_rng();
            trigger_hashes.shuffle(&mut rng);
            other_hashes.shuffle(&mut rng);

            let mut requests_left = 1i32;
            while requests_left > 0 {
                let hash = if let Some(hash) = trigger_hashes.last().copied() {
                    hash
                } else if let Some(hash) = other_hashes.last().copied() {
                    hash
                } else {
                    break;
                };

                let mut asked = false;
                for peer in peers {
                    // Outbound "masternode" connections are short-lived, and
                    // inbound peers of a masternode may be the same; neither
                    // is a reliable source.
                    if peer.outbound_masternode || (self.cfg.masternode_mode && peer.inbound) {
                        continue;
                    }
                    if peer.version < self.cfg.min_peer_proto_version {
                        continue;
                    }
                    let asked_count = state
                        .asked_recently
                        .get(&hash)
                        .map(|m| m.len())
                        .unwrap_or(0);
                    if asked_count >= self.cfg.peers_per_hash_max {
                        break;
                    }
                    let already = state
                        .asked_recently
                        .get(&hash)
                        .map(|m| m.contains_key(&peer.id))
                        .unwrap_or(false);
                    if already {
                        continue;
                    }

                    actions.push(self.build_object_request(&state, peer, &hash, true));
                    state
                        .asked_recently
                        .entry(hash)
                        .or_default()
                        .insert(peer.id, now + timeout);
                    asked = true;

                    let asked_count = state
                        .asked_recently
                        .get(&hash)
                        .map(|m| m.len())
                        .unwrap_or(0);
                    if asked_count >= self.cfg.peers_per_hash_max {
                        break;
                    }
                }

                if !trigger_hashes.is_empty() {
                    trigger_hashes.pop();
                } else {
                    other_hashes.pop();
                }
                if asked {
                    requests_left -= 1;
                }
            }

            (trigger_hashes.len() + other_hashes.len()) as i32
        };

        self.flush(actions);
        remaining
    }

    /// Decide whether an advertised inventory entry should be fetched; when
    /// yes, record the solicitation so exactly one response can be admitted.
    pub fn confirm_inventory_request(&self, inv: &Inv) -> bool {
        // Do not request objects until it's time to sync.
        if !self.sync_oracle.is_blockchain_synced() {
            return false;
        }

        let mut state = self.state.lock();
        debug!(hash = %short_hash(&inv.hash), kind = ?inv.kind, "confirm inventory request");

        match inv.kind {
            InvKind::Object => {
                if state.store.has_accepted(&inv.hash) || state.store.has_postponed(&inv.hash) {
                    debug!("already have governance object");
                    return false;
                }
                state.requested_objects.insert(inv.hash);
            }
            InvKind::Vote => {
                if state.vote_to_object.has_key(&inv.hash) {
                    debug!("already have governance vote");
                    return false;
                }
                state.requested_votes.insert(inv.hash);
            }
        }
        true
    }
}
