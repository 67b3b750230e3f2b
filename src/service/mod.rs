//! # Governance Manager Service
//!
//! Owns every mutable governance collection behind one coarse mutex and
//! drives the component machinery: admission, vote processing, sync serving,
//! maintenance, pinning, and chain-tip reactions.
//!
//! ## Locking Discipline
//!
//! All state lives in `GovernanceState` under a single `parking_lot::Mutex`.
//! Handlers lock, compute, and collect `PeerAction`s; blocking work (peer
//! sends, content-store RPCs) runs only after the guard drops. No handler
//! re-locks within the same frame.

mod admission;
mod maintenance;
mod pinning;
mod snapshot;
mod sync;
mod tip;
mod votes;

pub use snapshot::{GovernanceSnapshot, SNAPSHOT_VERSION};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::domain::bounded_cache::{BoundedCache, BoundedMultiMap};
use crate::domain::config::GovernanceConfig;
use crate::domain::entities::{
    short_hash, GovernanceObject, GovernanceVote, Hash, OutPoint, PeerId, VoteSignal, ZERO_HASH,
};
use crate::domain::rate_buffer::LastObjectRecord;
use crate::domain::store::{ObjectCounts, ObjectStore};
use crate::ports::inbound::GovernanceApi;
use crate::ports::outbound::{
    ChainView, ContentStore, Inv, InvKind, MasternodeDirectory, MasternodeList, ObjectMetaStore,
    ObserverBus, PeerGateway, PeerInfo, PeerMessage, SignatureVerifier, SyncOracle, TimeSource,
    TriggerRegistry,
};

/// An orphan vote waiting for its parent object, with its expiry.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TimedVote {
    pub vote: GovernanceVote,
    pub expires_at: i64,
}

/// Everything mutable, guarded by the manager's single mutex.
pub(crate) struct GovernanceState {
    pub store: ObjectStore,
    /// vote hash → hash of the accepted object carrying it.
    pub vote_to_object: BoundedCache<Hash, Hash>,
    /// vote hash → when it was found invalid.
    pub invalid_votes: BoundedCache<Hash, i64>,
    /// unknown parent hash → votes waiting for it.
    pub orphan_votes: BoundedMultiMap<Hash, TimedVote>,
    /// Per-masternode trigger rate state.
    pub last_masternode_object: HashMap<OutPoint, LastObjectRecord>,
    /// Object hashes we solicited and may accept once.
    pub requested_objects: HashSet<Hash>,
    /// Vote hashes we solicited and may accept once.
    pub requested_votes: HashSet<Hash>,
    /// Triggers due another relay once their timestamp ages in.
    pub additional_relay: HashSet<Hash>,
    /// (object, peer) → cooldown deadline for targeted vote requests.
    pub asked_recently: HashMap<Hash, HashMap<PeerId, i64>>,
    pub cached_height: u64,
    /// Masternode list the last voting-key diff ran against.
    pub last_mn_list: MasternodeList,
    /// Cleared while replaying queued votes so history is not rate-limited.
    pub rate_checks_enabled: bool,
}

impl GovernanceState {
    fn new(cfg: &GovernanceConfig) -> Self {
        Self {
            store: ObjectStore::new(),
            vote_to_object: BoundedCache::new(cfg.max_cache_size),
            invalid_votes: BoundedCache::new(cfg.max_cache_size),
            orphan_votes: BoundedMultiMap::new(cfg.max_cache_size),
            last_masternode_object: HashMap::new(),
            requested_objects: HashSet::new(),
            requested_votes: HashSet::new(),
            additional_relay: HashSet::new(),
            asked_recently: HashMap::new(),
            cached_height: 0,
            last_mn_list: MasternodeList::default(),
            rate_checks_enabled: true,
        }
    }
}

/// Deferred side effect collected under the lock, executed after it drops.
#[derive(Debug, Clone)]
pub(crate) enum PeerAction {
    Message(PeerId, PeerMessage),
    Inventory(PeerId, Inv),
    RelayInv(Inv),
    AskFor(PeerId, Inv),
    Misbehaving(PeerId, i32),
    NotifyObject(GovernanceObject),
    NotifyVote(GovernanceVote),
    /// Pin a content id into the external store (best effort).
    PinContent(String),
    /// Recursively unpin a content id (best effort).
    UnpinContent(String),
}

/// Capability objects the manager is constructed from.
pub struct Collaborators {
    pub chain: Arc<dyn ChainView>,
    pub directory: Arc<dyn MasternodeDirectory>,
    pub sync_oracle: Arc<dyn SyncOracle>,
    pub peers: Arc<dyn PeerGateway>,
    pub content: Arc<dyn ContentStore>,
    pub triggers: Arc<dyn TriggerRegistry>,
    pub meta: Arc<dyn ObjectMetaStore>,
    pub observers: Arc<dyn ObserverBus>,
    pub signatures: Arc<dyn SignatureVerifier>,
    pub clock: Arc<dyn TimeSource>,
}

/// The governance subsystem.
pub struct GovernanceManager {
    pub(crate) cfg: GovernanceConfig,
    pub(crate) state: Mutex<GovernanceState>,
    pub(crate) chain: Arc<dyn ChainView>,
    pub(crate) directory: Arc<dyn MasternodeDirectory>,
    pub(crate) sync_oracle: Arc<dyn SyncOracle>,
    pub(crate) peers: Arc<dyn PeerGateway>,
    pub(crate) content: Arc<dyn ContentStore>,
    pub(crate) triggers: Arc<dyn TriggerRegistry>,
    pub(crate) meta: Arc<dyn ObjectMetaStore>,
    pub(crate) observers: Arc<dyn ObserverBus>,
    pub(crate) signatures: Arc<dyn SignatureVerifier>,
    pub(crate) clock: Arc<dyn TimeSource>,
    shutdown: AtomicBool,
}

impl GovernanceManager {
    pub fn new(cfg: GovernanceConfig, collab: Collaborators) -> Self {
        let state = GovernanceState::new(&cfg);
        Self {
            cfg,
            state: Mutex::new(state),
            chain: collab.chain,
            directory: collab.directory,
            sync_oracle: collab.sync_oracle,
            peers: collab.peers,
            content: collab.content,
            triggers: collab.triggers,
            meta: collab.meta,
            observers: collab.observers,
            signatures: collab.signatures,
            clock: collab.clock,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Make the next maintenance pass a no-op and return immediately.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub(crate) fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Execute deferred side effects outside the state lock.
    pub(crate) fn flush(&self, actions: Vec<PeerAction>) {
        for action in actions {
            match action {
                PeerAction::Message(peer, message) => self.peers.push_message(peer, message),
                PeerAction::Inventory(peer, inv) => self.peers.push_inventory(peer, inv),
                PeerAction::RelayInv(inv) => self.peers.relay_inventory(inv),
                PeerAction::AskFor(peer, inv) => self.peers.ask_for(peer, inv),
                PeerAction::Misbehaving(peer, score) => self.peers.misbehaving(peer, score),
                PeerAction::NotifyObject(obj) => self.observers.notify_object(&obj),
                PeerAction::NotifyVote(vote) => self.observers.notify_vote(&vote),
                PeerAction::PinContent(cid) => self.pin_content(&cid),
                PeerAction::UnpinContent(cid) => self.unpin_content(&cid),
            }
        }
    }

    // =========================================================================
    // LOOKUP SURFACE
    // =========================================================================

    /// Whether this node holds the object, accepted or postponed.
    pub fn have_object_for_hash(&self, hash: &Hash) -> bool {
        let state = self.state.lock();
        state.store.has_accepted(hash) || state.store.has_postponed(hash)
    }

    /// Whether this node holds the vote.
    pub fn have_vote_for_hash(&self, hash: &Hash) -> bool {
        let state = self.state.lock();
        let Some(object_hash) = state.vote_to_object.get(hash) else {
            return false;
        };
        state
            .store
            .get(&object_hash)
            .map(|obj| obj.vote_file.has_vote(hash))
            .unwrap_or(false)
    }

    /// Copy of an accepted object.
    pub fn find_object(&self, hash: &Hash) -> Option<GovernanceObject> {
        self.state.lock().store.get(hash).cloned()
    }

    /// Wire bytes of an object, accepted or postponed, for serving GETDATA.
    pub fn serialize_object(&self, hash: &Hash) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let obj = state.store.get(hash).or_else(|| state.store.get_postponed(hash))?;
        bincode::serialize(obj).ok()
    }

    /// Wire bytes of a vote, for serving GETDATA.
    pub fn serialize_vote(&self, hash: &Hash) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let object_hash = state.vote_to_object.get(hash)?;
        let vote = state.store.get(&object_hash)?.vote_file.get_vote(hash)?;
        bincode::serialize(vote).ok()
    }

    pub fn vote_count(&self) -> usize {
        self.state.lock().vote_to_object.len()
    }

    pub fn cached_height(&self) -> u64 {
        self.state.lock().cached_height
    }

    /// Copies of every accepted object created at or after `cutoff`.
    pub fn get_all_newer_than(&self, cutoff: i64) -> Vec<GovernanceObject> {
        self.state
            .lock()
            .store
            .accepted()
            .filter(|(_, obj)| obj.creation_time >= cutoff)
            .map(|(_, obj)| obj.clone())
            .collect()
    }

    /// Whether any stored object already carries this content id.
    pub fn is_content_id_in_use(&self, content_id: &str) -> bool {
        self.state
            .lock()
            .store
            .accepted()
            .filter_map(|(_, obj)| obj.content_id())
            .any(|cid| cid == content_id)
    }

    /// Block containing an object's collateral transaction, if confirmed.
    pub fn collateral_block(&self, collateral_hash: &Hash) -> Option<Hash> {
        let tx = self.chain.collateral_tx(collateral_hash)?;
        if tx.block_hash.is_none() {
            debug!(
                txid = %short_hash(collateral_hash),
                "collateral transaction not yet mined"
            );
        }
        tx.block_hash
    }

    /// The current `(masternode, signal)` votes on an object, optionally
    /// filtered to one masternode.
    ///
    /// Votes are reconstructed from the slot index; they carry the original
    /// timestamps but no signatures.
    pub fn get_current_votes(
        &self,
        parent_hash: &Hash,
        mn_filter: Option<OutPoint>,
    ) -> Vec<GovernanceVote> {
        let state = self.state.lock();
        let Some(obj) = state.store.get(parent_hash) else {
            return Vec::new();
        };

        let list = self.directory.list_at_tip();
        let outpoints: Vec<OutPoint> = match mn_filter {
            Some(outpoint) => list
                .by_collateral(&outpoint)
                .map(|mn| vec![mn.collateral])
                .unwrap_or_default(),
            None => list.masternodes.iter().map(|mn| mn.collateral).collect(),
        };

        let mut result = Vec::new();
        for outpoint in outpoints {
            let Some(record) = obj.vote_file.record_for(&outpoint) else {
                continue;
            };
            for (signal, instance) in &record.instances {
                result.push(GovernanceVote::new(
                    *parent_hash,
                    outpoint,
                    *signal,
                    instance.outcome,
                    instance.vote_timestamp,
                ));
            }
        }
        result
    }

    /// Accepted-object counts for the introspection surface.
    pub fn counts(&self) -> ObjectCounts {
        self.state.lock().store.counts()
    }

    /// One-line totals for the log.
    pub fn summary(&self) -> String {
        let state = self.state.lock();
        let counts = state.store.counts();
        format!(
            "Governance Objects: {} (Proposals: {}, Records: {}, Triggers: {}, Other: {}; Erased: {}), Votes: {}",
            counts.total(),
            counts.proposals,
            counts.records,
            counts.triggers,
            counts.other,
            counts.erased,
            state.vote_to_object.len()
        )
    }

    /// JSON totals for the RPC surface.
    pub fn to_json(&self) -> serde_json::Value {
        let state = self.state.lock();
        let counts = state.store.counts();
        serde_json::json!({
            "objects_total": counts.total(),
            "proposals": counts.proposals,
            "records": counts.records,
            "triggers": counts.triggers,
            "other": counts.other,
            "erased": counts.erased,
            "votes": state.vote_to_object.len(),
        })
    }
}

impl GovernanceApi for GovernanceManager {
    fn process_message(&self, from: &PeerInfo, message: PeerMessage) {
        match message {
            PeerMessage::GovernanceSync { parent, filter } => {
                self.handle_governance_sync(from, parent, filter)
            }
            PeerMessage::Object(obj) => self.handle_object(from, obj),
            PeerMessage::Vote(vote) => self.handle_vote(from, vote),
            PeerMessage::SyncStatusCount { kind, count } => {
                debug!(peer = from.id, ?kind, count, "sync status marker received");
            }
            PeerMessage::Reject { command, code, reason } => {
                debug!(peer = from.id, %command, code, %reason, "peer rejected our message");
            }
        }
    }

    fn do_maintenance(&self) {
        GovernanceManager::do_maintenance(self);
    }

    fn updated_block_tip(&self, height: u64) {
        GovernanceManager::updated_block_tip(self, height);
    }

    fn confirm_inventory_request(&self, inv: &Inv) -> bool {
        GovernanceManager::confirm_inventory_request(self, inv)
    }

    fn have_object(&self, hash: &Hash) -> bool {
        self.have_object_for_hash(hash)
    }

    fn have_vote(&self, hash: &Hash) -> bool {
        self.have_vote_for_hash(hash)
    }
}

/// Inventory helpers shared across the service modules.
pub(crate) fn object_inv(hash: Hash) -> Inv {
    Inv { kind: InvKind::Object, hash }
}

pub(crate) fn vote_inv(hash: Hash) -> Inv {
    Inv { kind: InvKind::Vote, hash }
}

/// Whether a vote on this object/signal must be signed with the voting key
/// alone.
pub(crate) fn only_voting_key_allowed(obj: &GovernanceObject, signal: VoteSignal) -> bool {
    use crate::domain::entities::ObjectType;
    matches!(obj.object_type, ObjectType::Proposal | ObjectType::Record)
        && signal == VoteSignal::Funding
}

/// Next superblock height strictly after `height`.
pub(crate) fn next_superblock_height(height: u64, cycle_blocks: u64) -> u64 {
    (height / cycle_blocks + 1) * cycle_blocks
}

/// The zero hash marks a full-sync request.
pub(crate) fn is_full_sync_request(parent: &Hash) -> bool {
    *parent == ZERO_HASH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_superblock_height_rounds_up_to_the_cycle() {
        assert_eq!(next_superblock_height(0, 180), 180);
        assert_eq!(next_superblock_height(179, 180), 180);
        assert_eq!(next_superblock_height(180, 180), 360);
        assert_eq!(next_superblock_height(181, 180), 360);
    }
}
