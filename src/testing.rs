//! Mock collaborators and artifact builders for tests.
//!
//! Everything here is deterministic: a settable clock, an in-memory chain
//! view, a recording peer gateway, and builders producing objects whose
//! timestamps sit inside the default validation windows relative to
//! [`TEST_EPOCH`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::config::GovernanceConfig;
use crate::domain::entities::{
    GovernanceObject, GovernanceVote, Hash, ObjectType, OutPoint, PeerId, VoteOutcome, VoteSignal,
    ZERO_HASH,
};
use crate::domain::errors::GovernanceError;
use crate::ports::outbound::{
    ChainView, CollateralTx, ContentListing, ContentStore, Inv, MasternodeDirectory,
    MasternodeInfo, MasternodeList, ObjectMetaStore, ObserverBus, PeerGateway, PeerInfo,
    PeerMessage, SignatureVerifier, SyncOracle, TimeSource, TriggerRegistry,
};
use crate::service::{Collaborators, GovernanceManager};

/// Fixed "now" the mock clock starts at.
pub const TEST_EPOCH: i64 = 1_700_000_000;

// =============================================================================
// MOCK COLLABORATORS
// =============================================================================

#[derive(Default)]
pub struct MockChainView {
    height: AtomicU64,
    block_times: Mutex<HashMap<u64, i64>>,
    collaterals: Mutex<HashMap<Hash, CollateralTx>>,
}

impl MockChainView {
    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn set_block_time(&self, height: u64, time: i64) {
        self.block_times.lock().insert(height, time);
    }

    pub fn put_collateral(&self, txid: Hash, tx: CollateralTx) {
        self.collaterals.lock().insert(txid, tx);
    }
}

impl ChainView for MockChainView {
    fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    fn block_time(&self, height: u64) -> Option<i64> {
        self.block_times.lock().get(&height).copied()
    }

    fn collateral_tx(&self, txid: &Hash) -> Option<CollateralTx> {
        self.collaterals.lock().get(txid).copied()
    }
}

#[derive(Default)]
pub struct MockDirectory {
    list: Mutex<MasternodeList>,
    identities: Mutex<Vec<String>>,
    deterministic: AtomicBool,
}

impl MockDirectory {
    pub fn add_masternode(&self, mn: MasternodeInfo) {
        self.list.lock().masternodes.push(mn);
    }

    pub fn set_list(&self, list: MasternodeList) {
        *self.list.lock() = list;
    }

    pub fn set_identities(&self, identities: Vec<String>) {
        *self.identities.lock() = identities;
    }

    pub fn set_deterministic(&self, enforced: bool) {
        self.deterministic.store(enforced, Ordering::SeqCst);
    }
}

impl MasternodeDirectory for MockDirectory {
    fn list_at_tip(&self) -> MasternodeList {
        self.list.lock().clone()
    }

    fn mn_by_collateral(&self, outpoint: &OutPoint) -> Option<MasternodeInfo> {
        self.list.lock().by_collateral(outpoint).cloned()
    }

    fn identities_in_use(&self) -> Vec<String> {
        self.identities.lock().clone()
    }

    fn is_deterministic_enforced(&self, _height: u64) -> bool {
        self.deterministic.load(Ordering::SeqCst)
    }
}

pub struct MockSyncOracle {
    blockchain: AtomicBool,
    synced: AtomicBool,
    bumps: Mutex<Vec<String>>,
}

impl Default for MockSyncOracle {
    fn default() -> Self {
        Self {
            blockchain: AtomicBool::new(true),
            synced: AtomicBool::new(true),
            bumps: Mutex::new(Vec::new()),
        }
    }
}

impl MockSyncOracle {
    pub fn set_blockchain_synced(&self, synced: bool) {
        self.blockchain.store(synced, Ordering::SeqCst);
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }

    pub fn bumps(&self) -> Vec<String> {
        self.bumps.lock().clone()
    }
}

impl SyncOracle for MockSyncOracle {
    fn is_blockchain_synced(&self) -> bool {
        self.blockchain.load(Ordering::SeqCst)
    }

    fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    fn bump_asset_last_time(&self, label: &str) {
        self.bumps.lock().push(label.to_string());
    }
}

#[derive(Default)]
pub struct RecordingPeerGateway {
    peers: Mutex<Vec<PeerInfo>>,
    messages: Mutex<Vec<(PeerId, PeerMessage)>>,
    inventories: Mutex<Vec<(PeerId, Inv)>>,
    relayed: Mutex<Vec<Inv>>,
    ask_fors: Mutex<Vec<(PeerId, Inv)>>,
    removed_ask_fors: Mutex<Vec<Hash>>,
    penalties: Mutex<Vec<(PeerId, i32)>>,
    fulfilled: Mutex<HashSet<(PeerId, String)>>,
}

impl RecordingPeerGateway {
    pub fn set_peers(&self, peers: Vec<PeerInfo>) {
        *self.peers.lock() = peers;
    }

    pub fn messages(&self) -> Vec<(PeerId, PeerMessage)> {
        self.messages.lock().clone()
    }

    pub fn inventories(&self) -> Vec<(PeerId, Inv)> {
        self.inventories.lock().clone()
    }

    pub fn relayed(&self) -> Vec<Inv> {
        self.relayed.lock().clone()
    }

    pub fn ask_fors(&self) -> Vec<(PeerId, Inv)> {
        self.ask_fors.lock().clone()
    }

    pub fn removed_ask_fors(&self) -> Vec<Hash> {
        self.removed_ask_fors.lock().clone()
    }

    pub fn penalties(&self) -> Vec<(PeerId, i32)> {
        self.penalties.lock().clone()
    }

    pub fn clear_recordings(&self) {
        self.messages.lock().clear();
        self.inventories.lock().clear();
        self.relayed.lock().clear();
        self.ask_fors.lock().clear();
        self.removed_ask_fors.lock().clear();
        self.penalties.lock().clear();
    }
}

impl PeerGateway for RecordingPeerGateway {
    fn push_message(&self, peer: PeerId, message: PeerMessage) {
        self.messages.lock().push((peer, message));
    }

    fn push_inventory(&self, peer: PeerId, inv: Inv) {
        self.inventories.lock().push((peer, inv));
    }

    fn relay_inventory(&self, inv: Inv) {
        self.relayed.lock().push(inv);
    }

    fn ask_for(&self, peer: PeerId, inv: Inv) {
        self.ask_fors.lock().push((peer, inv));
    }

    fn remove_ask_for(&self, hash: &Hash) {
        self.removed_ask_fors.lock().push(*hash);
    }

    fn connected_peers(&self) -> Vec<PeerInfo> {
        self.peers.lock().clone()
    }

    fn misbehaving(&self, peer: PeerId, score: i32) {
        self.penalties.lock().push((peer, score));
    }

    fn has_fulfilled(&self, peer: PeerId, label: &str) -> bool {
        self.fulfilled.lock().contains(&(peer, label.to_string()))
    }

    fn add_fulfilled(&self, peer: PeerId, label: &str) {
        self.fulfilled.lock().insert((peer, label.to_string()));
    }
}

#[derive(Default)]
pub struct MockContentStore {
    listings: Mutex<HashMap<String, ContentListing>>,
    pins: Mutex<Vec<String>>,
    unpins: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl MockContentStore {
    pub fn put_listing(&self, path: &str, listing: ContentListing) {
        self.listings.lock().insert(path.to_string(), listing);
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn pins(&self) -> Vec<String> {
        self.pins.lock().clone()
    }

    pub fn unpins(&self) -> Vec<String> {
        self.unpins.lock().clone()
    }
}

impl ContentStore for MockContentStore {
    fn files_ls(&self, path: &str) -> Result<ContentListing, GovernanceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GovernanceError::ContentStore("mock failure".into()));
        }
        Ok(self.listings.lock().get(path).cloned().unwrap_or_default())
    }

    fn pin_add(&self, path: &str) -> Result<(), GovernanceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GovernanceError::ContentStore("mock failure".into()));
        }
        self.pins.lock().push(path.to_string());
        Ok(())
    }

    fn pin_rm(&self, path: &str, _recursive: bool) -> Result<(), GovernanceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GovernanceError::ContentStore("mock failure".into()));
        }
        self.unpins.lock().push(path.to_string());
        Ok(())
    }
}

pub struct MockTriggerRegistry {
    accept: AtomicBool,
    registered: Mutex<Vec<Hash>>,
    executed: Mutex<Vec<u64>>,
}

impl Default for MockTriggerRegistry {
    fn default() -> Self {
        Self {
            accept: AtomicBool::new(true),
            registered: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
        }
    }
}

impl MockTriggerRegistry {
    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    pub fn registered(&self) -> Vec<Hash> {
        self.registered.lock().clone()
    }

    pub fn executed(&self) -> Vec<u64> {
        self.executed.lock().clone()
    }
}

impl TriggerRegistry for MockTriggerRegistry {
    fn add_new_trigger(&self, hash: Hash) -> bool {
        self.registered.lock().push(hash);
        self.accept.load(Ordering::SeqCst)
    }

    fn clean_and_remove(&self) {}

    fn execute_best_superblock(&self, height: u64) {
        self.executed.lock().push(height);
    }
}

#[derive(Default)]
pub struct MockMetaStore {
    dirty: Mutex<Vec<Hash>>,
    removed: Mutex<Vec<Hash>>,
}

impl MockMetaStore {
    pub fn mark_dirty(&self, hash: Hash) {
        self.dirty.lock().push(hash);
    }

    pub fn removed(&self) -> Vec<Hash> {
        self.removed.lock().clone()
    }
}

impl ObjectMetaStore for MockMetaStore {
    fn take_dirty_hashes(&self) -> Vec<Hash> {
        std::mem::take(&mut *self.dirty.lock())
    }

    fn remove_object(&self, hash: &Hash) {
        self.removed.lock().push(*hash);
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    objects: Mutex<Vec<Hash>>,
    votes: Mutex<Vec<Hash>>,
}

impl RecordingObserver {
    pub fn objects(&self) -> Vec<Hash> {
        self.objects.lock().clone()
    }

    pub fn votes(&self) -> Vec<Hash> {
        self.votes.lock().clone()
    }
}

impl ObserverBus for RecordingObserver {
    fn notify_object(&self, obj: &GovernanceObject) {
        self.objects.lock().push(obj.hash());
    }

    fn notify_vote(&self, vote: &GovernanceVote) {
        self.votes.lock().push(vote.hash());
    }
}

pub struct MockSignatureVerifier {
    accept: AtomicBool,
}

impl Default for MockSignatureVerifier {
    fn default() -> Self {
        Self { accept: AtomicBool::new(true) }
    }
}

impl MockSignatureVerifier {
    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }
}

impl SignatureVerifier for MockSignatureVerifier {
    fn verify(&self, _message: &Hash, _public_key: &[u8; 32], _signature: &[u8; 64]) -> bool {
        self.accept.load(Ordering::SeqCst)
    }
}

pub struct MockTimeSource {
    now: AtomicI64,
}

impl Default for MockTimeSource {
    fn default() -> Self {
        Self { now: AtomicI64::new(TEST_EPOCH) }
    }
}

impl MockTimeSource {
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

// =============================================================================
// TEST CONTEXT
// =============================================================================

/// All mock collaborators, shared with the manager under test.
pub struct TestContext {
    pub chain: Arc<MockChainView>,
    pub directory: Arc<MockDirectory>,
    pub sync_oracle: Arc<MockSyncOracle>,
    pub peers: Arc<RecordingPeerGateway>,
    pub content: Arc<MockContentStore>,
    pub triggers: Arc<MockTriggerRegistry>,
    pub meta: Arc<MockMetaStore>,
    pub observers: Arc<RecordingObserver>,
    pub signatures: Arc<MockSignatureVerifier>,
    pub clock: Arc<MockTimeSource>,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            chain: Arc::new(MockChainView::default()),
            directory: Arc::new(MockDirectory::default()),
            sync_oracle: Arc::new(MockSyncOracle::default()),
            peers: Arc::new(RecordingPeerGateway::default()),
            content: Arc::new(MockContentStore::default()),
            triggers: Arc::new(MockTriggerRegistry::default()),
            meta: Arc::new(MockMetaStore::default()),
            observers: Arc::new(RecordingObserver::default()),
            signatures: Arc::new(MockSignatureVerifier::default()),
            clock: Arc::new(MockTimeSource::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            chain: self.chain.clone(),
            directory: self.directory.clone(),
            sync_oracle: self.sync_oracle.clone(),
            peers: self.peers.clone(),
            content: self.content.clone(),
            triggers: self.triggers.clone(),
            meta: self.meta.clone(),
            observers: self.observers.clone(),
            signatures: self.signatures.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn manager(&self, cfg: GovernanceConfig) -> GovernanceManager {
        GovernanceManager::new(cfg, self.collaborators())
    }
}

// =============================================================================
// ARTIFACT BUILDERS
// =============================================================================

pub fn masternode(seed: u8) -> MasternodeInfo {
    MasternodeInfo {
        internal_id: seed as u64,
        collateral: OutPoint::new([seed; 32], 0),
        voting_key: [seed.wrapping_add(100); 32],
        operator_key: [seed.wrapping_add(200); 32],
    }
}

pub fn peer(id: PeerId) -> PeerInfo {
    PeerInfo { id, version: 70_220, outbound_masternode: false, inbound: false }
}

pub fn collateral(amount: u64, confirmations: u32, block_height: u64) -> CollateralTx {
    CollateralTx {
        amount,
        confirmations,
        block_hash: Some([0xB0; 32]),
        block_height: Some(block_height),
    }
}

/// A proposal-shaped JSON payload with a window open at [`TEST_EPOCH`].
pub fn proposal_payload(name: &str, content_id: Option<&str>) -> Vec<u8> {
    let mut doc = serde_json::json!({
        "name": name,
        "start_epoch": TEST_EPOCH - 86_400,
        "end_epoch": TEST_EPOCH + 30 * 86_400,
        "payment_amount": 100u64,
    });
    if let Some(cid) = content_id {
        doc["ipfscid"] = serde_json::Value::String(cid.to_string());
    }
    serde_json::to_vec(&doc).unwrap()
}

pub fn make_proposal(name: &str, content_id: Option<&str>, collateral_hash: Hash) -> GovernanceObject {
    GovernanceObject::new(
        ZERO_HASH,
        1,
        TEST_EPOCH - 100,
        collateral_hash,
        proposal_payload(name, content_id),
        ObjectType::Proposal,
        OutPoint::default(),
        [0u8; 64],
    )
}

pub fn make_record(name: &str, content_id: &str, collateral_hash: Hash) -> GovernanceObject {
    GovernanceObject::new(
        ZERO_HASH,
        1,
        TEST_EPOCH - 100,
        collateral_hash,
        proposal_payload(name, Some(content_id)),
        ObjectType::Record,
        OutPoint::default(),
        [0u8; 64],
    )
}

pub fn make_trigger(outpoint: OutPoint, creation_time: i64) -> GovernanceObject {
    GovernanceObject::new(
        ZERO_HASH,
        1,
        creation_time,
        ZERO_HASH,
        br#"{"event_block_height": 1000}"#.to_vec(),
        ObjectType::Trigger,
        outpoint,
        [0u8; 64],
    )
}

pub fn make_vote(
    parent: Hash,
    outpoint: OutPoint,
    signal: VoteSignal,
    outcome: VoteOutcome,
    timestamp: i64,
) -> GovernanceVote {
    GovernanceVote::new(parent, outpoint, signal, outcome, timestamp)
}
