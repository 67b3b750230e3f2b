//! Outbound (driven) ports for the governance subsystem.
//!
//! Everything the manager needs from the rest of the node is behind one of
//! these traits: the chain, the deterministic masternode directory, the sync
//! oracle, the peer transport, the content-addressed store, the trigger
//! registry, the metadata store, the observer bus, signature verification,
//! and the clock.

use serde::{Deserialize, Serialize};

use crate::domain::bloom::VoteFilter;
use crate::domain::entities::{
    GovernanceObject, GovernanceVote, Hash, OutPoint, PeerId, PublicKey, Signature,
};
use crate::domain::errors::GovernanceError;

/// Reject code for peers speaking an obsolete protocol version.
pub const REJECT_OBSOLETE: u8 = 0x11;

// =============================================================================
// CHAIN
// =============================================================================

/// A collateral transaction as the chain sees it.
#[derive(Debug, Clone, Copy)]
pub struct CollateralTx {
    /// Value of the collateral output.
    pub amount: u64,
    pub confirmations: u32,
    /// Block containing the transaction, if confirmed.
    pub block_hash: Option<Hash>,
    pub block_height: Option<u64>,
}

/// Read-only view of the active chain.
pub trait ChainView: Send + Sync {
    fn height(&self) -> u64;

    /// Timestamp of the block at `height` on the active chain.
    fn block_time(&self, height: u64) -> Option<i64>;

    /// Look up a collateral transaction by txid.
    fn collateral_tx(&self, txid: &Hash) -> Option<CollateralTx>;
}

// =============================================================================
// MASTERNODE DIRECTORY
// =============================================================================

/// One entry of the deterministic masternode list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodeInfo {
    /// Stable id the directory assigns at registration.
    pub internal_id: u64,
    pub collateral: OutPoint,
    pub voting_key: PublicKey,
    pub operator_key: PublicKey,
}

/// Snapshot of the masternode list at some chain tip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasternodeList {
    pub height: u64,
    pub masternodes: Vec<MasternodeInfo>,
}

impl MasternodeList {
    pub fn enabled_count(&self) -> usize {
        self.masternodes.len()
    }

    pub fn by_collateral(&self, outpoint: &OutPoint) -> Option<&MasternodeInfo> {
        self.masternodes.iter().find(|mn| mn.collateral == *outpoint)
    }

    fn by_internal_id(&self, id: u64) -> Option<&MasternodeInfo> {
        self.masternodes.iter().find(|mn| mn.internal_id == id)
    }

    /// Collateral outpoints whose votes are invalidated by the step from
    /// `self` to `newer`: key rotations and removals.
    pub fn changed_key_outpoints(&self, newer: &MasternodeList) -> Vec<OutPoint> {
        let mut changed = Vec::new();
        for old in &self.masternodes {
            match newer.by_internal_id(old.internal_id) {
                Some(new) => {
                    if new.voting_key != old.voting_key || new.operator_key != old.operator_key {
                        changed.push(old.collateral);
                    }
                }
                None => changed.push(old.collateral),
            }
        }
        changed
    }
}

/// The authoritative masternode list at chain tip.
pub trait MasternodeDirectory: Send + Sync {
    fn list_at_tip(&self) -> MasternodeList;

    fn mn_by_collateral(&self, outpoint: &OutPoint) -> Option<MasternodeInfo>;

    /// Identities currently claimed by registered masternodes.
    fn identities_in_use(&self) -> Vec<String>;

    /// Whether deterministic masternode semantics are enforced at `height`.
    fn is_deterministic_enforced(&self, height: u64) -> bool;
}

// =============================================================================
// SYNC ORACLE
// =============================================================================

/// Chain-sync state, consulted as a boolean gate.
pub trait SyncOracle: Send + Sync {
    fn is_blockchain_synced(&self) -> bool;

    /// Blockchain and masternode list both synced.
    fn is_synced(&self) -> bool;

    /// Record governance activity so the sync tracker does not stall.
    fn bump_asset_last_time(&self, label: &str);
}

// =============================================================================
// PEER TRANSPORT
// =============================================================================

/// Inventory kinds this subsystem advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvKind {
    Object,
    Vote,
}

/// An inventory advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inv {
    pub kind: InvKind,
    pub hash: Hash,
}

/// Governance wire messages.
#[derive(Debug, Clone)]
pub enum PeerMessage {
    /// Request full sync (zero parent) or one object's votes (parent set,
    /// filter carrying the votes the requester already has).
    GovernanceSync {
        parent: Hash,
        filter: Option<VoteFilter>,
    },
    Object(GovernanceObject),
    Vote(GovernanceVote),
    /// End-of-batch marker emitted after serving a sync.
    SyncStatusCount { kind: InvKind, count: usize },
    /// Protocol-level rejection.
    Reject {
        command: String,
        code: u8,
        reason: String,
    },
}

/// What the peer layer knows about a connected node.
#[derive(Debug, Clone, Copy)]
pub struct PeerInfo {
    pub id: PeerId,
    pub version: u32,
    /// Outbound short-lived "masternode" connection.
    pub outbound_masternode: bool,
    pub inbound: bool,
}

/// Narrow channel into the generic peer transport.
pub trait PeerGateway: Send + Sync {
    fn push_message(&self, peer: PeerId, message: PeerMessage);

    fn push_inventory(&self, peer: PeerId, inv: Inv);

    /// Gossip an inventory entry to every connected peer.
    fn relay_inventory(&self, inv: Inv);

    /// Schedule a deferred fetch of `inv` from `peer`.
    fn ask_for(&self, peer: PeerId, inv: Inv);

    /// Clear any pending fetch for `hash` (a copy arrived).
    fn remove_ask_for(&self, hash: &Hash);

    fn connected_peers(&self) -> Vec<PeerInfo>;

    fn misbehaving(&self, peer: PeerId, score: i32);

    /// Per-peer once-only bookkeeping for expensive requests.
    fn has_fulfilled(&self, peer: PeerId, label: &str) -> bool;
    fn add_fulfilled(&self, peer: PeerId, label: &str);
}

// =============================================================================
// CONTENT-ADDRESSED STORE
// =============================================================================

/// A node of a content listing tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub children: Vec<ContentEntry>,
}

/// Directory listing returned by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentListing {
    pub entries: Vec<ContentEntry>,
}

impl ContentListing {
    /// Sum of every leaf size, recursively.
    pub fn total_size(&self) -> u64 {
        fn walk(entry: &ContentEntry) -> u64 {
            if entry.children.is_empty() {
                entry.size
            } else {
                entry.children.iter().map(walk).sum()
            }
        }
        self.entries.iter().map(walk).sum()
    }
}

/// Pin/list/unpin RPC of the external content-addressed store.
///
/// Every call may block on the network and may fail; callers treat failures
/// as best-effort.
pub trait ContentStore: Send + Sync {
    fn files_ls(&self, path: &str) -> Result<ContentListing, GovernanceError>;
    fn pin_add(&self, path: &str) -> Result<(), GovernanceError>;
    fn pin_rm(&self, path: &str, recursive: bool) -> Result<(), GovernanceError>;
}

// =============================================================================
// TRIGGERS, METADATA, OBSERVERS
// =============================================================================

/// The superblock trigger manager.
pub trait TriggerRegistry: Send + Sync {
    /// Register an admitted trigger; false means the trigger is unusable.
    fn add_new_trigger(&self, hash: Hash) -> bool;

    /// Let the registry expire and invalidate its own state.
    fn clean_and_remove(&self);

    fn execute_best_superblock(&self, height: u64);
}

/// External metadata bookkeeping for governance objects.
pub trait ObjectMetaStore: Send + Sync {
    /// Objects whose vote caches must be recomputed; cleared by the call.
    fn take_dirty_hashes(&self) -> Vec<Hash>;

    fn remove_object(&self, hash: &Hash);
}

/// Downstream notification fan-out (ZMQ, scripts, indexers).
pub trait ObserverBus: Send + Sync {
    fn notify_object(&self, obj: &GovernanceObject);
    fn notify_vote(&self, vote: &GovernanceVote);
}

// =============================================================================
// SIGNATURES AND TIME
// =============================================================================

/// Verifies a signature over a 32-byte message digest.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, message: &Hash, public_key: &PublicKey, signature: &Signature) -> bool;
}

/// Time source for consistent timestamp handling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    /// Current time, epoch seconds.
    fn now(&self) -> i64;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mn(id: u64, collateral_byte: u8, voting_byte: u8, operator_byte: u8) -> MasternodeInfo {
        MasternodeInfo {
            internal_id: id,
            collateral: OutPoint::new([collateral_byte; 32], 0),
            voting_key: [voting_byte; 32],
            operator_key: [operator_byte; 32],
        }
    }

    #[test]
    fn diff_flags_voting_key_rotation_and_removal() {
        let old = MasternodeList {
            height: 100,
            masternodes: vec![mn(1, 0xA1, 1, 2), mn(2, 0xA2, 3, 4), mn(3, 0xA3, 5, 6)],
        };
        let new = MasternodeList {
            height: 101,
            // mn 1 rotates its voting key, mn 3 is gone, mn 2 unchanged.
            masternodes: vec![mn(1, 0xA1, 9, 2), mn(2, 0xA2, 3, 4)],
        };

        let changed = old.changed_key_outpoints(&new);
        assert_eq!(changed.len(), 2);
        assert!(changed.contains(&OutPoint::new([0xA1; 32], 0)));
        assert!(changed.contains(&OutPoint::new([0xA3; 32], 0)));
    }

    #[test]
    fn diff_flags_operator_key_rotation() {
        let old = MasternodeList {
            height: 100,
            masternodes: vec![mn(1, 0xA1, 1, 2)],
        };
        let new = MasternodeList {
            height: 101,
            masternodes: vec![mn(1, 0xA1, 1, 7)],
        };
        assert_eq!(old.changed_key_outpoints(&new).len(), 1);
    }

    #[test]
    fn listing_total_size_sums_leaves_recursively() {
        let listing = ContentListing {
            entries: vec![
                ContentEntry { name: "a".into(), size: 10, children: vec![] },
                ContentEntry {
                    name: "dir".into(),
                    size: 0,
                    children: vec![
                        ContentEntry { name: "b".into(), size: 20, children: vec![] },
                        ContentEntry {
                            name: "nested".into(),
                            size: 0,
                            children: vec![ContentEntry {
                                name: "c".into(),
                                size: 30,
                                children: vec![],
                            }],
                        },
                    ],
                },
            ],
        };
        assert_eq!(listing.total_size(), 60);
    }
}
