//! # Core Governance Entities
//!
//! The wire-visible artifacts of the subsystem: governance objects and the
//! votes masternodes cast on them, plus the primitive types they are built
//! from.
//!
//! Object and vote hashes are SHA-256 over the signable fields; the same
//! digest is the message masternodes sign.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha2::{Digest, Sha256};

use super::errors::GovernanceError;
use super::vote_file::VoteFile;

/// A 32-byte hash.
pub type Hash = [u8; 32];

/// A 64-byte Ed25519 signature.
pub type Signature = [u8; 64];

/// A 32-byte Ed25519 public key.
pub type PublicKey = [u8; 32];

/// Identifier the peer layer assigns to a connected node.
pub type PeerId = u64;

/// The all-zero hash, used as "no parent" and "full sync" sentinel.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Hex of the first four hash bytes, for log lines.
pub fn short_hash(hash: &Hash) -> String {
    hash.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

/// A reference to a transaction output.
///
/// Secures either an object submission (collateral) or a masternode
/// registration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct OutPoint {
    pub txid: Hash,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash, vout: u32) -> Self {
        Self { txid, vout }
    }

    /// The zero outpoint marks "no masternode attached".
    pub fn is_null(&self) -> bool {
        self.txid == ZERO_HASH && self.vout == 0
    }

    /// Short textual form for log lines.
    pub fn short(&self) -> String {
        format!("{}-{}", short_hash(&self.txid), self.vout)
    }
}

/// The kind of governance artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    /// Funding proposal voted on by masternodes.
    Proposal,
    /// Artifact whose bulk content lives in the content-addressed store.
    Record,
    /// Proposed funding set for an upcoming superblock.
    Trigger,
    /// Forward-compatible catch-all.
    Other,
}

impl ObjectType {
    fn wire_byte(self) -> u8 {
        match self {
            ObjectType::Proposal => 1,
            ObjectType::Record => 2,
            ObjectType::Trigger => 3,
            ObjectType::Other => 0,
        }
    }
}

/// What a vote is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteSignal {
    /// Should the object be funded at the next superblock.
    Funding,
    /// Is the object valid.
    Valid,
    /// Should the object be deleted.
    Delete,
    /// Is the object endorsed.
    Endorsed,
}

impl VoteSignal {
    fn wire_byte(self) -> u8 {
        match self {
            VoteSignal::Funding => 1,
            VoteSignal::Valid => 2,
            VoteSignal::Delete => 3,
            VoteSignal::Endorsed => 4,
        }
    }
}

/// The direction of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteOutcome {
    Yes,
    No,
    Abstain,
}

impl VoteOutcome {
    fn wire_byte(self) -> u8 {
        match self {
            VoteOutcome::Yes => 1,
            VoteOutcome::No => 2,
            VoteOutcome::Abstain => 3,
        }
    }
}

/// The structured document carried in an object's payload.
///
/// Payloads arrive as JSON; unknown fields are preserved-by-ignoring so old
/// nodes tolerate newer documents. Every field is optional at the data-model
/// level; the validators decide which ones a given object type requires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Content id of the payload body in the external store (CID v0).
    #[serde(default, rename = "ipfscid", skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    /// Human-facing identity of the submitter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_epoch: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_epoch: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_amount: Option<u64>,
}

/// A signed governance artifact.
///
/// The mutable tail (`flags`) caches derived state: it never feeds the hash
/// or the signature and is recomputed from votes and validation results.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceObject {
    /// Hash of the parent object; zero at top level.
    pub parent_hash: Hash,
    /// Revision of the object format.
    pub revision: u32,
    /// Submitter-asserted creation time, epoch seconds.
    pub creation_time: i64,
    /// Transaction securing the submission.
    pub collateral_hash: Hash,
    /// JSON payload document bytes.
    pub data: Vec<u8>,
    pub object_type: ObjectType,
    /// Submitting masternode; null unless masternode-signed (mandatory for
    /// triggers).
    pub masternode_outpoint: OutPoint,
    #[serde_as(as = "Bytes")]
    pub signature: Signature,

    /// Cached, vote-derived state.
    pub flags: ObjectFlags,
    /// Votes accepted for this object.
    pub vote_file: VoteFile,
}

/// Cached flags derived from votes and validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectFlags {
    /// Vote caches need recomputing.
    pub dirty: bool,
    /// Funding majority reached.
    pub cached_funding: bool,
    /// Validity majority reached.
    pub cached_valid: bool,
    /// Delete majority reached; the object will be purged after the delay.
    pub cached_delete: bool,
    /// Endorsement majority reached.
    pub cached_endorsed: bool,
    /// Past its useful lifetime.
    pub expired: bool,
    /// Record reached funding and its content must be retained.
    pub record_locked: bool,
    /// Record is permanently retained even through delete/expiry.
    pub perm_locked: bool,
    /// When delete/expiry was first observed, epoch seconds; 0 = unset.
    pub deletion_time: i64,
    /// Superblock height that would fund this object, resolved from the
    /// collateral transaction's block during admission.
    pub collateral_superblock_height: Option<u64>,
    /// Result of the last local validity check.
    pub locally_valid: bool,
    /// Error string of the last failed local validity check.
    pub validity_error: String,
}

impl GovernanceObject {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parent_hash: Hash,
        revision: u32,
        creation_time: i64,
        collateral_hash: Hash,
        data: Vec<u8>,
        object_type: ObjectType,
        masternode_outpoint: OutPoint,
        signature: Signature,
    ) -> Self {
        Self {
            parent_hash,
            revision,
            creation_time,
            collateral_hash,
            data,
            object_type,
            masternode_outpoint,
            signature,
            flags: ObjectFlags {
                locally_valid: false,
                ..ObjectFlags::default()
            },
            vote_file: VoteFile::default(),
        }
    }

    /// The content hash identifying this object.
    ///
    /// Covers exactly the signable fields; cached flags and the vote file
    /// never influence identity.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.parent_hash);
        hasher.update(self.revision.to_le_bytes());
        hasher.update(self.creation_time.to_le_bytes());
        hasher.update(self.collateral_hash);
        hasher.update(&self.data);
        hasher.update([self.object_type.wire_byte()]);
        hasher.update(self.masternode_outpoint.txid);
        hasher.update(self.masternode_outpoint.vout.to_le_bytes());
        hasher.finalize().into()
    }

    /// Parse the payload as a structured document.
    pub fn document(&self) -> Result<PayloadDocument, GovernanceError> {
        serde_json::from_slice(&self.data)
            .map_err(|e| GovernanceError::MalformedPayload(e.to_string()))
    }

    /// Content id carried by the payload, if the payload parses and has one.
    pub fn content_id(&self) -> Option<String> {
        self.document().ok().and_then(|doc| doc.content_id)
    }

    /// Recompute the vote-derived flags against the current vote file.
    ///
    /// `enabled_masternodes` is the size of the live masternode set; the
    /// absolute majority requirement is a tenth of it, floor one.
    pub fn update_sentinel_variables(&mut self, enabled_masternodes: usize, now: i64) {
        let required = (enabled_masternodes / 10).max(1) as i64;

        self.flags.cached_funding = self.vote_file.net_yes(VoteSignal::Funding) > required;
        self.flags.cached_valid = self.vote_file.net_yes(VoteSignal::Valid) > required;
        self.flags.cached_endorsed = self.vote_file.net_yes(VoteSignal::Endorsed) > required;

        if self.vote_file.net_yes(VoteSignal::Delete) > required && !self.flags.cached_delete {
            self.flags.cached_delete = true;
            if self.flags.deletion_time == 0 {
                self.flags.deletion_time = now;
            }
        }

        // Record locks are sticky: once funded (or endorsed into permanence)
        // the content must survive later delete/expiry signals.
        if self.object_type == ObjectType::Record {
            if self.flags.cached_funding {
                self.flags.record_locked = true;
            }
            if self.flags.cached_endorsed {
                self.flags.perm_locked = true;
            }
        }

        self.flags.dirty = false;
    }

    /// Flag the object for purging after the deletion delay.
    pub fn mark_for_deletion(&mut self, now: i64) {
        self.flags.cached_delete = true;
        if self.flags.deletion_time == 0 {
            self.flags.deletion_time = now;
        }
    }

    pub fn is_set_cached_delete(&self) -> bool {
        self.flags.cached_delete
    }

    pub fn is_set_expired(&self) -> bool {
        self.flags.expired
    }

    /// A record that must never be purged.
    pub fn is_retention_locked(&self) -> bool {
        self.flags.record_locked && self.flags.perm_locked
    }
}

/// A masternode's vote on a governance object.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceVote {
    /// The object this vote targets.
    pub parent_hash: Hash,
    pub masternode_outpoint: OutPoint,
    pub signal: VoteSignal,
    pub outcome: VoteOutcome,
    /// Submitter-asserted vote time, epoch seconds.
    pub timestamp: i64,
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
}

impl GovernanceVote {
    pub fn new(
        parent_hash: Hash,
        masternode_outpoint: OutPoint,
        signal: VoteSignal,
        outcome: VoteOutcome,
        timestamp: i64,
    ) -> Self {
        Self {
            parent_hash,
            masternode_outpoint,
            signal,
            outcome,
            timestamp,
            signature: [0u8; 64],
        }
    }

    /// The hash identifying this vote, also the signed message.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.parent_hash);
        hasher.update(self.masternode_outpoint.txid);
        hasher.update(self.masternode_outpoint.vout.to_le_bytes());
        hasher.update([self.signal.wire_byte()]);
        hasher.update([self.outcome.wire_byte()]);
        hasher.update(self.timestamp.to_le_bytes());
        hasher.finalize().into()
    }

    /// One-line description for log output.
    pub fn describe(&self) -> String {
        format!(
            "vote {} mn={} {:?}/{:?} t={}",
            short_hash(&self.hash()),
            self.masternode_outpoint.short(),
            self.signal,
            self.outcome,
            self.timestamp
        )
    }
}
