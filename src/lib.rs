//! # Masternode Governance Subsystem
//!
//! Receives, validates, replicates, and garbage-collects governance artifacts
//! (proposals, records, and superblock triggers) together with the votes
//! masternodes cast on them, across an untrusted peer-to-peer network.
//! Accepted record and proposal payloads are mirrored into an external
//! content-addressed store while they remain live.
//!
//! ## Domain Invariants
//!
//! | ID | Invariant | Enforcement Location |
//! |----|-----------|---------------------|
//! | INVARIANT-1 | An object hash resides in at most one of accepted / postponed / orphan / erased | `domain/store.rs` - every insert checks residency |
//! | INVARIANT-2 | Every vote-index entry resolves to an accepted object | `service/maintenance.rs` - eviction scrubs the index |
//! | INVARIANT-3 | At most one admission per solicitation of a hash to a peer | `service/sync.rs` - `take_requested` consumes the entry |
//! | INVARIANT-4 | A vote is in an object's vote file iff vote processing accepted it | `domain/vote_file.rs` - single insertion path |
//! | INVARIANT-5 | Triggers per masternode per cycle stay under the rate cap | `domain/rate_buffer.rs` + `service/admission.rs` |
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OUTER LAYER                                │
//! │  adapters/ - HTTP content store, ed25519 signature checks       │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER                               │
//! │  ports/inbound.rs  - GovernanceApi trait                        │
//! │  ports/outbound.rs - ChainView, MasternodeDirectory, PeerGateway│
//! │                      SyncOracle, ContentStore, TriggerRegistry, │
//! │                      ObjectMetaStore, ObserverBus, TimeSource   │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      INNER LAYER                                │
//! │  domain/entities.rs      - GovernanceObject, GovernanceVote     │
//! │  domain/store.rs         - four-way object store                │
//! │  domain/vote_file.rs     - per-object latest-wins vote records  │
//! │  domain/rate_buffer.rs   - trigger submission rate cap          │
//! │  domain/bounded_cache.rs - FIFO caches for vote indices         │
//! │  domain/bloom.rs         - vote delta filter for targeted sync  │
//! │  domain/validation.rs    - payload / content-id / identity      │
//! │  domain/errors.rs        - GovernanceError, AdmissionFault      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! peer ──GovernanceSync──▶ sync.rs ──inv──▶ peer
//! peer ──Object──▶ admission.rs ──▶ store ──▶ relay + pin + notify
//! peer ──Vote──▶ votes.rs ──▶ vote file ──▶ relay + notify
//! scheduler ──▶ maintenance.rs (expire, re-check orphans/postponed)
//! chain ──new tip──▶ tip.rs (invalid-vote scrub, postponed re-check)
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;
pub mod testing;

pub use domain::config::{ConsensusParams, GovernanceConfig};
pub use domain::entities::{
    GovernanceObject, GovernanceVote, Hash, ObjectType, OutPoint, PeerId, VoteOutcome, VoteSignal,
};
pub use domain::errors::{AdmissionFault, FaultSeverity, GovernanceError};
pub use service::{Collaborators, GovernanceManager};
