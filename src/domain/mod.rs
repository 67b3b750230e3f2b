//! Pure governance domain: data structures and validation, no I/O.

pub mod bloom;
pub mod bounded_cache;
pub mod config;
pub mod entities;
pub mod errors;
pub mod rate_buffer;
pub mod store;
pub mod validation;
pub mod vote_file;

pub use bloom::VoteFilter;
pub use bounded_cache::{BoundedCache, BoundedMultiMap};
pub use config::{ConsensusParams, GovernanceConfig};
pub use entities::{
    short_hash, GovernanceObject, GovernanceVote, Hash, ObjectType, OutPoint, PayloadDocument,
    PeerId, PublicKey, Signature, VoteOutcome, VoteSignal, ZERO_HASH,
};
pub use errors::{AdmissionFault, FaultSeverity, GovernanceError};
pub use rate_buffer::{LastObjectRecord, RateCheckBuffer};
pub use store::{ObjectCounts, ObjectStore, OrphanInfo};
pub use vote_file::{VoteFile, VoteInstance, VoteRecord};
