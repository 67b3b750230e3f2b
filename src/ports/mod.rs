//! Ports: the driving API surface and the driven collaborator interfaces.

pub mod inbound;
pub mod outbound;

pub use inbound::GovernanceApi;
pub use outbound::{
    ChainView, CollateralTx, ContentEntry, ContentListing, ContentStore, Inv, InvKind,
    MasternodeDirectory, MasternodeInfo, MasternodeList, ObjectMetaStore, ObserverBus,
    PeerGateway, PeerInfo, PeerMessage, SignatureVerifier, SyncOracle, SystemTimeSource,
    TimeSource, REJECT_OBSOLETE,
};
