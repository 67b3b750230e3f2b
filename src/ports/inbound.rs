//! Inbound (driving) port for the governance subsystem.
//!
//! The narrow surface the daemon wires to its message-processor threads,
//! scheduler, and chain notifications.

use crate::domain::entities::Hash;
use crate::ports::outbound::{Inv, PeerInfo, PeerMessage};

/// What the rest of the node may ask of the governance manager.
pub trait GovernanceApi: Send + Sync {
    /// Handle one governance wire message from a peer.
    fn process_message(&self, from: &PeerInfo, message: PeerMessage);

    /// Periodic cleanup; invoked by the scheduler while synced.
    fn do_maintenance(&self);

    /// React to a new best chain tip.
    fn updated_block_tip(&self, height: u64);

    /// Decide whether an advertised inventory entry should be fetched, and
    /// record the solicitation if so.
    fn confirm_inventory_request(&self, inv: &Inv) -> bool;

    /// Whether this node holds the object (accepted or postponed).
    fn have_object(&self, hash: &Hash) -> bool;

    /// Whether this node holds the vote.
    fn have_vote(&self, hash: &Hash) -> bool;
}
