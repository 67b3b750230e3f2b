//! # Content-Pin Bridge
//!
//! Mirrors accepted record/proposal payloads into the external
//! content-addressed store and releases them on eviction.
//!
//! Every store interaction is best effort: listing, pinning and unpinning
//! failures are logged and swallowed, never surfaced into admission or
//! eviction. Only masternode-mode nodes pin at all.

use tracing::{debug, info, warn};

use crate::domain::config::GovernanceConfig;
use crate::domain::entities::{GovernanceObject, ObjectType};

use super::{GovernanceManager, PeerAction};

/// Deferred pin action for an object entering the store, if its type and
/// payload call for one.
pub(crate) fn pin_action_for(cfg: &GovernanceConfig, obj: &GovernanceObject) -> Option<PeerAction> {
    if !cfg.masternode_mode {
        return None;
    }
    if !matches!(obj.object_type, ObjectType::Proposal | ObjectType::Record) {
        debug!(object_type = ?obj.object_type, "not a record or proposal, skipping pin");
        return None;
    }
    let cid = obj.content_id()?;
    if cid.is_empty() || cid == "0" {
        return None;
    }
    Some(PeerAction::PinContent(cid))
}

impl GovernanceManager {
    /// List the content tree, check the size cap, and pin.
    pub(crate) fn pin_content(&self, cid: &str) {
        let path = format!("/ipfs/{cid}");

        let listing = match self.content.files_ls(&path) {
            Ok(listing) => listing,
            Err(e) => {
                warn!(%path, error = %e, "content listing failed, skipping pin");
                return;
            }
        };

        let total = listing.total_size();
        if total > self.cfg.max_pin_bytes {
            warn!(
                %path,
                total,
                limit = self.cfg.max_pin_bytes,
                "content too large, refusing to pin"
            );
            return;
        }
        debug!(%path, total, limit = self.cfg.max_pin_bytes, "content size check passed");

        match self.content.pin_add(&path) {
            Ok(()) => info!(%path, "content pinned"),
            Err(e) => warn!(%path, error = %e, "pin failed"),
        }
    }

    /// Recursively unpin an evicted record's content.
    pub(crate) fn unpin_content(&self, cid: &str) {
        let path = format!("/ipfs/{cid}");
        match self.content.pin_rm(&path, true) {
            Ok(()) => info!(%path, "content unpinned"),
            Err(e) => warn!(%path, error = %e, "unpin failed"),
        }
    }
}
