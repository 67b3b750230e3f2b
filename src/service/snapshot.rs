//! # Snapshot Persistence
//!
//! The manager's durable state is one versioned snapshot: every accepted
//! object (vote files included), the erased-hash memory, and the masternode
//! list the last voting-key diff ran against. On load the secondary indices
//! are rebuilt and triggers re-registered; a trigger the registry rejects
//! comes back flagged for deletion.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::entities::{GovernanceObject, Hash, ObjectType};
use crate::domain::errors::GovernanceError;
use crate::ports::outbound::MasternodeList;

use super::GovernanceManager;

/// Version tag checked on load; a mismatch aborts startup.
pub const SNAPSHOT_VERSION: &str = "mn-governance-snapshot-1";

/// The on-disk form of the manager's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceSnapshot {
    pub version: String,
    pub objects: Vec<GovernanceObject>,
    pub erased: Vec<(Hash, i64)>,
    pub last_mn_list: MasternodeList,
}

impl GovernanceManager {
    /// Capture the current persistent state.
    pub fn snapshot(&self) -> GovernanceSnapshot {
        let state = self.state.lock();
        GovernanceSnapshot {
            version: SNAPSHOT_VERSION.to_string(),
            objects: state.store.accepted().map(|(_, obj)| obj.clone()).collect(),
            erased: state.store.erased_entries(),
            last_mn_list: state.last_mn_list.clone(),
        }
    }

    /// Encode the snapshot for the caller to persist.
    pub fn save_snapshot(&self) -> Result<Vec<u8>, GovernanceError> {
        bincode::serialize(&self.snapshot()).map_err(|e| GovernanceError::Snapshot(e.to_string()))
    }

    /// Replace all state from an encoded snapshot and rebuild the indices.
    pub fn load_snapshot(&self, bytes: &[u8]) -> Result<(), GovernanceError> {
        let snapshot: GovernanceSnapshot =
            bincode::deserialize(bytes).map_err(|e| GovernanceError::Snapshot(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(GovernanceError::Snapshot(format!(
                "unknown snapshot version: {}",
                snapshot.version
            )));
        }

        {
            let mut state = self.state.lock();
            state.store = crate::domain::store::ObjectStore::new();
            for obj in snapshot.objects {
                state.store.insert_accepted(obj);
            }
            for (hash, retain_until) in snapshot.erased {
                state.store.remember_erased(hash, retain_until);
            }
            state.last_mn_list = snapshot.last_mn_list;
        }

        self.init_on_load();
        Ok(())
    }

    /// Rebuild the vote index from every object's vote file and re-register
    /// cached triggers.
    pub fn init_on_load(&self) {
        let started = std::time::Instant::now();
        info!("preparing governance indexes and triggers");

        let now = self.clock.now();
        {
            let mut state = self.state.lock();

            state.vote_to_object.clear();
            let mut index: Vec<(Hash, Hash)> = Vec::new();
            let mut trigger_hashes: Vec<Hash> = Vec::new();
            for (hash, obj) in state.store.accepted() {
                for vote in obj.vote_file.votes() {
                    index.push((vote.hash(), *hash));
                }
                if obj.object_type == ObjectType::Trigger {
                    trigger_hashes.push(*hash);
                }
            }
            for (vote_hash, object_hash) in index {
                state.vote_to_object.insert(vote_hash, object_hash);
            }

            for hash in trigger_hashes {
                if !self.triggers.add_new_trigger(hash) {
                    if let Some(obj) = state.store.get_mut(&hash) {
                        obj.mark_for_deletion(now);
                    }
                }
            }
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            summary = %self.summary(),
            "governance indexes and triggers prepared"
        );
    }
}
