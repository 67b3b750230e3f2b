//! Governance subsystem configuration.
//!
//! Chain-derived consensus parameters plus the manager's own tunables.
//! Defaults reproduce mainnet behavior; tests shrink windows and cycles.

use serde::{Deserialize, Serialize};

/// Base currency unit.
pub const COIN: u64 = 100_000_000;

/// Consensus parameters the governance layer reads from the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Blocks between superblocks.
    pub superblock_cycle_blocks: u64,
    /// Target block spacing, seconds.
    pub block_spacing_secs: i64,
    /// Collateral securing a high-tier submission.
    pub high_collateral: u64,
    /// Collateral securing a low-tier submission.
    pub low_collateral: u64,
    /// Confirmations a collateral transaction needs before admission.
    pub min_collateral_confirmations: u32,
    /// Expected element count for the vote delta filter.
    pub governance_filter_elements: usize,
    /// Target false positive rate for the vote delta filter.
    pub governance_filter_fp_rate: f64,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            superblock_cycle_blocks: 180,
            block_spacing_secs: 120,
            high_collateral: 5_000 * COIN,
            low_collateral: 100 * COIN,
            min_collateral_confirmations: 6,
            governance_filter_elements: 20_000,
            governance_filter_fp_rate: 0.001,
        }
    }
}

impl ConsensusParams {
    /// Seconds between superblocks.
    pub fn superblock_cycle_seconds(&self) -> i64 {
        self.superblock_cycle_blocks as i64 * self.block_spacing_secs
    }
}

/// Manager tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Peers below this protocol version are rejected.
    pub min_peer_proto_version: u32,
    /// Peers at or above this version speak the filtered vote sync.
    pub filter_proto_version: u32,
    /// Entry bound for the vote, invalid-vote and orphan-vote caches.
    pub max_cache_size: usize,
    /// Lifetime of an orphan entry, seconds.
    pub orphan_expiration_secs: i64,
    /// Grace between delete/expiry and the actual purge, seconds.
    pub deletion_delay_secs: i64,
    /// In-flight orphan objects tolerated per masternode.
    pub max_orphans_per_masternode: usize,
    /// How far in the future a creation time may sit, seconds.
    pub max_time_future_deviation_secs: i64,
    /// Propagation horizon used to schedule additional trigger relays.
    pub reliable_propagation_secs: i64,
    /// Minimum spacing between vote updates in one slot, seconds.
    pub vote_update_min_secs: i64,
    /// Per-(object, peer) cooldown for targeted vote requests, seconds.
    pub vote_ask_timeout_secs: i64,
    /// How many peers are asked for one object's votes.
    pub peers_per_hash_max: usize,
    /// Largest payload the content-pin bridge will pin, bytes.
    pub max_pin_bytes: u64,
    /// Whether this node runs in masternode mode (enables pinning).
    pub masternode_mode: bool,
    pub consensus: ConsensusParams,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            min_peer_proto_version: 70_208,
            filter_proto_version: 70_209,
            max_cache_size: 300_000,
            orphan_expiration_secs: 600,
            deletion_delay_secs: 600,
            max_orphans_per_masternode: 10,
            max_time_future_deviation_secs: 3600,
            reliable_propagation_secs: 60,
            vote_update_min_secs: 60,
            vote_ask_timeout_secs: 3600,
            peers_per_hash_max: 3,
            max_pin_bytes: 10_000_000,
            masternode_mode: false,
            consensus: ConsensusParams::default(),
        }
    }
}

impl GovernanceConfig {
    /// Triggers allowed per masternode per cycle, with a 10% fudge.
    pub fn max_trigger_rate(&self) -> f64 {
        2.0 * 1.1 / self.consensus.superblock_cycle_seconds() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_seconds_multiplies_blocks_by_spacing() {
        let params = ConsensusParams {
            superblock_cycle_blocks: 180,
            block_spacing_secs: 120,
            ..ConsensusParams::default()
        };
        assert_eq!(params.superblock_cycle_seconds(), 21_600);
    }

    #[test]
    fn max_trigger_rate_matches_two_per_cycle_with_fudge() {
        let cfg = GovernanceConfig::default();
        let cycle = cfg.consensus.superblock_cycle_seconds() as f64;
        assert!((cfg.max_trigger_rate() - 2.2 / cycle).abs() < 1e-12);
    }
}
