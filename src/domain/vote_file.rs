//! # Per-Object Vote File
//!
//! The append-only set of votes accepted for one governance object, plus the
//! latest-wins `(masternode, signal)` slot index the tally reads from.
//!
//! The file stores every accepted vote so peers can be served the full set;
//! the slot index keeps only the newest vote per masternode and signal, which
//! is what counts toward majorities.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::entities::{GovernanceVote, Hash, OutPoint, VoteOutcome, VoteSignal};

/// The latest accepted vote in one `(masternode, signal)` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteInstance {
    pub outcome: VoteOutcome,
    /// When this node accepted the vote, epoch seconds.
    pub created_at: i64,
    /// The submitter-asserted vote time.
    pub vote_timestamp: i64,
}

/// All current slots of a single masternode on one object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoteRecord {
    pub instances: HashMap<VoteSignal, VoteInstance>,
}

/// Vote storage for one governance object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "PersistedVoteFile", into = "PersistedVoteFile")]
pub struct VoteFile {
    votes: Vec<GovernanceVote>,
    known: HashSet<Hash>,
    records: HashMap<OutPoint, VoteRecord>,
}

/// On-disk form: the vote list alone; indices are rebuilt on load.
#[derive(Serialize, Deserialize)]
struct PersistedVoteFile {
    votes: Vec<GovernanceVote>,
}

impl From<PersistedVoteFile> for VoteFile {
    fn from(persisted: PersistedVoteFile) -> Self {
        let mut file = VoteFile::default();
        for vote in persisted.votes {
            let accepted_at = vote.timestamp;
            file.add_vote(vote, accepted_at);
        }
        file
    }
}

impl From<VoteFile> for PersistedVoteFile {
    fn from(file: VoteFile) -> Self {
        PersistedVoteFile { votes: file.votes }
    }
}

impl VoteFile {
    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    pub fn has_vote(&self, hash: &Hash) -> bool {
        self.known.contains(hash)
    }

    pub fn get_vote(&self, hash: &Hash) -> Option<&GovernanceVote> {
        if !self.known.contains(hash) {
            return None;
        }
        self.votes.iter().find(|v| v.hash() == *hash)
    }

    pub fn votes(&self) -> impl Iterator<Item = &GovernanceVote> {
        self.votes.iter()
    }

    /// The latest accepted vote for a `(masternode, signal)` slot.
    pub fn current_instance(&self, outpoint: &OutPoint, signal: VoteSignal) -> Option<&VoteInstance> {
        self.records
            .get(outpoint)
            .and_then(|rec| rec.instances.get(&signal))
    }

    /// All current slots of one masternode.
    pub fn record_for(&self, outpoint: &OutPoint) -> Option<&VoteRecord> {
        self.records.get(outpoint)
    }

    /// Iterate current slots per masternode.
    pub fn records(&self) -> impl Iterator<Item = (&OutPoint, &VoteRecord)> {
        self.records.iter()
    }

    /// Append a vote and take over its `(masternode, signal)` slot.
    ///
    /// Returns false when the vote hash is already on file. Admissibility
    /// (signature, authority, replacement windows) is the caller's job.
    pub fn add_vote(&mut self, vote: GovernanceVote, now: i64) -> bool {
        let hash = vote.hash();
        if !self.known.insert(hash) {
            return false;
        }
        let record = self.records.entry(vote.masternode_outpoint).or_default();
        record.instances.insert(
            vote.signal,
            VoteInstance {
                outcome: vote.outcome,
                created_at: now,
                vote_timestamp: vote.timestamp,
            },
        );
        self.votes.push(vote);
        true
    }

    /// Remove every vote cast by `outpoint`; returns the removed hashes.
    pub fn remove_votes_from(&mut self, outpoint: &OutPoint) -> Vec<Hash> {
        let removed: Vec<Hash> = self
            .votes
            .iter()
            .filter(|v| v.masternode_outpoint == *outpoint)
            .map(|v| v.hash())
            .collect();
        if removed.is_empty() {
            return removed;
        }
        self.votes.retain(|v| v.masternode_outpoint != *outpoint);
        for hash in &removed {
            self.known.remove(hash);
        }
        self.records.remove(outpoint);
        removed
    }

    /// Drop votes of masternodes no longer in the live set; returns the
    /// removed hashes.
    pub fn retain_masternodes(&mut self, live: &HashSet<OutPoint>) -> Vec<Hash> {
        let stale: Vec<OutPoint> = self
            .records
            .keys()
            .filter(|op| !live.contains(op))
            .copied()
            .collect();
        let mut removed = Vec::new();
        for outpoint in stale {
            removed.extend(self.remove_votes_from(&outpoint));
        }
        removed
    }

    /// Yes minus no over the current slots of one signal.
    pub fn net_yes(&self, signal: VoteSignal) -> i64 {
        let mut net = 0i64;
        for record in self.records.values() {
            match record.instances.get(&signal).map(|i| i.outcome) {
                Some(VoteOutcome::Yes) => net += 1,
                Some(VoteOutcome::No) => net -= 1,
                Some(VoteOutcome::Abstain) | None => {}
            }
        }
        net
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(mn: u8, signal: VoteSignal, outcome: VoteOutcome, timestamp: i64) -> GovernanceVote {
        GovernanceVote::new([9; 32], OutPoint::new([mn; 32], 0), signal, outcome, timestamp)
    }

    #[test]
    fn add_vote_rejects_duplicate_hash() {
        let mut file = VoteFile::default();
        let v = vote(1, VoteSignal::Funding, VoteOutcome::Yes, 100);
        assert!(file.add_vote(v.clone(), 100));
        assert!(!file.add_vote(v, 100));
        assert_eq!(file.vote_count(), 1);
    }

    #[test]
    fn newer_vote_takes_over_the_slot_but_file_keeps_both() {
        let mut file = VoteFile::default();
        file.add_vote(vote(1, VoteSignal::Funding, VoteOutcome::Yes, 100), 100);
        file.add_vote(vote(1, VoteSignal::Funding, VoteOutcome::No, 200), 200);

        assert_eq!(file.vote_count(), 2);
        let instance = file
            .current_instance(&OutPoint::new([1; 32], 0), VoteSignal::Funding)
            .unwrap();
        assert_eq!(instance.outcome, VoteOutcome::No);
        assert_eq!(instance.vote_timestamp, 200);
    }

    #[test]
    fn net_yes_counts_current_slots_only() {
        let mut file = VoteFile::default();
        file.add_vote(vote(1, VoteSignal::Funding, VoteOutcome::Yes, 100), 100);
        file.add_vote(vote(2, VoteSignal::Funding, VoteOutcome::Yes, 100), 100);
        file.add_vote(vote(3, VoteSignal::Funding, VoteOutcome::No, 100), 100);
        file.add_vote(vote(4, VoteSignal::Funding, VoteOutcome::Abstain, 100), 100);
        // Masternode 1 flips to no; its earlier yes must stop counting.
        file.add_vote(vote(1, VoteSignal::Funding, VoteOutcome::No, 200), 200);

        assert_eq!(file.net_yes(VoteSignal::Funding), -1);
        assert_eq!(file.net_yes(VoteSignal::Delete), 0);
    }

    #[test]
    fn remove_votes_from_scrubs_file_index_and_slots() {
        let mut file = VoteFile::default();
        let kept = vote(2, VoteSignal::Funding, VoteOutcome::Yes, 100);
        file.add_vote(vote(1, VoteSignal::Funding, VoteOutcome::Yes, 100), 100);
        file.add_vote(vote(1, VoteSignal::Delete, VoteOutcome::No, 110), 110);
        file.add_vote(kept.clone(), 100);

        let removed = file.remove_votes_from(&OutPoint::new([1; 32], 0));
        assert_eq!(removed.len(), 2);
        assert_eq!(file.vote_count(), 1);
        assert!(file.has_vote(&kept.hash()));
        assert!(file.record_for(&OutPoint::new([1; 32], 0)).is_none());
        for hash in removed {
            assert!(!file.has_vote(&hash));
        }
    }

    #[test]
    fn retain_masternodes_drops_departed_voters() {
        let mut file = VoteFile::default();
        file.add_vote(vote(1, VoteSignal::Funding, VoteOutcome::Yes, 100), 100);
        file.add_vote(vote(2, VoteSignal::Funding, VoteOutcome::Yes, 100), 100);

        let mut live = HashSet::new();
        live.insert(OutPoint::new([2; 32], 0));
        let removed = file.retain_masternodes(&live);

        assert_eq!(removed.len(), 1);
        assert_eq!(file.vote_count(), 1);
        assert_eq!(file.net_yes(VoteSignal::Funding), 1);
    }

    #[test]
    fn persisted_form_round_trips_and_rebuilds_slots() {
        let mut file = VoteFile::default();
        file.add_vote(vote(1, VoteSignal::Funding, VoteOutcome::Yes, 100), 100);
        file.add_vote(vote(1, VoteSignal::Funding, VoteOutcome::No, 200), 200);

        let bytes = bincode::serialize(&file).unwrap();
        let restored: VoteFile = bincode::deserialize(&bytes).unwrap();

        assert_eq!(restored.vote_count(), 2);
        let instance = restored
            .current_instance(&OutPoint::new([1; 32], 0), VoteSignal::Funding)
            .unwrap();
        assert_eq!(instance.outcome, VoteOutcome::No);
    }
}
