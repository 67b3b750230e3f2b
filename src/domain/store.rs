//! # Object Store
//!
//! The authoritative residence of every governance object this node knows,
//! split into four disjoint populations:
//!
//! - **accepted**: fully admitted, vote-bearing objects
//! - **postponed**: awaiting collateral confirmations
//! - **orphan**: referencing a masternode not yet visible
//! - **erased**: purged hashes remembered to reject stale re-introduction
//!
//! A hash lives in at most one population at a time; the transition methods
//! here are the only way to move between them.

use std::collections::HashMap;

use super::entities::{GovernanceObject, Hash, ObjectType, OutPoint, PeerId};

/// Bookkeeping for a masternode-orphan object.
#[derive(Debug, Clone, Copy)]
pub struct OrphanInfo {
    /// Peer that delivered the object; penalized if it never resolves.
    pub from_peer: Option<PeerId>,
    /// Wall-clock expiration, epoch seconds.
    pub expires_at: i64,
}

/// Accepted-object counts by type, for the introspection surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectCounts {
    pub proposals: usize,
    pub records: usize,
    pub triggers: usize,
    pub other: usize,
    pub erased: usize,
}

impl ObjectCounts {
    pub fn total(&self) -> usize {
        self.proposals + self.records + self.triggers + self.other
    }
}

#[derive(Debug, Default)]
pub struct ObjectStore {
    objects: HashMap<Hash, GovernanceObject>,
    postponed: HashMap<Hash, GovernanceObject>,
    orphans: HashMap<Hash, (GovernanceObject, OrphanInfo)>,
    erased: HashMap<Hash, i64>,
    orphan_counter: HashMap<OutPoint, usize>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the hash resides in any of the four populations.
    pub fn contains_anywhere(&self, hash: &Hash) -> bool {
        self.objects.contains_key(hash)
            || self.postponed.contains_key(hash)
            || self.orphans.contains_key(hash)
            || self.erased.contains_key(hash)
    }

    pub fn has_accepted(&self, hash: &Hash) -> bool {
        self.objects.contains_key(hash)
    }

    pub fn has_postponed(&self, hash: &Hash) -> bool {
        self.postponed.contains_key(hash)
    }

    pub fn has_orphan(&self, hash: &Hash) -> bool {
        self.orphans.contains_key(hash)
    }

    pub fn has_erased(&self, hash: &Hash) -> bool {
        self.erased.contains_key(hash)
    }

    pub fn accepted_len(&self) -> usize {
        self.objects.len()
    }

    pub fn postponed_len(&self) -> usize {
        self.postponed.len()
    }

    pub fn orphan_len(&self) -> usize {
        self.orphans.len()
    }

    pub fn erased_len(&self) -> usize {
        self.erased.len()
    }

    pub fn get(&self, hash: &Hash) -> Option<&GovernanceObject> {
        self.objects.get(hash)
    }

    pub fn get_mut(&mut self, hash: &Hash) -> Option<&mut GovernanceObject> {
        self.objects.get_mut(hash)
    }

    pub fn get_postponed(&self, hash: &Hash) -> Option<&GovernanceObject> {
        self.postponed.get(hash)
    }

    pub fn accepted(&self) -> impl Iterator<Item = (&Hash, &GovernanceObject)> {
        self.objects.iter()
    }

    pub fn accepted_mut(&mut self) -> impl Iterator<Item = (&Hash, &mut GovernanceObject)> {
        self.objects.iter_mut()
    }

    pub fn accepted_hashes(&self) -> Vec<Hash> {
        self.objects.keys().copied().collect()
    }

    pub fn postponed_hashes(&self) -> Vec<Hash> {
        self.postponed.keys().copied().collect()
    }

    pub fn orphan_hashes(&self) -> Vec<Hash> {
        self.orphans.keys().copied().collect()
    }

    pub fn orphan_entry(&self, hash: &Hash) -> Option<&(GovernanceObject, OrphanInfo)> {
        self.orphans.get(hash)
    }

    /// Admit an object into the accepted population.
    ///
    /// Returns false (and leaves the store untouched) if the hash already
    /// resides anywhere.
    pub fn insert_accepted(&mut self, obj: GovernanceObject) -> bool {
        let hash = obj.hash();
        if self.contains_anywhere(&hash) {
            return false;
        }
        self.objects.insert(hash, obj);
        true
    }

    /// Queue an object awaiting collateral confirmations.
    pub fn insert_postponed(&mut self, obj: GovernanceObject) -> bool {
        let hash = obj.hash();
        if self.contains_anywhere(&hash) {
            return false;
        }
        self.postponed.insert(hash, obj);
        true
    }

    /// Queue a masternode-orphan; bumps the per-masternode counter.
    pub fn insert_orphan(&mut self, obj: GovernanceObject, info: OrphanInfo) -> bool {
        let hash = obj.hash();
        if self.contains_anywhere(&hash) {
            return false;
        }
        *self.orphan_counter.entry(obj.masternode_outpoint).or_default() += 1;
        self.orphans.insert(hash, (obj, info));
        true
    }

    /// In-flight orphans currently attributed to a masternode.
    pub fn orphan_count_for(&self, outpoint: &OutPoint) -> usize {
        self.orphan_counter.get(outpoint).copied().unwrap_or(0)
    }

    /// Pull an object out of the postponed queue (for re-validation).
    pub fn remove_postponed(&mut self, hash: &Hash) -> Option<GovernanceObject> {
        self.postponed.remove(hash)
    }

    /// Pull an orphan out of the queue; releases its counter slot.
    pub fn remove_orphan(&mut self, hash: &Hash) -> Option<(GovernanceObject, OrphanInfo)> {
        let entry = self.orphans.remove(hash)?;
        if let Some(count) = self.orphan_counter.get_mut(&entry.0.masternode_outpoint) {
            *count -= 1;
            if *count == 0 {
                self.orphan_counter.remove(&entry.0.masternode_outpoint);
            }
        }
        Some(entry)
    }

    /// Evict an accepted object, remembering its hash until `retain_until`.
    pub fn erase_accepted(&mut self, hash: &Hash, retain_until: i64) -> Option<GovernanceObject> {
        let obj = self.objects.remove(hash)?;
        self.erased.insert(*hash, retain_until);
        Some(obj)
    }

    /// Remember a purged hash without going through eviction; used when
    /// restoring from a snapshot.
    pub fn remember_erased(&mut self, hash: Hash, retain_until: i64) {
        self.erased.insert(hash, retain_until);
    }

    /// The erased population, for snapshotting.
    pub fn erased_entries(&self) -> Vec<(Hash, i64)> {
        self.erased.iter().map(|(h, t)| (*h, *t)).collect()
    }

    /// Forget erased hashes whose retention has passed.
    pub fn purge_expired_erased(&mut self, now: i64) -> usize {
        let before = self.erased.len();
        self.erased.retain(|_, retain_until| *retain_until >= now);
        before - self.erased.len()
    }

    /// Accepted-population counts by type plus the erased tally.
    pub fn counts(&self) -> ObjectCounts {
        let mut counts = ObjectCounts {
            erased: self.erased.len(),
            ..ObjectCounts::default()
        };
        for obj in self.objects.values() {
            match obj.object_type {
                ObjectType::Proposal => counts.proposals += 1,
                ObjectType::Record => counts.records += 1,
                ObjectType::Trigger => counts.triggers += 1,
                ObjectType::Other => counts.other += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ObjectType, ZERO_HASH};

    fn object(byte: u8, object_type: ObjectType) -> GovernanceObject {
        GovernanceObject::new(
            ZERO_HASH,
            1,
            1_700_000_000 + byte as i64,
            [byte; 32],
            br#"{"name":"x"}"#.to_vec(),
            object_type,
            OutPoint::new([byte; 32], 0),
            [0u8; 64],
        )
    }

    #[test]
    fn populations_are_mutually_exclusive() {
        let mut store = ObjectStore::new();
        let obj = object(1, ObjectType::Proposal);
        let hash = obj.hash();

        assert!(store.insert_accepted(obj.clone()));
        assert!(!store.insert_postponed(obj.clone()));
        assert!(!store.insert_orphan(
            obj.clone(),
            OrphanInfo { from_peer: None, expires_at: 0 }
        ));
        assert!(!store.insert_accepted(obj));
        assert!(store.has_accepted(&hash));
        assert!(!store.has_postponed(&hash));
        assert_eq!(store.accepted_len(), 1);
    }

    #[test]
    fn erased_hashes_block_reintroduction() {
        let mut store = ObjectStore::new();
        let obj = object(2, ObjectType::Other);
        let hash = obj.hash();

        store.insert_accepted(obj.clone());
        assert!(store.erase_accepted(&hash, 10_000).is_some());

        assert!(!store.has_accepted(&hash));
        assert!(store.has_erased(&hash));
        assert!(!store.insert_accepted(obj));
    }

    #[test]
    fn purge_forgets_only_expired_erasures() {
        let mut store = ObjectStore::new();
        let a = object(3, ObjectType::Other);
        let b = object(4, ObjectType::Other);
        let (ha, hb) = (a.hash(), b.hash());
        store.insert_accepted(a);
        store.insert_accepted(b);
        store.erase_accepted(&ha, 100);
        store.erase_accepted(&hb, i64::MAX);

        assert_eq!(store.purge_expired_erased(200), 1);
        assert!(!store.has_erased(&ha));
        assert!(store.has_erased(&hb));
    }

    #[test]
    fn orphan_counter_tracks_per_masternode_slots() {
        let mut store = ObjectStore::new();
        let outpoint = OutPoint::new([7; 32], 0);
        let mut hashes = Vec::new();
        for i in 0..3u8 {
            let mut obj = object(10 + i, ObjectType::Proposal);
            obj.masternode_outpoint = outpoint;
            hashes.push(obj.hash());
            assert!(store.insert_orphan(
                obj,
                OrphanInfo { from_peer: Some(1), expires_at: 1_000 }
            ));
        }
        assert_eq!(store.orphan_count_for(&outpoint), 3);

        store.remove_orphan(&hashes[0]);
        assert_eq!(store.orphan_count_for(&outpoint), 2);
        store.remove_orphan(&hashes[1]);
        store.remove_orphan(&hashes[2]);
        assert_eq!(store.orphan_count_for(&outpoint), 0);
    }

    #[test]
    fn counts_split_by_type() {
        let mut store = ObjectStore::new();
        store.insert_accepted(object(1, ObjectType::Proposal));
        store.insert_accepted(object(2, ObjectType::Proposal));
        store.insert_accepted(object(3, ObjectType::Record));
        store.insert_accepted(object(4, ObjectType::Trigger));

        let counts = store.counts();
        assert_eq!(counts.proposals, 2);
        assert_eq!(counts.records, 1);
        assert_eq!(counts.triggers, 1);
        assert_eq!(counts.other, 0);
        assert_eq!(counts.total(), 4);
    }
}
