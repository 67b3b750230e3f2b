//! # Vote Delta Filter
//!
//! Bloom filter a peer attaches to a single-object sync request, encoding
//! the votes it already holds. We answer with inventory for every vote the
//! filter does not match.
//!
//! False positives cost a peer at most a missed vote until the next refresh;
//! false negatives cannot occur, so no vote is ever withheld that the peer
//! definitely lacks.

use std::io::Cursor;

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

use super::entities::Hash;

/// Probabilistic set of vote hashes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VoteFilter {
    /// Bit array storing the filter state.
    #[serde(with = "bitvec_serde")]
    bits: BitVec<u8, Lsb0>,
    /// Number of hash functions (k).
    k: usize,
    /// Size in bits (m).
    m: usize,
    /// Number of elements inserted (n).
    n: usize,
    /// Per-filter variation so remote parties cannot precompute collisions.
    tweak: u32,
}

/// Serde support for BitVec.
mod bitvec_serde {
    use bitvec::prelude::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bits: &BitVec<u8, Lsb0>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bytes: Vec<u8> = bits.as_raw_slice().to_vec();
        (bytes, bits.len()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BitVec<u8, Lsb0>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (bytes, len): (Vec<u8>, usize) = Deserialize::deserialize(deserializer)?;
        let mut bits = BitVec::<u8, Lsb0>::from_vec(bytes);
        bits.truncate(len);
        Ok(bits)
    }
}

impl Default for VoteFilter {
    /// An empty filter matches nothing, so a sync against it sends all votes.
    fn default() -> Self {
        Self::new(8, 1, 0)
    }
}

impl VoteFilter {
    pub fn new(m: usize, k: usize, tweak: u32) -> Self {
        let m = m.max(1);
        Self {
            bits: bitvec![u8, Lsb0; 0; m],
            k: k.clamp(1, 32),
            m,
            n: 0,
            tweak,
        }
    }

    /// Build a filter sized for `expected_elements` at `target_fpr`.
    ///
    /// Optimal parameters: `m = -n·ln(p) / ln(2)²`, `k = (m/n)·ln(2)`.
    pub fn with_fpr(expected_elements: usize, target_fpr: f64, tweak: u32) -> Self {
        if expected_elements == 0 {
            return Self::new(1, 1, tweak);
        }
        let n = expected_elements as f64;
        let ln2 = std::f64::consts::LN_2;
        let m = (-n * target_fpr.ln() / (ln2 * ln2)).ceil() as usize;
        let k = ((m as f64 / n) * ln2).round() as usize;
        Self::new(m, k, tweak)
    }

    pub fn insert(&mut self, element: &Hash) {
        for pos in self.positions(element) {
            self.bits.set(pos, true);
        }
        self.n += 1;
    }

    /// True if the element might be in the set; false means definitely not.
    pub fn contains(&self, element: &Hash) -> bool {
        self.positions(element).into_iter().all(|pos| self.bits[pos])
    }

    pub fn inserted_count(&self) -> usize {
        self.n
    }

    /// Double hashing: position(i) = h1 + i·h2 mod m.
    fn positions(&self, element: &Hash) -> Vec<usize> {
        let h1 = Self::seeded_hash(element, 0, self.tweak);
        let h2 = Self::seeded_hash(element, 1, self.tweak);
        (0..self.k)
            .map(|i| {
                let hash = h1.wrapping_add((i as u64).wrapping_mul(h2));
                (hash % self.m as u64) as usize
            })
            .collect()
    }

    fn seeded_hash(element: &[u8], seed: u32, tweak: u32) -> u64 {
        let combined_seed = seed.wrapping_add(tweak);
        let mut cursor = Cursor::new(element);
        murmur3::murmur3_x64_128(&mut cursor, combined_seed).unwrap_or(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> Hash {
        [byte; 32]
    }

    #[test]
    fn inserted_elements_always_match() {
        let mut filter = VoteFilter::with_fpr(100, 0.01, 7);
        for b in 0..50u8 {
            filter.insert(&hash(b));
        }
        for b in 0..50u8 {
            assert!(filter.contains(&hash(b)));
        }
    }

    #[test]
    fn empty_filter_matches_nothing() {
        let filter = VoteFilter::default();
        assert!(!filter.contains(&hash(1)));
        assert!(!filter.contains(&hash(200)));
    }

    #[test]
    fn false_positive_rate_stays_reasonable() {
        let mut filter = VoteFilter::with_fpr(200, 0.01, 3);
        for b in 0..100u8 {
            filter.insert(&[b; 32]);
        }
        let mut false_positives = 0;
        for b in 100..=255u16 {
            let mut probe = [0u8; 32];
            probe[0] = (b & 0xFF) as u8;
            probe[1] = 0xEE;
            if filter.contains(&probe) {
                false_positives += 1;
            }
        }
        // 156 probes at a 1% target; allow generous slack.
        assert!(false_positives < 16, "fp count = {false_positives}");
    }

    #[test]
    fn tweak_varies_bit_positions() {
        let mut a = VoteFilter::new(1024, 5, 0);
        let mut b = VoteFilter::new(1024, 5, 12345);
        a.insert(&hash(1));
        b.insert(&hash(1));
        assert_ne!(a.bits, b.bits);
    }

    #[test]
    fn serde_round_trip_preserves_matches() {
        let mut filter = VoteFilter::with_fpr(64, 0.01, 9);
        filter.insert(&hash(4));
        filter.insert(&hash(9));

        let bytes = bincode::serialize(&filter).unwrap();
        let restored: VoteFilter = bincode::deserialize(&bytes).unwrap();

        assert!(restored.contains(&hash(4)));
        assert!(restored.contains(&hash(9)));
        assert!(!restored.contains(&hash(77)));
        assert_eq!(restored.inserted_count(), 2);
    }
}
