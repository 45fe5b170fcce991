//! Subtree membership sets: exact or Bloom-approximated.
//!
//! Approximate sets may answer "present" for an id that never entered the
//! set; they never answer "absent" for one that did.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::DeviceId;

/// Largest number of hash positions a BLAKE3 digest can feed (4 bytes each).
pub const MAX_BLOOM_HASHES: u8 = 8;

/// Insert, union and (possibly approximate) lookup.
pub trait Membership {
    fn insert(&mut self, id: DeviceId);

    /// Union `other` into `self`.
    fn absorb(&mut self, other: &Self);

    /// False positives allowed for approximate sets, false negatives never.
    fn probably_contains(&self, id: DeviceId) -> bool;
}

/// Fixed-size Bloom filter over device ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBloomFilter")]
pub struct BloomFilter {
    hashes: u8,
    len_bits: u32,
    words: Vec<u64>,
}

/// Decoded fields, checked before they become a `BloomFilter`.
#[derive(Deserialize)]
struct RawBloomFilter {
    hashes: u8,
    len_bits: u32,
    words: Vec<u64>,
}

impl TryFrom<RawBloomFilter> for BloomFilter {
    type Error = ProtocolError;

    fn try_from(raw: RawBloomFilter) -> Result<Self, ProtocolError> {
        let mut filter = BloomFilter::new(raw.hashes, raw.len_bits)?;
        if raw.words.len() != filter.words.len() {
            return Err(ProtocolError::invalid(format!(
                "bloom filter of {} bits needs {} words, got {}",
                raw.len_bits,
                filter.words.len(),
                raw.words.len()
            )));
        }
        filter.words = raw.words;
        Ok(filter)
    }
}

impl BloomFilter {
    pub fn new(hashes: u8, len_bits: u32) -> Result<Self, ProtocolError> {
        if hashes == 0 || hashes > MAX_BLOOM_HASHES {
            return Err(ProtocolError::invalid(format!(
                "bloom filter needs 1..={MAX_BLOOM_HASHES} hashes, got {hashes}"
            )));
        }
        if len_bits == 0 {
            return Err(ProtocolError::invalid("bloom filter needs at least one bit"));
        }
        Ok(Self {
            hashes,
            len_bits,
            words: vec![0; len_bits.div_ceil(64) as usize],
        })
    }

    pub fn hashes(&self) -> u8 {
        self.hashes
    }

    pub fn len_bits(&self) -> u32 {
        self.len_bits
    }

    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    fn positions(&self, id: DeviceId) -> impl Iterator<Item = usize> + '_ {
        let digest = blake3::hash(&id.get().to_le_bytes());
        let bytes = *digest.as_bytes();
        (0..usize::from(self.hashes)).map(move |i| {
            let chunk = [bytes[4 * i], bytes[4 * i + 1], bytes[4 * i + 2], bytes[4 * i + 3]];
            (u32::from_le_bytes(chunk) % self.len_bits) as usize
        })
    }

    fn same_shape(&self, other: &Self) -> bool {
        self.hashes == other.hashes && self.len_bits == other.len_bits
    }
}

impl Membership for BloomFilter {
    fn insert(&mut self, id: DeviceId) {
        let positions: Vec<usize> = self.positions(id).collect();
        for bit in positions {
            self.words[bit / 64] |= 1 << (bit % 64);
        }
    }

    fn absorb(&mut self, other: &Self) {
        if !self.same_shape(other) {
            // Mismatched filters cannot be unioned bitwise; saturate instead so
            // lookups keep having no false negatives.
            tracing::warn!("absorbing bloom filter of a different shape");
            self.words.iter_mut().for_each(|w| *w = u64::MAX);
            return;
        }
        for (mine, theirs) in self.words.iter_mut().zip(&other.words) {
            *mine |= *theirs;
        }
    }

    fn probably_contains(&self, id: DeviceId) -> bool {
        self.positions(id)
            .all(|bit| self.words[bit / 64] & (1 << (bit % 64)) != 0)
    }
}

/// How a device's subtree is represented, chosen by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SubtreeMode {
    #[default]
    Exact,
    Bloom { hashes: u8, bits: u32 },
}

impl SubtreeMode {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match *self {
            SubtreeMode::Exact => Ok(()),
            SubtreeMode::Bloom { hashes, bits } => BloomFilter::new(hashes, bits).map(|_| ()),
        }
    }
}

/// Ids whose path to the root goes through a device, the device included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubtreeSet {
    Exact(BTreeSet<DeviceId>),
    Bloom(BloomFilter),
}

impl SubtreeSet {
    /// The set holding only `id`.
    pub fn singleton(id: DeviceId, mode: SubtreeMode) -> Result<Self, ProtocolError> {
        let mut set = match mode {
            SubtreeMode::Exact => SubtreeSet::Exact(BTreeSet::new()),
            SubtreeMode::Bloom { hashes, bits } => SubtreeSet::Bloom(BloomFilter::new(hashes, bits)?),
        };
        set.insert(id);
        Ok(set)
    }

    pub fn is_approximate(&self) -> bool {
        matches!(self, SubtreeSet::Bloom(_))
    }

    /// MessagePack encoding, as announced to neighbours.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(rmp_serde::to_vec(self)?)
    }

    /// Bytes this set adds to a round's announcement.
    pub fn encoded_len(&self) -> usize {
        self.encode().map_or(0, |bytes| bytes.len())
    }
}

impl Membership for SubtreeSet {
    fn insert(&mut self, id: DeviceId) {
        match self {
            SubtreeSet::Exact(ids) => {
                ids.insert(id);
            }
            SubtreeSet::Bloom(filter) => filter.insert(id),
        }
    }

    fn absorb(&mut self, other: &Self) {
        match (&mut *self, other) {
            (SubtreeSet::Exact(mine), SubtreeSet::Exact(theirs)) => mine.extend(theirs),
            (SubtreeSet::Bloom(mine), SubtreeSet::Bloom(theirs)) => mine.absorb(theirs),
            (SubtreeSet::Bloom(mine), SubtreeSet::Exact(theirs)) => {
                theirs.iter().for_each(|id| mine.insert(*id));
            }
            (SubtreeSet::Exact(mine), SubtreeSet::Bloom(theirs)) => {
                let mut widened = theirs.clone();
                mine.iter().for_each(|id| widened.insert(*id));
                *self = SubtreeSet::Bloom(widened);
            }
        }
    }

    fn probably_contains(&self, id: DeviceId) -> bool {
        match self {
            SubtreeSet::Exact(ids) => ids.contains(&id),
            SubtreeSet::Bloom(filter) => filter.probably_contains(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bloom() -> SubtreeMode {
        SubtreeMode::Bloom {
            hashes: 2,
            bits: 128,
        }
    }

    #[test]
    fn exact_set_is_exact() {
        let mut a = SubtreeSet::singleton(DeviceId(1), SubtreeMode::Exact).unwrap();
        let b = SubtreeSet::singleton(DeviceId(2), SubtreeMode::Exact).unwrap();
        a.absorb(&b);
        assert!(a.probably_contains(DeviceId(1)));
        assert!(a.probably_contains(DeviceId(2)));
        assert!(!a.probably_contains(DeviceId(3)));
        assert!(!a.is_approximate());
    }

    #[test]
    fn bloom_has_no_false_negatives() {
        let mut set = SubtreeSet::singleton(DeviceId(0), bloom()).unwrap();
        for i in 1..40 {
            let other = SubtreeSet::singleton(DeviceId(i), bloom()).unwrap();
            set.absorb(&other);
        }
        for i in 0..40 {
            assert!(set.probably_contains(DeviceId(i)), "missing {i}");
        }
    }

    #[test]
    fn empty_bloom_contains_nothing() {
        let filter = BloomFilter::new(2, 128).unwrap();
        assert_eq!(filter.count_ones(), 0);
        assert!(!filter.probably_contains(DeviceId(5)));
    }

    #[test]
    fn bloom_sets_at_most_k_bits_per_id() {
        let mut filter = BloomFilter::new(3, 256).unwrap();
        filter.insert(DeviceId(77));
        assert!((1..=3).contains(&filter.count_ones()));
        assert!(filter.probably_contains(DeviceId(77)));
    }

    #[test]
    fn mixed_absorb_widens_to_bloom() {
        let mut exact = SubtreeSet::singleton(DeviceId(1), SubtreeMode::Exact).unwrap();
        let approx = SubtreeSet::singleton(DeviceId(2), bloom()).unwrap();
        exact.absorb(&approx);
        assert!(exact.is_approximate());
        assert!(exact.probably_contains(DeviceId(1)));
        assert!(exact.probably_contains(DeviceId(2)));
    }

    #[test]
    fn invalid_bloom_shapes_are_rejected() {
        assert!(BloomFilter::new(0, 128).is_err());
        assert!(BloomFilter::new(9, 128).is_err());
        assert!(BloomFilter::new(2, 0).is_err());
        assert!(SubtreeMode::Bloom { hashes: 2, bits: 0 }.validate().is_err());
    }

    #[test]
    fn decoding_checks_bloom_shape() {
        let mut filter = BloomFilter::new(2, 128).unwrap();
        filter.insert(DeviceId(9));
        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(serde_json::from_str::<BloomFilter>(&json).unwrap(), filter);

        let bytes = rmp_serde::to_vec(&SubtreeSet::Bloom(filter.clone())).unwrap();
        let set: SubtreeSet = rmp_serde::from_slice(&bytes).unwrap();
        assert!(set.probably_contains(DeviceId(9)));

        for bad in [
            r#"{"hashes": 2, "len_bits": 0, "words": []}"#,
            r#"{"hashes": 0, "len_bits": 64, "words": [0]}"#,
            r#"{"hashes": 2, "len_bits": 128, "words": [0]}"#,
            r#"{"hashes": 2, "len_bits": 64, "words": [0, 0]}"#,
        ] {
            assert!(serde_json::from_str::<BloomFilter>(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn bloom_encoding_stays_small() {
        let mut approx = SubtreeSet::singleton(DeviceId(1), bloom()).unwrap();
        let mut exact = SubtreeSet::singleton(DeviceId(1), SubtreeMode::Exact).unwrap();
        let single = exact.encoded_len();
        for i in 2..50 {
            approx.insert(DeviceId(i));
            exact.insert(DeviceId(i));
        }
        assert!(exact.encoded_len() > single);
        assert!(approx.encoded_len() > 0);
        assert!(approx.encoded_len() < exact.encoded_len());
    }

    #[test]
    fn subtree_mode_from_json() {
        let mode: SubtreeMode =
            serde_json::from_str(r#"{"mode":"bloom","hashes":2,"bits":128}"#).unwrap();
        assert_eq!(mode, bloom());
        let mode: SubtreeMode = serde_json::from_str(r#"{"mode":"exact"}"#).unwrap();
        assert_eq!(mode, SubtreeMode::Exact);
    }
}
