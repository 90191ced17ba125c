//! 64-bit SimHash fingerprinting and a bounded, FIFO-evicting near-duplicate
//! index (§4.3).
//!
//! MD5 truncation is used purely as a fast shingle hash; this is a
//! fingerprint, not a security primitive, and must never be trusted across
//! administrative boundaries.

use indexmap::IndexMap;
use md5::{Digest, Md5};

/// Default Hamming-distance threshold below which two fingerprints are
/// considered near-duplicates.
pub const HAMMING_THRESHOLD: u32 = 3;

const NUM_BITS: usize = 64;
const SHINGLE_WIDTH: usize = 3;

/// Compute the 64-bit SimHash fingerprint of `text`.
#[must_use]
pub fn simhash(text: &str) -> u64 {
    let shingles = shingle(text, SHINGLE_WIDTH);
    if shingles.is_empty() {
        return 0;
    }

    let mut vector = [0i64; NUM_BITS];
    for shingle in &shingles {
        let h = hash64(shingle);
        for (i, slot) in vector.iter_mut().enumerate() {
            if h & (1 << i) != 0 {
                *slot += 1;
            } else {
                *slot -= 1;
            }
        }
    }

    let mut fingerprint: u64 = 0;
    for (i, weight) in vector.iter().enumerate() {
        if *weight >= 0 {
            fingerprint |= 1 << i;
        }
    }
    fingerprint
}

fn shingle(text: &str, width: usize) -> Vec<String> {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if words.len() < width {
        return if words.is_empty() {
            Vec::new()
        } else {
            vec![words.join(" ")]
        };
    }
    words
        .windows(width)
        .map(|window| window.join(" "))
        .collect()
}

fn hash64(data: &str) -> u64 {
    let digest = Md5::digest(data.as_bytes());
    u64::from_be_bytes(digest[0..8].try_into().expect("md5 digest is 16 bytes"))
}

/// Number of differing bits between two fingerprints.
#[must_use]
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Whether `a` and `b` are near-duplicates under `threshold`.
#[must_use]
pub fn is_near_duplicate(a: u64, b: u64, threshold: u32) -> bool {
    hamming_distance(a, b) <= threshold
}

/// In-memory fingerprint → document-ids index, capped at `max_entries`
/// unique fingerprints with FIFO eviction of the oldest fingerprint
/// (insertion order) when the cap is reached.
pub struct SimHashIndex {
    entries: IndexMap<u64, Vec<u64>>,
    max_entries: usize,
}

impl SimHashIndex {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            max_entries,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add(&mut self, doc_id: u64, fingerprint: u64) {
        if !self.entries.contains_key(&fingerprint) && self.entries.len() >= self.max_entries {
            self.entries.shift_remove_index(0);
        }
        self.entries.entry(fingerprint).or_default().push(doc_id);
    }

    pub fn remove(&mut self, doc_id: u64, fingerprint: u64) {
        if let Some(ids) = self.entries.get_mut(&fingerprint) {
            ids.retain(|&id| id != doc_id);
            if ids.is_empty() {
                self.entries.shift_remove(&fingerprint);
            }
        }
    }

    #[must_use]
    pub fn find_near_duplicates(&self, fingerprint: u64, threshold: u32) -> Vec<u64> {
        let mut matches = Vec::new();
        for (&stored, ids) in &self.entries {
            if hamming_distance(fingerprint, stored) <= threshold {
                matches.extend_from_slice(ids);
            }
        }
        matches
    }
}

impl Default for SimHashIndex {
    fn default() -> Self {
        Self::new(500_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_has_zero_hamming_distance() {
        let text = "the quick brown fox jumps over the lazy dog and keeps running";
        assert_eq!(hamming_distance(simhash(text), simhash(text)), 0);
    }

    #[test]
    fn single_word_edit_stays_near() {
        let a = "the quick brown fox jumps over the lazy dog and keeps running fast";
        let b = "the quick brown fox leaps over the lazy dog and keeps running fast";
        assert!(hamming_distance(simhash(a), simhash(b)) <= 10);
    }

    #[test]
    fn unrelated_text_is_far() {
        let a = "quarterly earnings report shows strong revenue growth across all segments";
        let b = "the recipe calls for two cups of flour and a pinch of salt to taste";
        assert!(hamming_distance(simhash(a), simhash(b)) > HAMMING_THRESHOLD);
    }

    #[test]
    fn index_evicts_oldest_fingerprint_at_capacity() {
        let mut index = SimHashIndex::new(2);
        index.add(1, 10);
        index.add(2, 20);
        index.add(3, 30);
        assert_eq!(index.len(), 2);
        assert!(index.find_near_duplicates(10, 0).is_empty());
    }

    #[test]
    fn remove_clears_empty_fingerprint_bucket() {
        let mut index = SimHashIndex::new(10);
        index.add(1, 42);
        index.remove(1, 42);
        assert_eq!(index.len(), 0);
    }
}
