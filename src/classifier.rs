//! Bucket dictionaries: recursive mean-split quantization of weight lists.
//!
//! A dictionary maps weights to small integer keys. It is built from a
//! sorted weight list by recursive mean splitting: a range whose badness
//! (stddev/mean) exceeds the threshold `k` is split at the first weight
//! above its mean, and the recursion bottoms out in single buckets. The
//! flattened result is a strictly increasing supremum list plus a parallel
//! list of bucket means: encoding finds the first supremum at or above a
//! weight, decoding returns the bucket mean.

use std::fmt::Write as _;
use std::io::Write;

use crate::error::{PpmError, Result};
use crate::stats;

/// Hard ceiling on dictionary keys: they must fit the 15-bit letter index.
pub const MAX_DICT_KEYS: u32 = 1 << 15;

// ── Dictionary ─────────────────────────────────────────────────────

/// Handle of a dictionary inside a [`DictionaryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DictId(pub usize);

/// A bucket dictionary: `supremum[i]` is the largest weight bucket `i`
/// covers (strictly increasing), `mean[i]` is the value a key decodes to.
/// An empty dictionary is legal; all lookups miss.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    supremum: Vec<f64>,
    mean: Vec<f64>,
}

/// Intermediate bucket tree produced by the recursive split.
struct Bucket {
    mean: f64,
    supremum: f64,
    size: u32,
    low: Option<Box<Bucket>>,
    high: Option<Box<Bucket>>,
}

fn build_bucket(weights: &[f64], k: f64) -> Result<Bucket> {
    debug_assert!(k > 0.0, "badness threshold must be positive");
    debug_assert!(!weights.is_empty());

    if weights.len() == 1 {
        return Ok(Bucket {
            mean: weights[0],
            supremum: weights[0],
            size: 1,
            low: None,
            high: None,
        });
    }

    let mean = stats::mean(weights);
    if mean == 0.0 {
        return Err(PpmError::structural(
            "bucket mean is zero, badness undefined",
        ));
    }
    let stddev = stats::stddev_m(weights, mean);

    let mut bucket = Bucket {
        mean,
        supremum: weights[weights.len() - 1],
        size: 1,
        low: None,
        high: None,
    };

    if stddev / mean > k {
        // First index strictly above the mean. The mean of a non-constant
        // sorted range lies strictly between its extremes, so the split is
        // proper on both sides.
        let split = weights.partition_point(|&w| w <= mean);
        debug_assert!(split > 0 && split < weights.len());

        let low = build_bucket(&weights[..split], k)?;
        let high = build_bucket(&weights[split..], k)?;
        bucket.size = low.size + high.size;
        bucket.low = Some(Box::new(low));
        bucket.high = Some(Box::new(high));
    }

    Ok(bucket)
}

fn flatten_bucket(bucket: &Bucket, supremum: &mut Vec<f64>, mean: &mut Vec<f64>) {
    match (&bucket.low, &bucket.high) {
        (Some(low), Some(high)) => {
            flatten_bucket(low, supremum, mean);
            flatten_bucket(high, supremum, mean);
        }
        _ => {
            supremum.push(bucket.supremum);
            mean.push(bucket.mean);
        }
    }
}

impl Dictionary {
    /// Build a dictionary from an ascending-sorted weight list.
    ///
    /// Fails with `DictTooBig` when the split produces more than `max_size`
    /// buckets, and with `Structural` when a multi-element range has mean
    /// zero (its badness is undefined). An empty input yields an empty
    /// dictionary.
    pub fn build(weights: &[f64], k: f64, max_size: u32) -> Result<Self> {
        if weights.is_empty() {
            return Ok(Self::default());
        }
        debug_assert!(
            weights.windows(2).all(|w| w[0] <= w[1]),
            "dictionary input must be sorted"
        );

        let root = build_bucket(weights, k)?;
        if root.size > max_size {
            return Err(PpmError::DictTooBig {
                size: root.size,
                max: max_size,
            });
        }

        let mut supremum = Vec::with_capacity(root.size as usize);
        let mut mean = Vec::with_capacity(root.size as usize);
        flatten_bucket(&root, &mut supremum, &mut mean);
        debug_assert_eq!(supremum.len(), root.size as usize);

        Ok(Self { supremum, mean })
    }

    /// Reconstruct a dictionary from its serialized arrays (binary reader).
    pub fn from_parts(supremum: Vec<f64>, mean: Vec<f64>) -> Result<Self> {
        if supremum.len() != mean.len() {
            return Err(PpmError::InvalidFormat(
                "dictionary arrays differ in length".into(),
            ));
        }
        Ok(Self { supremum, mean })
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.supremum.len()
    }

    pub fn is_empty(&self) -> bool {
        self.supremum.is_empty()
    }

    /// Encode: the smallest key whose supremum is at or above `value`, or
    /// `None` when the value exceeds the dictionary domain.
    pub fn key_from_value(&self, value: f64) -> Option<u16> {
        let key = self.supremum.partition_point(|&s| s < value);
        if key == self.supremum.len() {
            return None;
        }
        Some(key as u16)
    }

    /// Decode: the mean of the bucket behind `key`.
    pub fn value_from_key(&self, key: u16) -> Option<f64> {
        self.mean.get(key as usize).copied()
    }

    pub fn supremums(&self) -> &[f64] {
        &self.supremum
    }

    pub fn means(&self) -> &[f64] {
        &self.mean
    }

    /// Write the buckets as `supremum, mean` lines (plot/export format).
    pub fn dump<W: Write>(&self, w: &mut W) -> Result<()> {
        writeln!(w, "# supremum, mean")?;
        for i in 0..self.len() {
            writeln!(w, "{}, {}", self.supremum[i], self.mean[i])?;
        }
        Ok(())
    }

    /// One-line human-readable rendering.
    pub fn describe(&self) -> String {
        let mut out = format!("dict size={} {{", self.len());
        for i in 0..self.len() {
            let _ = write!(out, " [{}] mean={} sup={}", i, self.mean[i], self.supremum[i]);
        }
        out.push_str(" }");
        out
    }
}

// ── DictionaryStore ────────────────────────────────────────────────

/// Owner of all dictionaries of one compression run. Dictionaries are never
/// removed; they outlive every bucketed segment referencing them.
#[derive(Debug, Default)]
pub struct DictionaryStore {
    dicts: Vec<Dictionary>,
}

impl DictionaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dict: Dictionary) -> DictId {
        let id = DictId(self.dicts.len());
        self.dicts.push(dict);
        id
    }

    pub fn get(&self, id: DictId) -> &Dictionary {
        &self.dicts[id.0]
    }

    pub fn len(&self) -> usize {
        self.dicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dicts.is_empty()
    }

    /// Dictionaries in insertion order; the position is the serialization
    /// index.
    pub fn iter(&self) -> impl Iterator<Item = (DictId, &Dictionary)> {
        self.dicts.iter().enumerate().map(|(i, d)| (DictId(i), d))
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_single_bucket() {
        let d = Dictionary::build(&[3.0], 0.04, MAX_DICT_KEYS).unwrap();
        assert_eq!(d.len(), 1);
        assert_eq!(d.key_from_value(3.0), Some(0));
        assert_eq!(d.value_from_key(0), Some(3.0));
    }

    #[test]
    fn test_single_zero_value_is_legal() {
        // The single-element base case precedes the zero-mean check.
        let d = Dictionary::build(&[0.0], 0.04, MAX_DICT_KEYS).unwrap();
        assert_eq!(d.len(), 1);
        assert_eq!(d.value_from_key(0), Some(0.0));
    }

    #[test]
    fn test_uniform_values_collapse_to_one_bucket() {
        let d = Dictionary::build(&[2.0, 2.0, 2.0], 0.04, MAX_DICT_KEYS).unwrap();
        assert_eq!(d.len(), 1);
        assert_eq!(d.key_from_value(2.0), Some(0));
        assert_eq!(d.value_from_key(0), Some(2.0));
    }

    #[test]
    fn test_bimodal_input_forces_split() {
        // Badness 9/4 with k = 0.1 forces a split at mean 5.5.
        let weights = [1.0, 1.0, 1.0, 10.0, 10.0, 10.0];
        let d = Dictionary::build(&weights, 0.1, MAX_DICT_KEYS).unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d.value_from_key(0), Some(1.0));
        assert_eq!(d.value_from_key(1), Some(10.0));
        assert_eq!(d.key_from_value(1.0), Some(0));
        assert_eq!(d.key_from_value(10.0), Some(1));
        // 2.0 is above the first bucket's supremum (1.0).
        assert_eq!(d.key_from_value(2.0), Some(1));
    }

    #[test]
    fn test_value_above_domain_is_invalid() {
        let d = Dictionary::build(&[1.0, 2.0], 10.0, MAX_DICT_KEYS).unwrap();
        assert_eq!(d.key_from_value(2.5), None);
    }

    #[test]
    fn test_key_out_of_range_is_invalid() {
        let d = Dictionary::build(&[1.0], 0.1, MAX_DICT_KEYS).unwrap();
        assert_eq!(d.value_from_key(7), None);
    }

    #[test]
    fn test_empty_dictionary() {
        let d = Dictionary::build(&[], 0.1, MAX_DICT_KEYS).unwrap();
        assert!(d.is_empty());
        assert_eq!(d.key_from_value(0.0), None);
        assert_eq!(d.value_from_key(0), None);
    }

    #[test]
    fn test_zero_mean_range_fails() {
        let err = Dictionary::build(&[0.0, 0.0], 0.1, MAX_DICT_KEYS).unwrap_err();
        assert!(err.to_string().contains("badness undefined"));
    }

    #[test]
    fn test_too_big_dictionary_rejected() {
        // Geometric weights defeat merging; with max_size 2 the build
        // must report the overflow.
        let weights: Vec<f64> = (0..8).map(|i| 10f64.powi(i)).collect();
        let err = Dictionary::build(&weights, 0.01, 2).unwrap_err();
        match err {
            PpmError::DictTooBig { size, max } => {
                assert!(size > 2);
                assert_eq!(max, 2);
            }
            other => panic!("expected DictTooBig, got {other}"),
        }
    }

    #[test]
    fn test_badness_bound_per_bucket() {
        // Every bucket of a fresh dictionary either covers one input value
        // or has stddev/mean at or below k.
        let weights = [1.0, 1.1, 1.2, 5.0, 5.5, 30.0, 31.0, 32.0];
        let k = 0.1;
        let d = Dictionary::build(&weights, k, MAX_DICT_KEYS).unwrap();

        for key in 0..d.len() as u16 {
            let members: Vec<f64> = weights
                .iter()
                .copied()
                .filter(|&w| d.key_from_value(w) == Some(key))
                .collect();
            assert!(!members.is_empty(), "empty bucket {key}");
            if members.len() > 1 {
                let m = crate::stats::mean(&members);
                let sd = crate::stats::stddev_m(&members, m);
                assert!(
                    sd / m <= k,
                    "bucket {key} badness {} above k",
                    sd / m
                );
            }
        }
    }

    #[test]
    fn test_encoding_upper_bound() {
        let weights = [1.0, 2.0, 4.0, 8.0, 16.0, 32.0];
        let d = Dictionary::build(&weights, 0.2, MAX_DICT_KEYS).unwrap();
        for &w in &weights {
            let key = d.key_from_value(w).expect("input weight must encode");
            assert!(w <= d.supremums()[key as usize]);
        }
    }

    #[test]
    fn test_store_insertion_order() {
        let mut store = DictionaryStore::new();
        let a = store.insert(Dictionary::build(&[1.0], 0.1, MAX_DICT_KEYS).unwrap());
        let b = store.insert(Dictionary::build(&[2.0], 0.1, MAX_DICT_KEYS).unwrap());
        assert_eq!(a, DictId(0));
        assert_eq!(b, DictId(1));
        assert_eq!(store.len(), 2);
        let ids: Vec<DictId> = store.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn dict_monotone_and_key_roundtrip(
                mut weights in proptest::collection::vec(0.01f64..1e6, 1..64),
                k in 0.01f64..2.0,
            ) {
                weights.sort_by(|a, b| a.partial_cmp(b).unwrap());
                let d = Dictionary::build(&weights, k, MAX_DICT_KEYS).unwrap();

                // Strictly increasing suprema.
                for w in d.supremums().windows(2) {
                    prop_assert!(w[0] < w[1]);
                }

                // key_from_value(value_from_key(i)) == i for every key.
                for key in 0..d.len() as u16 {
                    let v = d.value_from_key(key).unwrap();
                    prop_assert_eq!(d.key_from_value(v), Some(key));
                }

                // Every input weight encodes below its bucket supremum.
                for &w in &weights {
                    let key = d.key_from_value(w).unwrap();
                    prop_assert!(w <= d.supremums()[key as usize]);
                }
            }
        }
    }
}
