//! Prefix width selection
//!
//! A key of `2K` bits is split into a `P`-bit prefix, resolved through a
//! table of `2^P` bucket pointers, and a `2K − P`-bit suffix stored once per
//! k-mer. Widening the prefix doubles the pointer table but saves one bit per
//! stored k-mer; the estimator walks the useful range of `P` and keeps the
//! cheapest split.
//!
//! Cost of a split, in bits:
//!
//! ```text
//! ceil(log2(n)) * 2^P  +  (2K − P) * n  +  valueBits * n  +  overhead
//! ```

use crate::constants::{ceil_log2, GIB, MIN_PREFIX_BITS};
use std::ops::RangeInclusive;
use tracing::{debug, info, warn};

/// Memory cost of one prefix width
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpaceCandidate {
    /// Prefix width `P`
    pub prefix_bits: usize,
    /// Bits per bucket pointer
    pub pointer_bits: usize,
    /// Bits per stored suffix (`2K − P`)
    pub suffix_bits: usize,
    /// Bits per stored value
    pub value_bits: usize,
    /// Size of the pointer table
    pub index_bits: u128,
    /// Size of the suffix and value columns, plus overhead
    pub data_bits: u128,
}

impl SpaceCandidate {
    /// Total bits
    #[inline]
    pub fn total_bits(&self) -> u128 {
        self.index_bits.saturating_add(self.data_bits)
    }

    /// Total size in GiB
    #[inline]
    pub fn total_gib(&self) -> f64 {
        self.total_bits() as f64 / 8.0 / GIB
    }
}

/// Outcome of a prefix width search
#[derive(Clone, Debug)]
pub struct SpaceEstimate {
    /// Every width considered, ascending
    pub candidates: Vec<SpaceCandidate>,
    /// Position of the chosen width in `candidates`
    pub chosen: usize,
    /// Whether the chosen width was supplied by the caller
    pub forced: bool,
    /// Requested ceiling in GiB
    pub max_memory_gib: f64,
}

impl SpaceEstimate {
    /// The chosen candidate
    #[inline]
    pub fn best(&self) -> &SpaceCandidate {
        &self.candidates[self.chosen]
    }

    /// The chosen prefix width
    #[inline]
    pub fn prefix_bits(&self) -> usize {
        self.best().prefix_bits
    }

    /// Whether even the chosen split needs more than the ceiling
    #[inline]
    pub fn exceeds_limit(&self) -> bool {
        self.best().total_gib() > self.max_memory_gib
    }

    /// Log the candidate table via tracing
    pub fn print_table(&self) {
        info!("  prefix  pointer   suffix    value    memory");
        info!("    bits     bits     bits     bits     (GiB)");
        info!("  ------ -------- -------- -------- ---------");
        for (i, c) in self.candidates.iter().enumerate() {
            info!(
                "  {:>6} {:>8} {:>8} {:>8} {:>9.3}{}",
                c.prefix_bits,
                c.pointer_bits,
                c.suffix_bits,
                c.value_bits,
                c.total_gib(),
                if i == self.chosen { "  <- chosen" } else { "" }
            );
        }
    }
}

/// Chooses the prefix width minimizing total memory
#[derive(Clone, Debug)]
pub struct SpaceEstimator {
    key_bits: usize,
    num_suffix: u64,
    value_bits: usize,
    overhead_bits: u128,
    min_prefix_bits: usize,
}

impl SpaceEstimator {
    /// Create an estimator for `num_suffix` keys of `key_bits` bits each,
    /// storing `value_bits` bits of value per key.
    pub fn new(key_bits: usize, num_suffix: u64, value_bits: usize) -> Self {
        Self {
            key_bits,
            num_suffix,
            value_bits,
            overhead_bits: 0,
            min_prefix_bits: MIN_PREFIX_BITS,
        }
    }

    /// Raise the narrowest prefix considered, e.g. to give every input file
    /// its own buckets
    pub fn with_min_prefix_bits(mut self, min_prefix_bits: usize) -> Self {
        self.min_prefix_bits = min_prefix_bits.max(MIN_PREFIX_BITS);
        self
    }

    /// Add a fixed cost shared by every candidate (padding, headers)
    pub fn with_overhead_bits(mut self, overhead_bits: u128) -> Self {
        self.overhead_bits = overhead_bits;
        self
    }

    /// Prefix widths worth considering.
    ///
    /// From `min(6, 2K)` up to one bit past `ceil(log2(n))`, never wider than the key.
    pub fn candidate_range(&self) -> RangeInclusive<usize> {
        let min = self.min_prefix_bits.min(self.key_bits);
        let max = (ceil_log2(self.num_suffix) + 1).min(self.key_bits).max(min);
        min..=max
    }

    /// Memory cost of prefix width `prefix_bits`
    pub fn cost(&self, prefix_bits: usize) -> SpaceCandidate {
        let prefix_bits = prefix_bits.min(self.key_bits);
        let pointer_bits = ceil_log2(self.num_suffix);
        let suffix_bits = self.key_bits - prefix_bits;
        let n = self.num_suffix as u128;

        let slots = 1u128.checked_shl(prefix_bits as u32).unwrap_or(u128::MAX);
        let index_bits = slots.saturating_mul(pointer_bits as u128);
        let data_bits = n
            .saturating_mul((suffix_bits + self.value_bits) as u128)
            .saturating_add(self.overhead_bits);

        SpaceCandidate {
            prefix_bits,
            pointer_bits,
            suffix_bits,
            value_bits: self.value_bits,
            index_bits,
            data_bits,
        }
    }

    /// Pick a prefix width.
    ///
    /// With `prefix_hint` the search is skipped and the hinted width is used.
    /// A result above `max_memory_gib` is reported but still returned: the
    /// table is built with the best split available.
    pub fn estimate(&self, prefix_hint: Option<usize>, max_memory_gib: f64) -> SpaceEstimate {
        let estimate = match prefix_hint {
            Some(p) => {
                if p > self.key_bits {
                    warn!(
                        "Prefix width {} exceeds the {}-bit key; using {}",
                        p, self.key_bits, self.key_bits
                    );
                }
                SpaceEstimate {
                    candidates: vec![self.cost(p)],
                    chosen: 0,
                    forced: true,
                    max_memory_gib,
                }
            }
            None => {
                let candidates: Vec<SpaceCandidate> =
                    self.candidate_range().map(|p| self.cost(p)).collect();
                // First minimum wins, so ties go to the narrower prefix
                let chosen = candidates
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, c)| c.total_bits())
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                SpaceEstimate {
                    candidates,
                    chosen,
                    forced: false,
                    max_memory_gib,
                }
            }
        };

        for c in &estimate.candidates {
            debug!(
                "  prefix {:>3}: pointer {:>2} suffix {:>3} value {:>2} -> {:.3} GiB",
                c.prefix_bits,
                c.pointer_bits,
                c.suffix_bits,
                c.value_bits,
                c.total_gib()
            );
        }
        if estimate.exceeds_limit() {
            warn!(
                "Lookup table needs {:.3} GiB, more than the {:.3} GiB limit; building it anyway",
                estimate.best().total_gib(),
                max_memory_gib
            );
        }
        estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_range() {
        let est = SpaceEstimator::new(62, 1_000_000, 8);
        assert_eq!(est.candidate_range(), 6..=21);

        let tiny_key = SpaceEstimator::new(4, 1_000_000, 8);
        assert_eq!(tiny_key.candidate_range(), 4..=4);

        let empty = SpaceEstimator::new(62, 0, 8);
        assert_eq!(empty.candidate_range(), 6..=6);

        let many_files = SpaceEstimator::new(62, 1000, 8).with_min_prefix_bits(9);
        assert_eq!(many_files.candidate_range(), 9..=11);
        let few_files = SpaceEstimator::new(62, 1000, 8).with_min_prefix_bits(2);
        assert_eq!(few_files.candidate_range(), 6..=11);
    }

    #[test]
    fn test_cost_formula() {
        let est = SpaceEstimator::new(42, 1000, 5).with_overhead_bits(77);
        let c = est.cost(8);
        assert_eq!(c.pointer_bits, 10);
        assert_eq!(c.suffix_bits, 34);
        assert_eq!(c.index_bits, 256 * 10);
        assert_eq!(c.data_bits, 1000 * (34 + 5) + 77);
        assert_eq!(c.total_bits(), 2560 + 39_077);
    }

    #[test]
    fn test_chosen_is_minimal() {
        for &n in &[1u64, 17, 1000, 123_456, 50_000_000] {
            let est = SpaceEstimator::new(62, n, 12);
            let result = est.estimate(None, 1024.0);
            let best = result.best().total_bits();
            for p in est.candidate_range() {
                assert!(best <= est.cost(p).total_bits(), "n={} p={}", n, p);
            }
            assert!(!result.forced);
        }
    }

    #[test]
    fn test_empty_input_picks_minimum_prefix() {
        let result = SpaceEstimator::new(62, 0, 0).estimate(None, 1.0);
        assert_eq!(result.prefix_bits(), 6);
    }

    #[test]
    fn test_prefix_hint_skips_search() {
        let result = SpaceEstimator::new(62, 1_000_000, 8).estimate(Some(12), 1024.0);
        assert!(result.forced);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.prefix_bits(), 12);
    }

    #[test]
    fn test_limit_overrun_is_not_fatal() {
        let result = SpaceEstimator::new(62, 1 << 30, 32).estimate(None, 0.001);
        assert!(result.exceeds_limit());
        assert!(result.candidates.len() > 1);
    }
}
