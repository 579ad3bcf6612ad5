//! Suffix and value columns
//!
//! Two parallel [`BitPackedArray`]s indexed by slot: the low bits of each
//! stored key, and its value minus the table's `value_offset`. Either column
//! may be absent: a zero-width suffix (every key bit is in the prefix) needs
//! no suffix column, and an existence-only table keeps no values.

use crate::bit_packed_array::BitPackedArray;
use crate::constants::LINEAR_SCAN_THRESHOLD;

/// Suffix column plus optional value column
#[derive(Debug)]
pub struct SuffixValueStore {
    num_slots: u64,
    suffix_bits: usize,
    value_bits: usize,
    value_offset: u64,
    suffixes: Option<BitPackedArray>,
    values: Option<BitPackedArray>,
}

impl SuffixValueStore {
    /// Create zeroed columns for `num_slots` entries.
    ///
    /// `value_bits == 0` builds an existence-only store.
    pub fn new(
        num_slots: u64,
        suffix_bits: usize,
        value_bits: usize,
        value_offset: u64,
        segment_bits: usize,
        use_locks: bool,
    ) -> Self {
        let column = |width: usize| {
            (width > 0).then(|| {
                let mut array = BitPackedArray::new(width, segment_bits, use_locks);
                array.erase(0, num_slots);
                array
            })
        };
        Self {
            num_slots,
            suffix_bits,
            value_bits,
            value_offset,
            suffixes: column(suffix_bits),
            values: column(value_bits),
        }
    }

    /// Store `suffix` and `value` at `slot`; `value` must be above the offset.
    #[inline]
    pub fn set(&self, slot: u64, suffix: u128, value: u64) {
        if let Some(suffixes) = &self.suffixes {
            suffixes.set(slot, suffix);
        }
        if let Some(values) = &self.values {
            debug_assert!(value > self.value_offset);
            values.set(slot, (value - self.value_offset) as u128);
        }
    }

    /// Suffix stored at `slot` (0 without a suffix column)
    #[inline]
    pub fn suffix(&self, slot: u64) -> u128 {
        match &self.suffixes {
            Some(suffixes) => suffixes.get(slot),
            None => {
                assert!(
                    slot < self.num_slots,
                    "SuffixValueStore::suffix: slot {} out of bounds ({} slots)",
                    slot,
                    self.num_slots
                );
                0
            }
        }
    }

    /// Value stored at `slot` with the offset added back (1 without a value column)
    #[inline]
    pub fn value(&self, slot: u64) -> u64 {
        match &self.values {
            Some(values) => values.get(slot) as u64 + self.value_offset,
            None => {
                assert!(
                    slot < self.num_slots,
                    "SuffixValueStore::value: slot {} out of bounds ({} slots)",
                    slot,
                    self.num_slots
                );
                1
            }
        }
    }

    /// Find `suffix` in the sorted slot range `[begin, end)`.
    ///
    /// Binary search narrows the range until it holds at most
    /// [`LINEAR_SCAN_THRESHOLD`] slots, which are then scanned in order.
    pub fn find(&self, begin: u64, end: u64, suffix: u128) -> Option<u64> {
        let (mut lo, mut hi) = (begin, end);
        while hi - lo > LINEAR_SCAN_THRESHOLD {
            let mid = lo + (hi - lo) / 2;
            let s = self.suffix(mid);
            if s == suffix {
                return Some(mid);
            }
            if s < suffix {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        for slot in lo..hi {
            let s = self.suffix(slot);
            if s == suffix {
                return Some(slot);
            }
            if s > suffix {
                break;
            }
        }
        None
    }

    /// Number of slots, dead zones included
    #[inline]
    pub fn num_slots(&self) -> u64 {
        self.num_slots
    }

    /// Width of the suffix column
    #[inline]
    pub fn suffix_bits(&self) -> usize {
        self.suffix_bits
    }

    /// Width of the value column (0 for existence-only)
    #[inline]
    pub fn value_bits(&self) -> usize {
        self.value_bits
    }

    /// Amount subtracted from each value before storing
    #[inline]
    pub fn value_offset(&self) -> u64 {
        self.value_offset
    }

    /// Whether values are stored
    #[inline]
    pub fn has_values(&self) -> bool {
        self.values.is_some()
    }

    /// Footprint of the suffix column in bits
    pub fn suffix_num_bits(&self) -> u64 {
        self.suffixes.as_ref().map_or(0, |a| a.num_bits())
    }

    /// Footprint of the value column in bits
    pub fn value_num_bits(&self) -> u64 {
        self.values.as_ref().map_or(0, |a| a.num_bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(suffixes: &[u128]) -> SuffixValueStore {
        let store = SuffixValueStore::new(suffixes.len() as u64, 20, 4, 2, 4096, false);
        for (i, &s) in suffixes.iter().enumerate() {
            store.set(i as u64, s, 3 + (i as u64 % 10));
        }
        store
    }

    #[test]
    fn test_values_are_offset() {
        let store = store_with(&[1, 2, 3]);
        assert_eq!(store.value(0), 3);
        assert_eq!(store.value(2), 5);
        assert!(store.has_values());
    }

    #[test]
    fn test_find_small_and_large_ranges() {
        let suffixes: Vec<u128> = (0..100u128).map(|i| i * 3 + 1).collect();
        let store = store_with(&suffixes);
        for (i, &s) in suffixes.iter().enumerate() {
            assert_eq!(store.find(0, 100, s), Some(i as u64));
            assert_eq!(store.find(0, 100, s + 1), None);
        }
        assert_eq!(store.find(0, 100, 0), None);
        // restricted ranges only see their own slots
        assert_eq!(store.find(10, 15, suffixes[12]), Some(12));
        assert_eq!(store.find(10, 15, suffixes[20]), None);
        assert_eq!(store.find(5, 5, suffixes[5]), None);
    }

    #[test]
    fn test_existence_only() {
        let store = SuffixValueStore::new(4, 8, 0, 0, 1024, false);
        store.set(0, 7, 99);
        assert!(!store.has_values());
        assert_eq!(store.value(0), 1);
        assert_eq!(store.value_num_bits(), 0);
    }

    #[test]
    fn test_zero_width_suffix() {
        let store = SuffixValueStore::new(3, 0, 4, 0, 1024, false);
        store.set(1, 0, 9);
        assert_eq!(store.suffix(1), 0);
        assert_eq!(store.find(1, 2, 0), Some(1));
        assert_eq!(store.find(2, 2, 0), None);
        assert_eq!(store.value(1), 9);
    }
}
