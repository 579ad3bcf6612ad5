//! Prefix to bucket range table
//!
//! One packed entry per possible prefix: `begin << length_bits | length`,
//! giving the bucket range `[begin, begin + length)` of the suffix columns.
//! Empty buckets have length 0.

use crate::bit_packed_array::BitPackedArray;
use crate::constants::{bit_width, low_mask};

/// Splits `key_bits`-bit keys into a prefix and a suffix
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeySplit {
    key_bits: usize,
    prefix_bits: usize,
}

impl KeySplit {
    /// Split keys of `key_bits` bits at `prefix_bits` (clamped to the key)
    pub fn new(key_bits: usize, prefix_bits: usize) -> Self {
        Self {
            key_bits,
            prefix_bits: prefix_bits.min(key_bits),
        }
    }

    /// Key width
    #[inline]
    pub fn key_bits(&self) -> usize {
        self.key_bits
    }

    /// Prefix width
    #[inline]
    pub fn prefix_bits(&self) -> usize {
        self.prefix_bits
    }

    /// Suffix width
    #[inline]
    pub fn suffix_bits(&self) -> usize {
        self.key_bits - self.prefix_bits
    }

    /// `(prefix, suffix)` of `key`
    #[inline]
    pub fn split(&self, key: u128) -> (u64, u128) {
        let suffix_bits = self.suffix_bits();
        let prefix = key.checked_shr(suffix_bits as u32).unwrap_or(0) as u64;
        (prefix, key & low_mask(suffix_bits))
    }

    /// Key rebuilt from its parts
    #[inline]
    pub fn join(&self, prefix: u64, suffix: u128) -> u128 {
        let high = (prefix as u128)
            .checked_shl(self.suffix_bits() as u32)
            .unwrap_or(0);
        high | suffix
    }
}

/// Packed `(begin, length)` pairs indexed by prefix
#[derive(Debug)]
pub struct PrefixIndexTable {
    prefix_bits: usize,
    begin_bits: usize,
    length_bits: usize,
    entries: BitPackedArray,
}

impl PrefixIndexTable {
    /// Create a zeroed table of `2^prefix_bits` entries able to hold begins
    /// up to `max_begin` and lengths up to `max_length`.
    pub fn new(prefix_bits: usize, max_begin: u64, max_length: u64, segment_bits: usize) -> Self {
        assert!(
            prefix_bits < 64,
            "PrefixIndexTable: {} prefix bits cannot be indexed",
            prefix_bits
        );
        let begin_bits = bit_width(max_begin).max(1);
        let length_bits = bit_width(max_length).max(1);
        let mut entries = BitPackedArray::new(begin_bits + length_bits, segment_bits, false);
        entries.erase(0, 1u64 << prefix_bits);
        Self {
            prefix_bits,
            begin_bits,
            length_bits,
            entries,
        }
    }

    /// Record the bucket of `prefix`
    #[inline]
    pub fn set(&self, prefix: u64, begin: u64, length: u64) {
        debug_assert!(bit_width(begin) <= self.begin_bits);
        debug_assert!(bit_width(length) <= self.length_bits);
        let packed = ((begin as u128) << self.length_bits) | length as u128;
        self.entries.set(prefix, packed);
    }

    /// Bucket range `[begin, end)` of `prefix`
    #[inline]
    pub fn range(&self, prefix: u64) -> (u64, u64) {
        let packed = self.entries.get(prefix);
        let begin = (packed >> self.length_bits) as u64;
        let length = (packed & low_mask(self.length_bits)) as u64;
        (begin, begin + length)
    }

    /// Number of entries (`2^prefix_bits`)
    #[inline]
    pub fn num_prefixes(&self) -> u64 {
        1u64 << self.prefix_bits
    }

    /// Prefix width
    #[inline]
    pub fn prefix_bits(&self) -> usize {
        self.prefix_bits
    }

    /// Bits used for the begin field
    #[inline]
    pub fn begin_bits(&self) -> usize {
        self.begin_bits
    }

    /// Bits used for the length field
    #[inline]
    pub fn length_bits(&self) -> usize {
        self.length_bits
    }

    /// Allocated footprint in bits
    pub fn num_bits(&self) -> u64 {
        self.entries.num_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_split() {
        let split = KeySplit::new(10, 4);
        assert_eq!(split.suffix_bits(), 6);
        assert_eq!(split.split(0b1011_010011), (0b1011, 0b010011));
        assert_eq!(split.join(0b1011, 0b010011), 0b1011_010011);

        // whole key in the prefix
        let all_prefix = KeySplit::new(4, 6);
        assert_eq!(all_prefix.prefix_bits(), 4);
        assert_eq!(all_prefix.split(0b0111), (0b0111, 0));

        // whole key in the suffix
        let no_prefix = KeySplit::new(128, 0);
        assert_eq!(no_prefix.split(u128::MAX), (0, u128::MAX));
        assert_eq!(no_prefix.join(0, 42), 42);
    }

    #[test]
    fn test_set_and_range() {
        let table = PrefixIndexTable::new(4, 1000, 37, 1024);
        assert_eq!(table.num_prefixes(), 16);
        assert_eq!(table.begin_bits(), 10);
        assert_eq!(table.length_bits(), 6);

        table.set(3, 100, 37);
        table.set(4, 1000, 0);
        assert_eq!(table.range(3), (100, 137));
        assert_eq!(table.range(4), (1000, 1000));
        // untouched entries are empty buckets at 0
        assert_eq!(table.range(15), (0, 0));
    }

    #[test]
    fn test_zero_prefix_bits() {
        let table = PrefixIndexTable::new(0, 5, 5, 1024);
        assert_eq!(table.num_prefixes(), 1);
        table.set(0, 0, 5);
        assert_eq!(table.range(0), (0, 5));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_prefix_out_of_range_panics() {
        let table = PrefixIndexTable::new(2, 10, 10, 1024);
        table.range(4);
    }
}
