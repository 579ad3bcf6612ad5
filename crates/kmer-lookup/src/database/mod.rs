//! K-mer database reader interface
//!
//! A lookup table is built from a sorted k-mer database split into files
//! (shards). Each file owns a disjoint range of keys and yields its k-mers as
//! blocks: every block shares one `prefix`, and holds parallel arrays of
//! suffixes and values. The full key of entry `i` is
//! `prefix << suffix_bits | suffixes[i]`.
//!
//! Requirements on an implementation:
//! - blocks of a file come in ascending prefix order, and suffixes within a
//!   block are ascending (so keys of a file are strictly increasing);
//! - no two files hold keys with the same leading bits used for bucketing
//!   (checked by the builder after the count pass);
//! - the histogram covers every k-mer of every file.

pub mod memory;
pub mod text;

pub use memory::MemoryDatabase;
pub use text::read_kmer_dump;

use crate::constants::low_mask;
use thiserror::Error;

/// Errors raised by k-mer database readers
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Underlying I/O failure
    #[error("I/O error reading k-mer database: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed input line
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// What went wrong
        message: String,
    },
    /// A file index beyond `num_files()` was requested
    #[error("no such database file: {0}")]
    InvalidFile(usize),
    /// A k-mer of the wrong length was found
    #[error("k-mer length mismatch: expected {expected}, got {actual}")]
    KmerLength {
        /// Length of the database k-mers
        expected: usize,
        /// Length found
        actual: usize,
    },
    /// The database layout is inconsistent
    #[error("invalid database layout: {0}")]
    Layout(String),
}

/// A run of k-mers sharing one prefix
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KmerBlock {
    /// Leading bits shared by every k-mer of the block
    pub prefix: u128,
    /// Low bits of each k-mer, ascending
    pub suffixes: Vec<u128>,
    /// Value (count) of each k-mer
    pub values: Vec<u64>,
}

impl KmerBlock {
    /// Create a block from its parts
    pub fn new(prefix: u128, suffixes: Vec<u128>, values: Vec<u64>) -> Self {
        debug_assert_eq!(suffixes.len(), values.len());
        Self {
            prefix,
            suffixes,
            values,
        }
    }

    /// Number of k-mers in the block
    #[inline]
    pub fn len(&self) -> usize {
        self.suffixes.len()
    }

    /// Whether the block holds no k-mer
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }

    /// Empty the block, keeping its buffers
    pub fn clear(&mut self) {
        self.prefix = 0;
        self.suffixes.clear();
        self.values.clear();
    }

    /// Reassemble the full key of entry `i`
    #[inline]
    pub fn key(&self, i: usize, suffix_bits: usize) -> u128 {
        let suffix = self.suffixes[i] & low_mask(suffix_bits);
        if suffix_bits >= 128 {
            suffix
        } else {
            (self.prefix << suffix_bits) | suffix
        }
    }
}

/// Sequential reader over the blocks of one database file
pub trait ShardReader {
    /// Load the next block into `block`; returns `false` once the file is exhausted.
    fn next_block(&mut self, block: &mut KmerBlock) -> Result<bool, DatabaseError>;
}

/// A sorted, sharded k-mer database
pub trait KmerDatabase: Sync {
    /// Reader type for a single file
    type Shard<'a>: ShardReader
    where
        Self: 'a;

    /// K-mer length in bases; keys are `2k` bits wide
    fn kmer_len(&self) -> usize;

    /// Number of files (shards)
    fn num_files(&self) -> usize;

    /// Width of the per-block suffixes in bits
    fn suffix_bits(&self) -> usize;

    /// Open file `file` for sequential block reading
    fn open_file(&self, file: usize) -> Result<Self::Shard<'_>, DatabaseError>;

    /// Value histogram over the whole database
    fn histogram(&self) -> &Histogram;
}

/// Value histogram: how many k-mers carry each value
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Histogram {
    /// `(value, occurrences)` pairs, ascending by value
    entries: Vec<(u64, u64)>,
}

impl Histogram {
    /// Build a histogram from the values of a k-mer set
    pub fn from_values<I: IntoIterator<Item = u64>>(values: I) -> Self {
        let mut sorted: Vec<u64> = values.into_iter().collect();
        sorted.sort_unstable();
        let mut entries: Vec<(u64, u64)> = Vec::new();
        for v in sorted {
            match entries.last_mut() {
                Some((value, occurrences)) if *value == v => *occurrences += 1,
                _ => entries.push((v, 1)),
            }
        }
        Self { entries }
    }

    /// Number of distinct values
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the histogram is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `i`-th distinct value
    #[inline]
    pub fn value(&self, i: usize) -> u64 {
        self.entries[i].0
    }

    /// Number of k-mers carrying the `i`-th distinct value
    #[inline]
    pub fn occurrences(&self, i: usize) -> u64 {
        self.entries[i].1
    }

    /// Largest value present, 0 when empty
    pub fn max_value(&self) -> u64 {
        self.entries.last().map_or(0, |&(v, _)| v)
    }

    /// Total number of k-mers
    pub fn total_occurrences(&self) -> u64 {
        self.entries.iter().map(|&(_, o)| o).sum()
    }

    /// Number of k-mers whose value lies in `[min_value, max_value]`
    pub fn occurrences_in_range(&self, min_value: u64, max_value: u64) -> u64 {
        (0..self.len())
            .filter(|&i| min_value <= self.value(i) && self.value(i) <= max_value)
            .map(|i| self.occurrences(i))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_from_values() {
        let h = Histogram::from_values([5, 1, 5, 7, 5, 1]);
        assert_eq!(h.len(), 3);
        assert_eq!((h.value(0), h.occurrences(0)), (1, 2));
        assert_eq!((h.value(1), h.occurrences(1)), (5, 3));
        assert_eq!((h.value(2), h.occurrences(2)), (7, 1));
        assert_eq!(h.max_value(), 7);
        assert_eq!(h.total_occurrences(), 6);
        assert_eq!(h.occurrences_in_range(2, 6), 3);
        assert_eq!(h.occurrences_in_range(1, 100), 6);
        assert_eq!(h.occurrences_in_range(8, 100), 0);
    }

    #[test]
    fn test_empty_histogram() {
        let h = Histogram::default();
        assert!(h.is_empty());
        assert_eq!(h.max_value(), 0);
        assert_eq!(h.occurrences_in_range(1, u64::MAX), 0);
    }

    #[test]
    fn test_block_key() {
        let block = KmerBlock::new(0b1, vec![0b010, 0b011], vec![5, 5]);
        assert_eq!(block.key(0, 3), 0b1010);
        assert_eq!(block.key(1, 3), 0b1011);
        let wide = KmerBlock::new(0, vec![u128::MAX], vec![1]);
        assert_eq!(wide.key(0, 128), u128::MAX);
    }
}
