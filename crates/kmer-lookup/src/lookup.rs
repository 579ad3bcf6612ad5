//! Exact k-mer lookup table
//!
//! A key is split into a prefix and a suffix. The prefix selects a bucket
//! through the [`PrefixIndexTable`]; the bucket's suffixes are sorted, so the
//! suffix is found by binary search followed by a short linear scan.

use crate::builder::{LoadStatistics, LookupBuilder, LookupConfig};
use crate::constants::{low_mask, GIB, INVALID_INDEX};
use crate::database::KmerDatabase;
use crate::error::LookupError;
use crate::prefix_index::{KeySplit, PrefixIndexTable};
use crate::suffix_store::SuffixValueStore;
use tracing::info;

/// Read-only exact membership and value table over a k-mer set
#[derive(Debug)]
pub struct ExactLookup {
    k: usize,
    split: KeySplit,
    min_value: u64,
    max_value: u64,
    index: PrefixIndexTable,
    store: SuffixValueStore,
    stats: LoadStatistics,
}

impl ExactLookup {
    /// Build a table from every k-mer of `db` whose value passes the
    /// configured range
    pub fn load<D: KmerDatabase>(db: &D, config: &LookupConfig) -> Result<Self, LookupError> {
        LookupBuilder::new(db, config.clone())?.build()
    }

    pub(crate) fn from_parts(
        k: usize,
        split: KeySplit,
        min_value: u64,
        max_value: u64,
        index: PrefixIndexTable,
        store: SuffixValueStore,
        stats: LoadStatistics,
    ) -> Self {
        Self {
            k,
            split,
            min_value,
            max_value,
            index,
            store,
            stats,
        }
    }

    /// Slot holding `key`, if stored
    #[inline]
    fn locate(&self, key: u128) -> Option<u64> {
        if key & !low_mask(self.split.key_bits()) != 0 {
            return None;
        }
        let (prefix, suffix) = self.split.split(key);
        let (begin, end) = self.index.range(prefix);
        if begin == end {
            return None;
        }
        self.store.find(begin, end, suffix)
    }

    /// Whether `key` is stored
    #[inline]
    pub fn exists(&self, key: u128) -> bool {
        self.locate(key).is_some()
    }

    /// Value of `key`, or `None` if it is not stored
    ///
    /// Existence-only tables report 1 for every stored key.
    #[inline]
    pub fn exists_with_value(&self, key: u128) -> Option<u64> {
        self.locate(key).map(|slot| self.store.value(slot))
    }

    /// Value of `key`, 0 if it is not stored
    #[inline]
    pub fn value(&self, key: u128) -> u64 {
        self.exists_with_value(key).unwrap_or(0)
    }

    /// Position of `key` in the table, or [`INVALID_INDEX`]
    ///
    /// Positions are unique and below [`index_bound`](Self::index_bound), so
    /// they can address caller-side arrays. They are not dense: padding
    /// between database files leaves unused positions.
    #[inline]
    pub fn index(&self, key: u128) -> u64 {
        self.locate(key).unwrap_or(INVALID_INDEX)
    }

    /// Value stored at a position returned by [`index`](Self::index)
    #[inline]
    pub fn value_at_index(&self, index: u64) -> u64 {
        self.store.value(index)
    }

    /// Number of k-mers read from the database
    #[inline]
    pub fn num_kmers(&self) -> u64 {
        self.stats.num_scanned
    }

    /// Number of k-mers stored
    #[inline]
    pub fn num_index(&self) -> u64 {
        self.stats.num_loaded
    }

    /// Exclusive upper bound of [`index`](Self::index) results
    #[inline]
    pub fn index_bound(&self) -> u64 {
        self.store.num_slots()
    }

    /// K-mer length
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Prefix width
    #[inline]
    pub fn prefix_bits(&self) -> usize {
        self.split.prefix_bits()
    }

    /// Suffix width
    #[inline]
    pub fn suffix_bits(&self) -> usize {
        self.split.suffix_bits()
    }

    /// Value width (0 for existence-only tables)
    #[inline]
    pub fn value_bits(&self) -> usize {
        self.store.value_bits()
    }

    /// Smallest value kept
    pub fn min_value(&self) -> u64 {
        self.min_value
    }

    /// Largest value kept
    pub fn max_value(&self) -> u64 {
        self.max_value
    }

    /// Whether values are stored
    pub fn has_values(&self) -> bool {
        self.store.has_values()
    }

    /// Build statistics
    pub fn statistics(&self) -> &LoadStatistics {
        &self.stats
    }

    /// Allocated footprint in bits
    pub fn num_bits(&self) -> u64 {
        self.index.num_bits() + self.store.suffix_num_bits() + self.store.value_num_bits()
    }

    /// Allocated footprint in GiB
    pub fn memory_gib(&self) -> f64 {
        self.num_bits() as f64 / 8.0 / GIB
    }

    /// Log the size of each table component via tracing
    pub fn print_space_breakdown(&self) {
        let num_kmers = self.num_index().max(1) as f64;
        let index_bits = self.index.num_bits() as f64;
        let suffix_bits = self.store.suffix_num_bits() as f64;
        let value_bits = self.store.value_num_bits() as f64;
        let total = (index_bits + suffix_bits + value_bits).max(1.0);
        let perc = |x: f64| -> f64 { x * 100.0 / total };

        info!(
            "total table size: {} [B] -- {:.5} [GiB] ({:.4} [bits/kmer])",
            (total / 8.0) as u64,
            total / 8.0 / GIB,
            total / num_kmers
        );
        info!("SPACE BREAKDOWN:");
        info!(
            "  prefix_index: {:.4} [bits/kmer] -- {:.4}% ({} prefixes x {} bits)",
            index_bits / num_kmers,
            perc(index_bits),
            self.index.num_prefixes(),
            self.index.begin_bits() + self.index.length_bits()
        );
        info!(
            "  suffixes: {:.4} [bits/kmer] -- {:.4}% ({} slots x {} bits)",
            suffix_bits / num_kmers,
            perc(suffix_bits),
            self.store.num_slots(),
            self.store.suffix_bits()
        );
        info!(
            "  values: {:.4} [bits/kmer] -- {:.4}% ({} slots x {} bits)",
            value_bits / num_kmers,
            perc(value_bits),
            self.store.num_slots(),
            self.store.value_bits()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{KmerBlock, MemoryDatabase};
    use crate::encoding::encode_kmer;

    fn config() -> LookupConfig {
        LookupConfig {
            num_threads: 2,
            ..LookupConfig::default()
        }
    }

    #[test]
    fn test_two_shards_four_keys() {
        let db = MemoryDatabase::from_shards(
            2,
            3,
            vec![
                vec![KmerBlock::new(0, vec![0b010, 0b011], vec![5, 5])],
                vec![KmerBlock::new(0, vec![0b100, 0b101], vec![7, 7])],
            ],
        )
        .unwrap();
        let lookup = ExactLookup::load(&db, &config()).unwrap();

        assert_eq!(lookup.num_index(), 4);
        assert_eq!(lookup.value(0b0010), 5);
        assert_eq!(lookup.value(0b0101), 7);
        assert!(!lookup.exists(0b0111));
        assert_eq!(lookup.value(0b0111), 0);
        assert_eq!(lookup.index(0b0111), INVALID_INDEX);
    }

    #[test]
    fn test_index_and_value_at_index() {
        let kmers: Vec<(u128, u64)> = ["ACGTA", "CCCCC", "GATTA", "TTTTT"]
            .iter()
            .enumerate()
            .map(|(i, s)| (encode_kmer(s.as_bytes()).unwrap(), 10 + i as u64))
            .collect();
        let db = MemoryDatabase::from_kmers(5, 1, kmers.clone()).unwrap();
        let lookup = ExactLookup::load(&db, &config()).unwrap();

        let mut seen = Vec::new();
        for &(key, value) in &kmers {
            let index = lookup.index(key);
            assert!(index < lookup.index_bound());
            assert_eq!(lookup.value_at_index(index), value);
            seen.push(index);
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), kmers.len());
    }

    #[test]
    fn test_value_filter() {
        let kmers = (0..64u128).map(|key| (key, 1 + key as u64 % 8));
        let db = MemoryDatabase::from_kmers(4, 1, kmers).unwrap();
        let config = LookupConfig {
            min_value: 3,
            max_value: Some(6),
            ..config()
        };
        let lookup = ExactLookup::load(&db, &config).unwrap();

        for key in 0..64u128 {
            let value = 1 + key as u64 % 8;
            let kept = (3..=6).contains(&value);
            assert_eq!(lookup.exists(key), kept, "key {key}");
            assert_eq!(lookup.value(key), if kept { value } else { 0 });
        }
        let stats = lookup.statistics();
        assert_eq!(stats.num_scanned, 64);
        assert_eq!(stats.num_loaded, 32);
        assert_eq!(stats.num_too_low, 16);
        assert_eq!(stats.num_too_high, 16);
        assert_eq!(lookup.value_bits(), 3);
    }

    #[test]
    fn test_existence_only() {
        let kmers = vec![(3u128, 40u64), (9, 2)];
        let db = MemoryDatabase::from_kmers(3, 0, kmers).unwrap();
        let config = LookupConfig {
            store_values: false,
            ..config()
        };
        let lookup = ExactLookup::load(&db, &config).unwrap();
        assert!(!lookup.has_values());
        assert_eq!(lookup.exists_with_value(3), Some(1));
        assert_eq!(lookup.exists_with_value(9), Some(1));
        assert_eq!(lookup.exists_with_value(4), None);
    }

    #[test]
    fn test_key_wider_than_k_is_absent() {
        let db = MemoryDatabase::from_kmers(3, 0, vec![(5u128, 1u64)]).unwrap();
        let lookup = ExactLookup::load(&db, &config()).unwrap();
        assert!(lookup.exists(5));
        assert!(!lookup.exists(5 | (1 << 6)));
        assert!(!lookup.exists(u128::MAX));
    }

    #[test]
    fn test_empty_database() {
        let db = MemoryDatabase::from_kmers(21, 2, Vec::new()).unwrap();
        let lookup = ExactLookup::load(&db, &config()).unwrap();
        assert_eq!(lookup.num_index(), 0);
        assert!(!lookup.exists(0));
        assert_eq!(lookup.value(12345), 0);
    }

    #[test]
    fn test_space_accounting() {
        let kmers = (0..1000u128).map(|i| (i * 977, 1 + i as u64 % 100));
        let db = MemoryDatabase::from_kmers(16, 2, kmers).unwrap();
        let lookup = ExactLookup::load(&db, &config()).unwrap();
        assert!(lookup.num_bits() > 0);
        assert!(lookup.memory_gib() > 0.0);
        lookup.print_space_breakdown();
    }
}
