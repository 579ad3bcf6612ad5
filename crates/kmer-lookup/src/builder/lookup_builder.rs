//! Lookup table builder orchestration
//!
//! Builds an [`ExactLookup`] from a [`KmerDatabase`] in four steps:
//! 1. Initialize: pick the value range, value width and prefix width
//! 2. Count: size every prefix bucket, one database file per task
//! 3. Allocate: lay buckets out file by file, padded by a dead zone
//! 4. Load: write suffixes and values into their buckets, one file per task
//!
//! Each step must run exactly once and in order; calling one out of order
//! is a programming error and panics.

use crate::builder::count::{check_disjoint, count_file, FileCounts, ValueFilter};
use crate::builder::load::load_file;
use crate::builder::statistics::LoadStatistics;
use crate::builder::LookupConfig;
use crate::constants::{bit_width, ceil_log2, is_valid_k, GIB, WORD_BITS};
use crate::database::{DatabaseError, KmerDatabase};
use crate::error::LookupError;
use crate::lookup::ExactLookup;
use crate::prefix_index::{KeySplit, PrefixIndexTable};
use crate::space_estimator::{SpaceEstimate, SpaceEstimator};
use crate::suffix_store::SuffixValueStore;
use rayon::prelude::*;
use tracing::info;

/// Progress of a [`LookupBuilder`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStage {
    /// Created, nothing computed yet
    Uninitialized,
    /// Value range and prefix width chosen
    Initialized,
    /// Bucket sizes known
    Counted,
    /// Tables allocated
    Allocated,
    /// Tables filled
    Loaded,
}

/// Padding slots needed so that `words` 128-bit words separate neighbouring
/// file blocks in every non-empty column
pub(crate) fn dead_zone_slots(words: usize, column_widths: &[usize]) -> u64 {
    match column_widths.iter().copied().filter(|&w| w > 0).min() {
        Some(narrowest) => ((words * WORD_BITS) as u64).div_ceil(narrowest as u64),
        None => 0,
    }
}

/// Builder for exact lookup tables
pub struct LookupBuilder<'a, D: KmerDatabase> {
    db: &'a D,
    config: LookupConfig,
    pool: rayon::ThreadPool,
    stage: BuildStage,

    split: KeySplit,
    filter: ValueFilter,
    value_bits: usize,
    estimate: Option<SpaceEstimate>,

    counts: Vec<FileCounts>,
    stats: LoadStatistics,

    index: Option<PrefixIndexTable>,
    store: Option<SuffixValueStore>,
}

impl<'a, D: KmerDatabase> LookupBuilder<'a, D> {
    /// Create a builder reading `db`
    ///
    /// # Parallelism
    /// The number of threads is controlled by `config.num_threads`:
    /// - `0` uses all available CPU cores (rayon default)
    /// - `N` uses exactly N threads
    pub fn new(db: &'a D, config: LookupConfig) -> Result<Self, LookupError> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .build()
            .map_err(|e| LookupError::ThreadPool(e.to_string()))?;

        Ok(Self {
            db,
            config,
            pool,
            stage: BuildStage::Uninitialized,
            split: KeySplit::new(0, 0),
            filter: ValueFilter {
                min_value: 1,
                max_value: 0,
            },
            value_bits: 0,
            estimate: None,
            counts: Vec::new(),
            stats: LoadStatistics::new(),
            index: None,
            store: None,
        })
    }

    /// Current stage
    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    /// Prefix width estimate, once initialized
    pub fn estimate(&self) -> Option<&SpaceEstimate> {
        self.estimate.as_ref()
    }

    /// Statistics gathered so far
    pub fn statistics(&self) -> &LoadStatistics {
        &self.stats
    }

    fn advance(&mut self, operation: &str, from: BuildStage, to: BuildStage) {
        assert_eq!(
            self.stage, from,
            "LookupBuilder::{operation} called in stage {:?}, expected {:?}",
            self.stage, from
        );
        self.stage = to;
    }

    /// Run every step and return the finished table
    pub fn build(mut self) -> Result<ExactLookup, LookupError> {
        self.config.print();
        info!("Building Exact Lookup Table");

        info!("Step 1: Choosing value range and prefix width...");
        self.initialize()?;

        info!("Step 2: Counting bucket sizes...");
        self.count()?;

        info!("Step 3: Allocating tables...");
        self.allocate();

        info!("Step 4: Loading k-mers...");
        self.load()?;

        let lookup = self.finish();
        info!("Lookup Build Complete");
        info!("Total memory: {:.3} GiB", lookup.memory_gib());
        Ok(lookup)
    }

    /// Choose the value range, value width and key split
    pub fn initialize(&mut self) -> Result<(), LookupError> {
        self.advance("initialize", BuildStage::Uninitialized, BuildStage::Initialized);

        let k = self.db.kmer_len();
        if !is_valid_k(k) {
            return Err(DatabaseError::Layout(format!(
                "unsupported k-mer length {k} (must be 1..=64)"
            ))
            .into());
        }
        let key_bits = 2 * k;
        let histogram = self.db.histogram();

        let min_value = self.config.min_value.max(1);
        let max_value = self.config.max_value.unwrap_or_else(|| histogram.max_value());
        let value_offset = min_value - 1;
        self.value_bits = if self.config.store_values && max_value >= min_value {
            bit_width(max_value - value_offset)
        } else {
            0
        };
        self.filter = ValueFilter {
            min_value,
            max_value,
        };

        let num_suffix = histogram.occurrences_in_range(min_value, max_value);
        let num_files = self.db.num_files();
        let dead_zone_bits = (num_files * self.config.dead_zone_words * WORD_BITS) as u128;
        let estimator = SpaceEstimator::new(key_bits, num_suffix, self.value_bits)
            .with_overhead_bits(dead_zone_bits)
            .with_min_prefix_bits(ceil_log2(num_files as u64));
        let estimate = estimator.estimate(self.config.prefix_bits, self.config.max_memory_gib);
        if self.config.verbose {
            estimate.print_table();
        }

        self.split = KeySplit::new(key_bits, estimate.prefix_bits());
        info!("  k = {}, {} database files", k, num_files);
        info!(
            "  Values [{}, {}] stored in {} bits",
            min_value, max_value, self.value_bits
        );
        info!(
            "  Expecting {} k-mers: {} prefix bits, {} suffix bits, {:.3} GiB estimated",
            num_suffix,
            self.split.prefix_bits(),
            self.split.suffix_bits(),
            estimate.best().total_gib()
        );
        self.estimate = Some(estimate);
        Ok(())
    }

    /// Size every bucket, one database file per task
    pub fn count(&mut self) -> Result<(), LookupError> {
        self.advance("count", BuildStage::Initialized, BuildStage::Counted);

        let db = self.db;
        let split = self.split;
        let filter = self.filter;
        let counts: Vec<FileCounts> = self.pool.install(|| {
            (0..db.num_files())
                .into_par_iter()
                .map(|file| count_file(db, file, split, filter))
                .collect::<Result<Vec<_>, _>>()
        })?;
        check_disjoint(&counts)?;

        let mut stats = LoadStatistics::new();
        for c in &counts {
            if self.config.verbose {
                info!(
                    "  file {}: {} scanned, {} kept in {} buckets",
                    c.file,
                    c.stats.num_scanned,
                    c.stats.num_loaded,
                    c.runs.len()
                );
            }
            stats.merge(&c.stats);
        }
        stats.num_files = counts.len();
        stats.num_buckets = 1u64 << split.prefix_bits();
        let non_empty: u64 = counts.iter().map(|c| c.runs.len() as u64).sum();
        stats.num_empty_buckets = stats.num_buckets - non_empty;

        info!(
            "  Kept {} of {} k-mers ({} below, {} above the value range)",
            stats.num_loaded, stats.num_scanned, stats.num_too_low, stats.num_too_high
        );
        self.stats = stats;
        self.counts = counts;
        Ok(())
    }

    /// Lay out the buckets and allocate the prefix table and columns
    pub fn allocate(&mut self) {
        self.advance("allocate", BuildStage::Counted, BuildStage::Allocated);

        let dead_zone = dead_zone_slots(
            self.config.dead_zone_words,
            &[self.split.suffix_bits(), self.value_bits],
        );

        let mut order: Vec<&FileCounts> = self.counts.iter().filter(|c| !c.runs.is_empty()).collect();
        order.sort_unstable_by_key(|c| c.runs[0].0);

        let mut placements: Vec<(u64, u64, u64)> = Vec::new();
        let mut cursor = 0u64;
        for c in &order {
            for &(prefix, count) in &c.runs {
                placements.push((prefix, cursor, count));
                cursor += count;
            }
            cursor += dead_zone;
        }
        let num_slots = cursor;
        self.stats.num_dead_slots = dead_zone * order.len() as u64;

        let index = PrefixIndexTable::new(
            self.split.prefix_bits(),
            num_slots,
            self.stats.max_bucket_size,
            self.config.segment_bits,
        );
        for &(prefix, begin, count) in &placements {
            index.set(prefix, begin, count);
        }

        let store = SuffixValueStore::new(
            num_slots,
            self.split.suffix_bits(),
            self.value_bits,
            self.filter.min_value - 1,
            self.config.segment_bits,
            true,
        );

        info!(
            "  {} slots ({} dead zone) in {} buckets",
            num_slots, self.stats.num_dead_slots, self.stats.num_buckets
        );
        info!(
            "  Prefix table {:.3} GiB, suffixes {:.3} GiB, values {:.3} GiB",
            index.num_bits() as f64 / 8.0 / GIB,
            store.suffix_num_bits() as f64 / 8.0 / GIB,
            store.value_num_bits() as f64 / 8.0 / GIB
        );
        self.index = Some(index);
        self.store = Some(store);
    }

    /// Fill the columns, one database file per task
    pub fn load(&mut self) -> Result<(), LookupError> {
        self.advance("load", BuildStage::Allocated, BuildStage::Loaded);

        let (Some(index), Some(store)) = (self.index.as_ref(), self.store.as_ref()) else {
            panic!("LookupBuilder::load: tables missing after allocate");
        };
        let db = self.db;
        let split = self.split;
        let filter = self.filter;
        let written: u64 = self.pool.install(|| {
            (0..db.num_files())
                .into_par_iter()
                .map(|file| load_file(db, file, split, filter, index, store))
                .try_reduce(|| 0, |a, b| Ok(a + b))
        })?;
        debug_assert_eq!(written, self.stats.num_loaded);

        info!("  Loaded {} k-mers", written);
        if self.config.verbose {
            self.stats.print_summary();
        }
        Ok(())
    }

    /// Hand over the finished table
    pub fn finish(self) -> ExactLookup {
        assert_eq!(
            self.stage,
            BuildStage::Loaded,
            "LookupBuilder::finish called in stage {:?}",
            self.stage
        );
        let (Some(index), Some(store)) = (self.index, self.store) else {
            panic!("LookupBuilder::finish: tables missing after load");
        };
        ExactLookup::from_parts(
            self.db.kmer_len(),
            self.split,
            self.filter.min_value,
            self.filter.max_value,
            index,
            store,
            self.stats,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryDatabase;

    fn small_db() -> MemoryDatabase {
        let kmers = (0..500u128).map(|i| (i * 7919 % (1 << 20), 1 + (i as u64 % 9)));
        MemoryDatabase::from_kmers(10, 2, kmers).unwrap()
    }

    #[test]
    fn test_dead_zone_slots() {
        assert_eq!(dead_zone_slots(64, &[20, 8]), 1024);
        assert_eq!(dead_zone_slots(1, &[0, 3]), 43);
        assert_eq!(dead_zone_slots(64, &[0, 0]), 0);
        assert_eq!(dead_zone_slots(0, &[10, 5]), 0);
    }

    #[test]
    fn test_stages_in_order() {
        let db = small_db();
        let config = LookupConfig {
            num_threads: 2,
            ..LookupConfig::default()
        };
        let mut builder = LookupBuilder::new(&db, config).unwrap();
        assert_eq!(builder.stage(), BuildStage::Uninitialized);
        builder.initialize().unwrap();
        assert_eq!(builder.stage(), BuildStage::Initialized);
        assert!(builder.estimate().is_some());
        builder.count().unwrap();
        assert_eq!(builder.statistics().num_loaded, 500);
        builder.allocate();
        builder.load().unwrap();
        assert_eq!(builder.stage(), BuildStage::Loaded);

        let lookup = builder.finish();
        assert_eq!(lookup.num_index(), 500);
        for (key, value) in db.iter() {
            assert_eq!(lookup.value(key), value);
        }
    }

    #[test]
    #[should_panic(expected = "LookupBuilder::count called in stage Uninitialized")]
    fn test_count_before_initialize_panics() {
        let db = small_db();
        let mut builder = LookupBuilder::new(&db, LookupConfig::default()).unwrap();
        let _ = builder.count();
    }

    #[test]
    #[should_panic(expected = "LookupBuilder::initialize called in stage Initialized")]
    fn test_double_initialize_panics() {
        let db = small_db();
        let mut builder = LookupBuilder::new(&db, LookupConfig::default()).unwrap();
        builder.initialize().unwrap();
        let _ = builder.initialize();
    }

    #[test]
    fn test_file_bits_raise_minimum_prefix() {
        let kmers = (0..100u128).map(|i| (i << 24, 1));
        let db = MemoryDatabase::from_kmers(16, 8, kmers).unwrap();
        let mut builder = LookupBuilder::new(&db, LookupConfig::default()).unwrap();
        builder.initialize().unwrap();
        assert!(builder.estimate().unwrap().prefix_bits() >= 8);
    }

    #[test]
    fn test_narrow_prefix_hint_overlaps_files() {
        let kmers = vec![(0x00, 1), (0x40, 1), (0x80, 1), (0xC0, 1)];
        let db = MemoryDatabase::from_kmers(4, 2, kmers).unwrap();
        let config = LookupConfig {
            prefix_bits: Some(1),
            ..LookupConfig::default()
        };
        let mut builder = LookupBuilder::new(&db, config).unwrap();
        builder.initialize().unwrap();
        let err = builder.count().unwrap_err();
        assert!(matches!(err, LookupError::OverlappingShards { .. }));
    }
}
