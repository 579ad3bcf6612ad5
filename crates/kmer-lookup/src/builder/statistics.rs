//! Build statistics

use tracing::info;

/// Counters gathered while counting and loading a table
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadStatistics {
    /// K-mers read from the database
    pub num_scanned: u64,

    /// K-mers stored in the table
    pub num_loaded: u64,

    /// K-mers dropped for a value below the minimum
    pub num_too_low: u64,

    /// K-mers dropped for a value above the maximum
    pub num_too_high: u64,

    /// Number of prefix buckets (`2^P`)
    pub num_buckets: u64,

    /// Buckets holding no k-mer
    pub num_empty_buckets: u64,

    /// Largest bucket
    pub max_bucket_size: u64,

    /// Database files read
    pub num_files: usize,

    /// Padding slots between file blocks
    pub num_dead_slots: u64,
}

impl LoadStatistics {
    /// Create a new statistics tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one k-mer read from the database and whether it passed the filter
    #[inline]
    pub fn record(&mut self, value: u64, min_value: u64, max_value: u64) -> bool {
        self.num_scanned += 1;
        if value < min_value {
            self.num_too_low += 1;
            false
        } else if value > max_value {
            self.num_too_high += 1;
            false
        } else {
            self.num_loaded += 1;
            true
        }
    }

    /// Fold the filter counters of another file into these
    pub fn merge(&mut self, other: &LoadStatistics) {
        self.num_scanned += other.num_scanned;
        self.num_loaded += other.num_loaded;
        self.num_too_low += other.num_too_low;
        self.num_too_high += other.num_too_high;
        self.max_bucket_size = self.max_bucket_size.max(other.max_bucket_size);
    }

    /// Log statistics summary via tracing
    pub fn print_summary(&self) {
        let pct = |n: u64, of: u64| {
            if of == 0 {
                0.0
            } else {
                (n as f64 * 100.0) / of as f64
            }
        };

        info!("Load Statistics:");
        info!("  Files read: {}", self.num_files);
        info!("  K-mers scanned: {}", self.num_scanned);
        info!(
            "  K-mers loaded: {} ({:.2}%)",
            self.num_loaded,
            pct(self.num_loaded, self.num_scanned)
        );
        info!(
            "  Below minimum value: {} ({:.2}%)",
            self.num_too_low,
            pct(self.num_too_low, self.num_scanned)
        );
        info!(
            "  Above maximum value: {} ({:.2}%)",
            self.num_too_high,
            pct(self.num_too_high, self.num_scanned)
        );
        info!("  Buckets: {}", self.num_buckets);
        info!(
            "  Empty buckets: {} ({:.2}%)",
            self.num_empty_buckets,
            pct(self.num_empty_buckets, self.num_buckets)
        );
        info!("  Max bucket size: {}", self.max_bucket_size);
        info!("  Dead zone slots: {}", self.num_dead_slots);
    }
}
