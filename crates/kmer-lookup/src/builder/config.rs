//! Build configuration for lookup tables
//!
//! Collects the memory ceiling, prefix width hint, value filter and
//! resource knobs used by [`LookupBuilder`](super::LookupBuilder).

use crate::constants::{
    DEFAULT_DEAD_ZONE_WORDS, DEFAULT_MAX_MEMORY_GIB, DEFAULT_SEGMENT_BITS, WORD_BITS,
};
use crate::error::LookupError;

/// Widest prefix a table may be built with (`2^40` bucket entries)
pub const MAX_PREFIX_BITS: usize = 40;

/// Configuration parameters for building an exact lookup table
#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// Memory ceiling in GiB; exceeding it is reported, not fatal
    pub max_memory_gib: f64,

    /// Prefix width to use instead of searching for the cheapest one
    pub prefix_bits: Option<usize>,

    /// Smallest value kept (clamped to at least 1)
    pub min_value: u64,

    /// Largest value kept (`None` = the database maximum)
    pub max_value: Option<u64>,

    /// Store values; when false the table answers membership only
    pub store_values: bool,

    /// Number of threads for the count and load passes (0 = all available cores)
    pub num_threads: usize,

    /// Segment size of the bit-packed columns, in bits
    pub segment_bits: usize,

    /// Padding after each file's buckets, in 128-bit words
    pub dead_zone_words: usize,

    /// Log the estimator table and per-file details
    pub verbose: bool,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_memory_gib: DEFAULT_MAX_MEMORY_GIB,
            prefix_bits: None,
            min_value: 1,
            max_value: None,
            store_values: true,
            num_threads: 0,
            segment_bits: DEFAULT_SEGMENT_BITS,
            dead_zone_words: DEFAULT_DEAD_ZONE_WORDS,
            verbose: false,
        }
    }
}

impl LookupConfig {
    /// Create a configuration keeping values in `[min_value, max_value]`
    pub fn new(min_value: u64, max_value: Option<u64>) -> Result<Self, LookupError> {
        let config = Self {
            min_value,
            max_value,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<(), LookupError> {
        if !(self.max_memory_gib.is_finite() && self.max_memory_gib > 0.0) {
            return Err(LookupError::InvalidConfig(format!(
                "memory limit must be a positive number of GiB, got {}",
                self.max_memory_gib
            )));
        }

        if let Some(p) = self.prefix_bits {
            if p > MAX_PREFIX_BITS {
                return Err(LookupError::InvalidConfig(format!(
                    "prefix width must be at most {MAX_PREFIX_BITS} bits, got {p}"
                )));
            }
        }

        if let Some(max) = self.max_value {
            if max < self.min_value.max(1) {
                return Err(LookupError::InvalidConfig(format!(
                    "value range is empty: min {} > max {}",
                    self.min_value, max
                )));
            }
        }

        if self.segment_bits < WORD_BITS {
            return Err(LookupError::InvalidConfig(format!(
                "segment size must be at least {WORD_BITS} bits, got {}",
                self.segment_bits
            )));
        }

        Ok(())
    }

    /// Log configuration parameters via tracing
    pub fn print(&self) {
        tracing::info!("Lookup Configuration:");
        tracing::info!("  max_memory_gib = {}", self.max_memory_gib);
        match self.prefix_bits {
            Some(p) => tracing::info!("  prefix_bits = {}", p),
            None => tracing::info!("  prefix_bits = estimated"),
        }
        tracing::info!("  min_value = {}", self.min_value);
        match self.max_value {
            Some(v) => tracing::info!("  max_value = {}", v),
            None => tracing::info!("  max_value = database maximum"),
        }
        tracing::info!("  store_values = {}", self.store_values);
        if self.num_threads == 0 {
            tracing::info!("  num_threads = all available cores");
        } else {
            tracing::info!("  num_threads = {}", self.num_threads);
        }
        tracing::debug!("  segment_bits = {}", self.segment_bits);
        tracing::debug!("  dead_zone_words = {}", self.dead_zone_words);
        tracing::debug!("  verbose = {}", self.verbose);
    }
}
