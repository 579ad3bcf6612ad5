// kmer-lookup: exact k-mer membership and value tables
//
// Bit-packed prefix/suffix tables built in parallel from sharded, sorted
// k-mer databases.

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod bit_packed_array;
pub mod builder;
pub mod constants;
pub mod database;
pub mod encoding;
pub mod error;
pub mod lookup;
pub mod prefix_index;
pub mod sequence_query;
pub mod space_estimator;
pub mod suffix_store;

// Re-export common types at crate root
pub use bit_packed_array::BitPackedArray;
pub use builder::{BuildStage, LoadStatistics, LookupBuilder, LookupConfig};
pub use database::{KmerDatabase, MemoryDatabase};
pub use error::LookupError;
pub use lookup::ExactLookup;
pub use prefix_index::{KeySplit, PrefixIndexTable};
pub use sequence_query::{KmerHit, KmerIter, SequenceLookupSummary, SequenceQuery};
pub use space_estimator::{SpaceCandidate, SpaceEstimate, SpaceEstimator};
pub use suffix_store::SuffixValueStore;

/// Version information
pub fn version() -> (u8, u8, u8) {
    constants::VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let (major, minor, patch) = version();
        assert_eq!(major, 0);
        assert_eq!(minor, 1);
        assert_eq!(patch, 0);
    }
}
