//! Error type for building lookup tables

use crate::database::DatabaseError;
use thiserror::Error;

/// Errors raised while building an [`ExactLookup`](crate::ExactLookup)
///
/// Query misses are not errors: lookups report them through their return
/// values. Bounds violations inside the bit-packed storage are programming
/// errors and panic instead.
#[derive(Error, Debug)]
pub enum LookupError {
    /// A configuration parameter is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The k-mer database could not be read
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Two database files map keys to the same prefix range
    #[error("database files {first} and {second} both hold prefixes in [{low:#x}, {high:#x}]")]
    OverlappingShards {
        /// Earlier file
        first: usize,
        /// Later file
        second: usize,
        /// Start of the shared prefix range
        low: u64,
        /// End of the shared prefix range
        high: u64,
    },

    /// Keys of a database file are not strictly increasing
    #[error("database file {file} is not sorted: key {key:#x} follows {previous:#x}")]
    UnsortedInput {
        /// File index
        file: usize,
        /// Key read before
        previous: u128,
        /// Offending key
        key: u128,
    },

    /// A key is wider than the database k-mer length allows
    #[error("database file {file} holds key {key:#x}, wider than {key_bits} bits")]
    KeyOutOfRange {
        /// File index
        file: usize,
        /// Offending key
        key: u128,
        /// Key width of the database
        key_bits: usize,
    },

    /// The load pass disagreed with the count pass about a bucket
    #[error("bucket {prefix:#x} was sized for {expected} k-mers but load found {found}")]
    BucketSizeMismatch {
        /// Bucket prefix
        prefix: u64,
        /// Size computed by the count pass
        expected: u64,
        /// K-mers written by the load pass
        found: u64,
    },

    /// The build thread pool could not be created
    #[error("failed to create thread pool: {0}")]
    ThreadPool(String),
}
