//! Constants and bit arithmetic helpers
//!
//! This module defines the tunables shared by the bit-packed storage and the
//! lookup engine, plus the `ceil_log2` / `bit_width` helpers used to size
//! every packed field.

/// Sentinel returned by [`crate::ExactLookup::index`] for a missing k-mer
pub const INVALID_INDEX: u64 = u64::MAX;

/// Bits in one storage word of a [`crate::BitPackedArray`]
pub const WORD_BITS: usize = 128;

/// Number of 128-bit words guarded by a single lock domain
pub const WORDS_PER_LOCK: usize = 64;

/// Default segment size in bits (8 MiB per segment)
pub const DEFAULT_SEGMENT_BITS: usize = 8 * 1024 * 1024 * 8;

/// Smallest prefix width considered by the space estimator.
///
/// 64 buckets are enough to keep every shard of a database busy during the
/// parallel count and load passes.
pub const MIN_PREFIX_BITS: usize = 6;

/// Bucket ranges at or below this many entries are scanned linearly
pub const LINEAR_SCAN_THRESHOLD: u64 = 8;

/// Default dead zone between shard blocks, in 128-bit words
pub const DEFAULT_DEAD_ZONE_WORDS: usize = WORDS_PER_LOCK;

/// Default memory ceiling in GiB for a lookup table
pub const DEFAULT_MAX_MEMORY_GIB: f64 = 16.0;

/// Largest supported k-mer length (keys are at most 128 bits)
pub const MAX_K: usize = 64;

/// Bytes per GiB
pub const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Version number
pub const VERSION: (u8, u8, u8) = (0, 1, 0);

/// Check if a k-mer length can be represented as a key
#[inline]
pub const fn is_valid_k(k: usize) -> bool {
    k >= 1 && k <= MAX_K
}

/// Compute ceil(log2(x)).
///
/// Returns 0 for x <= 1, and the minimum number of bits needed to
/// represent values in [0, x) for x >= 2.
#[inline]
pub const fn ceil_log2(x: u64) -> usize {
    if x <= 1 {
        0
    } else {
        64 - (x - 1).leading_zeros() as usize
    }
}

/// Number of bits needed to store `x` itself (0 for x == 0).
#[inline]
pub const fn bit_width(x: u64) -> usize {
    64 - x.leading_zeros() as usize
}

/// Mask with the low `bits` bits set, for `bits` in 0..=128
#[inline]
pub const fn low_mask(bits: usize) -> u128 {
    if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}
