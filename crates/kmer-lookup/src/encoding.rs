//! 2-bit DNA encoding of k-mer keys
//!
//! A k-mer of length `k` is packed into the low `2k` bits of a `u128`, first
//! base in the most significant position:
//! - A (65/97)  -> 00
//! - C (67/99)  -> 01
//! - T (84/116) -> 10
//! - G (71/103) -> 11
//!
//! With this code the complement of a base is `bits ^ 0b10`.

use crate::constants::{is_valid_k, low_mask};
use thiserror::Error;

/// Error type for encoding operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// The input byte is not a valid DNA base (A/C/G/T)
    #[error("Invalid DNA base {base:?} at position {pos}")]
    InvalidBase {
        /// Offending byte
        base: u8,
        /// Position of the byte in the k-mer
        pos: usize,
    },
    /// The k-mer length cannot be held in a 128-bit key
    #[error("Unsupported k-mer length {0} (must be 1..=64)")]
    UnsupportedLength(usize),
}

/// Encode a single DNA nucleotide to 2 bits, `None` for anything but ACGT
#[inline]
pub const fn encode_base(base: u8) -> Option<u8> {
    match base {
        b'A' | b'a' => Some(0b00),
        b'C' | b'c' => Some(0b01),
        b'T' | b't' => Some(0b10),
        b'G' | b'g' => Some(0b11),
        _ => None,
    }
}

/// Decode a 2-bit value to DNA nucleotide (uppercase)
#[inline]
pub const fn decode_base(bits: u8) -> u8 {
    match bits & 0b11 {
        0b00 => b'A',
        0b01 => b'C',
        0b10 => b'T',
        _ => b'G',
    }
}

/// Get the complement of an encoded base
#[inline]
pub const fn complement_base(bits: u8) -> u8 {
    bits ^ 0b10
}

/// Mask covering the `2k` key bits of a k-mer
#[inline]
pub const fn kmer_mask(k: usize) -> u128 {
    low_mask(2 * k)
}

/// Encode a k-mer into its key.
///
/// # Errors
/// Returns an error if `kmer` is longer than 64 bases or holds a non-ACGT byte.
pub fn encode_kmer(kmer: &[u8]) -> Result<u128, EncodingError> {
    if !is_valid_k(kmer.len()) {
        return Err(EncodingError::UnsupportedLength(kmer.len()));
    }
    let mut key = 0u128;
    for (pos, &base) in kmer.iter().enumerate() {
        let bits = encode_base(base).ok_or(EncodingError::InvalidBase { base, pos })?;
        key = (key << 2) | bits as u128;
    }
    Ok(key)
}

/// Decode a key back to its k-mer string
pub fn decode_kmer(key: u128, k: usize) -> String {
    (0..k)
        .map(|i| decode_base((key >> (2 * (k - 1 - i))) as u8) as char)
        .collect()
}

/// Reverse complement of a key holding `k` bases
pub fn reverse_complement(key: u128, k: usize) -> u128 {
    let mut rc = 0u128;
    let mut fwd = key;
    for _ in 0..k {
        rc = (rc << 2) | complement_base((fwd & 0b11) as u8) as u128;
        fwd >>= 2;
    }
    rc
}

/// The smaller of a key and its reverse complement
#[inline]
pub fn canonical(key: u128, k: usize) -> u128 {
    key.min(reverse_complement(key, k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_base() {
        assert_eq!(encode_base(b'A'), Some(0b00));
        assert_eq!(encode_base(b'a'), Some(0b00));
        assert_eq!(encode_base(b'C'), Some(0b01));
        assert_eq!(encode_base(b'T'), Some(0b10));
        assert_eq!(encode_base(b'g'), Some(0b11));
        assert_eq!(encode_base(b'N'), None);
        assert_eq!(encode_base(b'0'), None);
    }

    #[test]
    fn test_complement_base() {
        assert_eq!(complement_base(0b00), 0b10); // A -> T
        assert_eq!(complement_base(0b10), 0b00); // T -> A
        assert_eq!(complement_base(0b01), 0b11); // C -> G
        assert_eq!(complement_base(0b11), 0b01); // G -> C
    }

    #[test]
    fn test_encode_kmer() {
        assert_eq!(encode_kmer(b"AC").unwrap(), 0b0001);
        assert_eq!(encode_kmer(b"GATTACA").unwrap(), 0b11_00_10_10_00_01_00);
        assert_eq!(decode_kmer(encode_kmer(b"gattaca").unwrap(), 7), "GATTACA");
    }

    #[test]
    fn test_encode_kmer_errors() {
        assert_eq!(
            encode_kmer(b"ACNT"),
            Err(EncodingError::InvalidBase { base: b'N', pos: 2 })
        );
        assert_eq!(encode_kmer(b""), Err(EncodingError::UnsupportedLength(0)));
        assert_eq!(
            encode_kmer(&[b'A'; 65]),
            Err(EncodingError::UnsupportedLength(65))
        );
    }

    #[test]
    fn test_full_width_kmer() {
        let kmer = [b'G'; 64];
        assert_eq!(encode_kmer(&kmer).unwrap(), u128::MAX);
        assert_eq!(kmer_mask(64), u128::MAX);
    }

    #[test]
    fn test_reverse_complement_and_canonical() {
        let k = 7;
        let fwd = encode_kmer(b"GATTACA").unwrap();
        let rc = reverse_complement(fwd, k);
        assert_eq!(decode_kmer(rc, k), "TGTAATC");
        assert_eq!(reverse_complement(rc, k), fwd);
        assert_eq!(canonical(fwd, k), canonical(rc, k));
        assert_eq!(canonical(fwd, k), fwd.min(rc));
    }
}
