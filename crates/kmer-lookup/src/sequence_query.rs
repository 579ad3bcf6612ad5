//! Sequence queries
//!
//! Slides a window of length `k` over a nucleotide sequence and looks up
//! every k-mer in an [`ExactLookup`]. The forward and reverse-complement
//! keys are updated incrementally, one base per step; a base outside ACGT
//! restarts the window after it.

use crate::encoding::{complement_base, encode_base, kmer_mask};
use crate::lookup::ExactLookup;

/// Rolling iterator over the k-mers of a sequence
///
/// Yields `(position, key)` for each window holding only ACGT, where
/// `position` is the offset of the window's first base.
pub struct KmerIter<'a> {
    seq: &'a [u8],
    k: usize,
    canonical: bool,
    pos: usize,
    filled: usize,
    forward: u128,
    reverse: u128,
    mask: u128,
    rc_shift: usize,
}

impl<'a> KmerIter<'a> {
    /// Iterate over the k-mers of `seq`; `canonical` yields the smaller of
    /// each k-mer and its reverse complement.
    pub fn new(seq: &'a [u8], k: usize, canonical: bool) -> Self {
        assert!(
            crate::constants::is_valid_k(k),
            "KmerIter: unsupported k-mer length {}",
            k
        );
        Self {
            seq,
            k,
            canonical,
            pos: 0,
            filled: 0,
            forward: 0,
            reverse: 0,
            mask: kmer_mask(k),
            rc_shift: 2 * (k - 1),
        }
    }
}

impl Iterator for KmerIter<'_> {
    type Item = (usize, u128);

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.seq.len() {
            let base = self.seq[self.pos];
            self.pos += 1;

            let Some(bits) = encode_base(base) else {
                self.filled = 0;
                continue;
            };
            self.forward = ((self.forward << 2) | bits as u128) & self.mask;
            self.reverse = (self.reverse >> 2) | ((complement_base(bits) as u128) << self.rc_shift);
            self.filled = (self.filled + 1).min(self.k);

            if self.filled == self.k {
                let key = if self.canonical {
                    self.forward.min(self.reverse)
                } else {
                    self.forward
                };
                return Some((self.pos - self.k, key));
            }
        }
        None
    }
}

/// One k-mer of a queried sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KmerHit {
    /// Offset of the k-mer in the sequence
    pub pos: usize,
    /// Key looked up
    pub key: u128,
    /// Stored value, `None` when absent
    pub value: Option<u64>,
}

/// Per-sequence lookup tally
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceLookupSummary {
    /// Valid k-mers in the sequence
    pub num_kmers: u64,
    /// K-mers found in the table
    pub num_found: u64,
}

impl SequenceLookupSummary {
    /// K-mers not found in the table
    pub fn num_missing(&self) -> u64 {
        self.num_kmers - self.num_found
    }

    /// Fold another tally into this one
    pub fn merge(&mut self, other: &SequenceLookupSummary) {
        self.num_kmers += other.num_kmers;
        self.num_found += other.num_found;
    }
}

/// Sequence lookups against one table
pub struct SequenceQuery<'a> {
    lookup: &'a ExactLookup,
    canonical: bool,
}

impl<'a> SequenceQuery<'a> {
    /// Query `lookup`, canonicalizing k-mers if `canonical` is set
    pub fn new(lookup: &'a ExactLookup, canonical: bool) -> Self {
        Self { lookup, canonical }
    }

    /// Every k-mer of `seq` with its lookup result
    pub fn hits<'s>(&self, seq: &'s [u8]) -> impl Iterator<Item = KmerHit> + 's
    where
        'a: 's,
    {
        let lookup: &'s ExactLookup = self.lookup;
        KmerIter::new(seq, lookup.k(), self.canonical).map(move |(pos, key)| KmerHit {
            pos,
            key,
            value: lookup.exists_with_value(key),
        })
    }

    /// Count the k-mers of `seq` and how many are in the table
    pub fn summarize(&self, seq: &[u8]) -> SequenceLookupSummary {
        let mut summary = SequenceLookupSummary::default();
        for (_, key) in KmerIter::new(seq, self.lookup.k(), self.canonical) {
            summary.num_kmers += 1;
            if self.lookup.exists(key) {
                summary.num_found += 1;
            }
        }
        summary
    }

    /// Whether any k-mer of `seq` is in the table
    pub fn any_found(&self, seq: &[u8]) -> bool {
        KmerIter::new(seq, self.lookup.k(), self.canonical).any(|(_, key)| self.lookup.exists(key))
    }
}
