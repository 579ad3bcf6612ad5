//! Count pass
//!
//! Reads one database file, applies the value filter and tallies how many
//! k-mers land in each prefix bucket. Files are counted independently and
//! merged afterwards, so no bucket counter is shared between threads.

use crate::builder::statistics::LoadStatistics;
use crate::constants::low_mask;
use crate::database::{KmerBlock, KmerDatabase, ShardReader};
use crate::error::LookupError;
use crate::prefix_index::KeySplit;

/// Inclusive value range kept in the table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ValueFilter {
    pub min_value: u64,
    pub max_value: u64,
}

/// Bucket sizes of one database file
#[derive(Clone, Debug, Default)]
pub(crate) struct FileCounts {
    pub file: usize,
    /// `(prefix, count)` in ascending prefix order, non-empty buckets only
    pub runs: Vec<(u64, u64)>,
    pub stats: LoadStatistics,
}

impl FileCounts {
    /// First and last prefix touched by this file
    pub fn prefix_span(&self) -> Option<(u64, u64)> {
        match (self.runs.first(), self.runs.last()) {
            (Some(&(first, _)), Some(&(last, _))) => Some((first, last)),
            _ => None,
        }
    }
}

/// Walk every k-mer of `file` that passes `filter`, in key order.
///
/// Keys are checked to be strictly increasing and to fit in the database key
/// width; `visit` receives `(key, value)`.
pub(crate) fn for_each_kmer<D, F>(
    db: &D,
    file: usize,
    filter: ValueFilter,
    stats: &mut LoadStatistics,
    mut visit: F,
) -> Result<(), LookupError>
where
    D: KmerDatabase,
    F: FnMut(u128, u64) -> Result<(), LookupError>,
{
    let key_bits = 2 * db.kmer_len();
    let key_mask = low_mask(key_bits);
    let db_suffix_bits = db.suffix_bits();

    let mut reader = db.open_file(file)?;
    let mut block = KmerBlock::default();
    let mut previous: Option<u128> = None;

    while reader.next_block(&mut block)? {
        for i in 0..block.len() {
            let key = block.key(i, db_suffix_bits);
            if key & !key_mask != 0 {
                return Err(LookupError::KeyOutOfRange {
                    file,
                    key,
                    key_bits,
                });
            }
            if let Some(previous) = previous {
                if key <= previous {
                    return Err(LookupError::UnsortedInput {
                        file,
                        previous,
                        key,
                    });
                }
            }
            previous = Some(key);

            let value = block.values[i];
            if stats.record(value, filter.min_value, filter.max_value) {
                visit(key, value)?;
            }
        }
    }
    Ok(())
}

/// Count the bucket sizes of one file
pub(crate) fn count_file<D: KmerDatabase>(
    db: &D,
    file: usize,
    split: KeySplit,
    filter: ValueFilter,
) -> Result<FileCounts, LookupError> {
    let mut counts = FileCounts {
        file,
        ..FileCounts::default()
    };
    let mut stats = LoadStatistics::new();
    let runs = &mut counts.runs;

    for_each_kmer(db, file, filter, &mut stats, |key, _| {
        let (prefix, _) = split.split(key);
        match runs.last_mut() {
            Some((p, count)) if *p == prefix => *count += 1,
            _ => runs.push((prefix, 1)),
        }
        Ok(())
    })?;

    stats.max_bucket_size = runs.iter().map(|&(_, c)| c).max().unwrap_or(0);
    counts.stats = stats;
    Ok(counts)
}

/// Check that no two files share a prefix
pub(crate) fn check_disjoint(counts: &[FileCounts]) -> Result<(), LookupError> {
    let mut spans: Vec<(u64, u64, usize)> = counts
        .iter()
        .filter_map(|c| c.prefix_span().map(|(lo, hi)| (lo, hi, c.file)))
        .collect();
    spans.sort_unstable();

    for pair in spans.windows(2) {
        let (_, prev_hi, prev_file) = pair[0];
        let (next_lo, next_hi, next_file) = pair[1];
        if next_lo <= prev_hi {
            return Err(LookupError::OverlappingShards {
                first: prev_file.min(next_file),
                second: prev_file.max(next_file),
                low: next_lo,
                high: prev_hi.min(next_hi),
            });
        }
    }
    Ok(())
}
