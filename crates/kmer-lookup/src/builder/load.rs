//! Load pass
//!
//! Re-reads one database file and writes each kept k-mer into its bucket.
//! Keys arrive sorted, so a single running cursor walks the file's buckets
//! in order and every bucket ends up sorted by suffix. The cursor is checked
//! against the bucket bounds found by the count pass.

use crate::builder::count::{for_each_kmer, ValueFilter};
use crate::builder::statistics::LoadStatistics;
use crate::database::KmerDatabase;
use crate::error::LookupError;
use crate::prefix_index::{KeySplit, PrefixIndexTable};
use crate::suffix_store::SuffixValueStore;

/// Write cursor inside one bucket
struct BucketCursor {
    prefix: u64,
    begin: u64,
    next: u64,
    end: u64,
}

impl BucketCursor {
    fn open(index: &PrefixIndexTable, prefix: u64) -> Self {
        let (begin, end) = index.range(prefix);
        Self {
            prefix,
            begin,
            next: begin,
            end,
        }
    }

    fn overflow(&self) -> LookupError {
        LookupError::BucketSizeMismatch {
            prefix: self.prefix,
            expected: self.end - self.begin,
            found: self.next - self.begin + 1,
        }
    }

    fn close(&self) -> Result<(), LookupError> {
        if self.next != self.end {
            return Err(LookupError::BucketSizeMismatch {
                prefix: self.prefix,
                expected: self.end - self.begin,
                found: self.next - self.begin,
            });
        }
        Ok(())
    }
}

/// Load every kept k-mer of `file` into `store`; returns the number written
pub(crate) fn load_file<D: KmerDatabase>(
    db: &D,
    file: usize,
    split: KeySplit,
    filter: ValueFilter,
    index: &PrefixIndexTable,
    store: &SuffixValueStore,
) -> Result<u64, LookupError> {
    let mut stats = LoadStatistics::new();
    let mut cursor: Option<BucketCursor> = None;
    let mut written = 0u64;

    for_each_kmer(db, file, filter, &mut stats, |key, value| {
        let (prefix, suffix) = split.split(key);
        let bucket = match cursor.take() {
            Some(current) if current.prefix == prefix => cursor.insert(current),
            previous => {
                if let Some(previous) = previous {
                    previous.close()?;
                }
                cursor.insert(BucketCursor::open(index, prefix))
            }
        };
        if bucket.next >= bucket.end {
            return Err(bucket.overflow());
        }
        store.set(bucket.next, suffix, value);
        bucket.next += 1;
        written += 1;
        Ok(())
    })?;

    if let Some(last) = &cursor {
        last.close()?;
    }
    Ok(written)
}
