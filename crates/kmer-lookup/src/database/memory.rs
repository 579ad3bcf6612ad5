//! In-memory k-mer database
//!
//! Holds a sorted k-mer set split into `2^file_bits` files by the leading
//! key bits, each file cut into blocks by a further [`BLOCK_PREFIX_BITS`]
//! bits. This is the layout a sharded on-disk database presents to readers,
//! which makes it a drop-in source for building lookup tables from k-mers
//! that are already in memory.

use super::{DatabaseError, Histogram, KmerBlock, KmerDatabase, ShardReader};
use crate::constants::{is_valid_k, low_mask};

/// Extra prefix bits used to split each file into blocks
pub const BLOCK_PREFIX_BITS: usize = 4;

/// Widest file split accepted by [`MemoryDatabase::from_kmers`]
pub const MAX_FILE_BITS: usize = 16;

#[inline]
fn shr(x: u128, bits: usize) -> u128 {
    if bits >= 128 {
        0
    } else {
        x >> bits
    }
}

/// Sharded k-mer database held in memory
#[derive(Clone, Debug)]
pub struct MemoryDatabase {
    k: usize,
    suffix_bits: usize,
    files: Vec<Vec<KmerBlock>>,
    histogram: Histogram,
}

impl MemoryDatabase {
    /// Build a database from `(key, value)` pairs.
    ///
    /// Keys are sorted; duplicate keys have their values summed. Keys must
    /// fit in `2k` bits.
    pub fn from_kmers<I>(k: usize, file_bits: usize, kmers: I) -> Result<Self, DatabaseError>
    where
        I: IntoIterator<Item = (u128, u64)>,
    {
        if !is_valid_k(k) {
            return Err(DatabaseError::Layout(format!(
                "unsupported k-mer length {k} (must be 1..=64)"
            )));
        }
        if file_bits > MAX_FILE_BITS {
            return Err(DatabaseError::Layout(format!(
                "{file_bits} file bits requested, at most {MAX_FILE_BITS} supported"
            )));
        }
        let key_bits = 2 * k;
        let file_bits = file_bits.min(key_bits);
        let block_bits = (file_bits + BLOCK_PREFIX_BITS).min(key_bits);
        let suffix_bits = key_bits - block_bits;

        let mut kmers: Vec<(u128, u64)> = kmers.into_iter().collect();
        if let Some(&(key, _)) = kmers.iter().find(|&&(key, _)| key & !low_mask(key_bits) != 0) {
            return Err(DatabaseError::Layout(format!(
                "key {key:#x} does not fit in {key_bits} bits"
            )));
        }
        kmers.sort_unstable_by_key(|&(key, _)| key);
        kmers.dedup_by(|next, kept| {
            if next.0 == kept.0 {
                kept.1 += next.1;
                true
            } else {
                false
            }
        });

        let histogram = Histogram::from_values(kmers.iter().map(|&(_, v)| v));

        let mut files: Vec<Vec<KmerBlock>> = vec![Vec::new(); 1usize << file_bits];
        for (key, value) in kmers {
            let file = shr(key, key_bits - file_bits) as usize;
            let prefix = shr(key, suffix_bits);
            let blocks = &mut files[file];
            match blocks.last_mut() {
                Some(block) if block.prefix == prefix => {
                    block.suffixes.push(key & low_mask(suffix_bits));
                    block.values.push(value);
                }
                _ => blocks.push(KmerBlock::new(
                    prefix,
                    vec![key & low_mask(suffix_bits)],
                    vec![value],
                )),
            }
        }

        Ok(Self {
            k,
            suffix_bits,
            files,
            histogram,
        })
    }

    /// Build a database from explicit per-file blocks.
    ///
    /// The caller is responsible for the sorting and disjointness
    /// requirements of [`KmerDatabase`]; the histogram is derived from the
    /// block values.
    pub fn from_shards(
        k: usize,
        suffix_bits: usize,
        files: Vec<Vec<KmerBlock>>,
    ) -> Result<Self, DatabaseError> {
        if !is_valid_k(k) || suffix_bits > 2 * k {
            return Err(DatabaseError::Layout(format!(
                "suffix of {suffix_bits} bits does not fit a {k}-mer"
            )));
        }
        for block in files.iter().flatten() {
            if block.suffixes.len() != block.values.len() {
                return Err(DatabaseError::Layout(format!(
                    "block {:#x} has {} suffixes but {} values",
                    block.prefix,
                    block.suffixes.len(),
                    block.values.len()
                )));
            }
        }
        let histogram =
            Histogram::from_values(files.iter().flatten().flat_map(|b| b.values.iter().copied()));
        Ok(Self {
            k,
            suffix_bits,
            files,
            histogram,
        })
    }

    /// Total number of k-mers across all files
    pub fn num_kmers(&self) -> u64 {
        self.files.iter().flatten().map(|b| b.len() as u64).sum()
    }

    /// Iterate over every `(key, value)` pair, file by file
    pub fn iter(&self) -> impl Iterator<Item = (u128, u64)> + '_ {
        let suffix_bits = self.suffix_bits;
        self.files.iter().flatten().flat_map(move |block| {
            (0..block.len()).map(move |i| (block.key(i, suffix_bits), block.values[i]))
        })
    }
}

/// Block reader over one file of a [`MemoryDatabase`]
pub struct MemoryShard<'a> {
    blocks: &'a [KmerBlock],
    next: usize,
}

impl ShardReader for MemoryShard<'_> {
    fn next_block(&mut self, block: &mut KmerBlock) -> Result<bool, DatabaseError> {
        let Some(source) = self.blocks.get(self.next) else {
            return Ok(false);
        };
        self.next += 1;
        block.prefix = source.prefix;
        block.suffixes.clear();
        block.suffixes.extend_from_slice(&source.suffixes);
        block.values.clear();
        block.values.extend_from_slice(&source.values);
        Ok(true)
    }
}

impl KmerDatabase for MemoryDatabase {
    type Shard<'a> = MemoryShard<'a>;

    fn kmer_len(&self) -> usize {
        self.k
    }

    fn num_files(&self) -> usize {
        self.files.len()
    }

    fn suffix_bits(&self) -> usize {
        self.suffix_bits
    }

    fn open_file(&self, file: usize) -> Result<MemoryShard<'_>, DatabaseError> {
        let blocks = self.files.get(file).ok_or(DatabaseError::InvalidFile(file))?;
        Ok(MemoryShard { blocks, next: 0 })
    }

    fn histogram(&self) -> &Histogram {
        &self.histogram
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(db: &MemoryDatabase, file: usize) -> Vec<KmerBlock> {
        let mut reader = db.open_file(file).unwrap();
        let mut block = KmerBlock::default();
        let mut out = Vec::new();
        while reader.next_block(&mut block).unwrap() {
            out.push(block.clone());
        }
        out
    }

    #[test]
    fn test_from_kmers_layout() {
        // k = 5: 10-bit keys, 2 file bits, 6 block bits, 4 suffix bits
        let kmers = vec![(0b11_0000_0001, 3), (0b00_0000_0010, 1), (0b00_0001_0000, 2)];
        let db = MemoryDatabase::from_kmers(5, 2, kmers).unwrap();
        assert_eq!(db.num_files(), 4);
        assert_eq!(db.suffix_bits(), 4);
        assert_eq!(db.num_kmers(), 3);

        let file0 = read_all(&db, 0);
        assert_eq!(file0.len(), 2);
        assert_eq!(file0[0], KmerBlock::new(0, vec![0b0010], vec![1]));
        assert_eq!(file0[1], KmerBlock::new(1, vec![0], vec![2]));
        assert!(read_all(&db, 1).is_empty());
        assert_eq!(read_all(&db, 3)[0].prefix, 0b11_0000);
    }

    #[test]
    fn test_duplicates_are_merged() {
        let db = MemoryDatabase::from_kmers(4, 1, vec![(7, 2), (7, 3), (1, 1)]).unwrap();
        let all: Vec<_> = db.iter().collect();
        assert_eq!(all, vec![(1, 1), (7, 5)]);
        assert_eq!(db.histogram().max_value(), 5);
    }

    #[test]
    fn test_small_k_clamps_prefix_bits() {
        // 2k = 4 bits: everything is prefix, suffixes are empty
        let db = MemoryDatabase::from_kmers(2, 6, vec![(0b0110, 1), (0b1001, 2)]).unwrap();
        assert_eq!(db.suffix_bits(), 0);
        assert_eq!(db.num_files(), 16);
        let all: Vec<_> = db.iter().collect();
        assert_eq!(all, vec![(0b0110, 1), (0b1001, 2)]);
    }

    #[test]
    fn test_rejects_wide_keys() {
        assert!(MemoryDatabase::from_kmers(2, 1, vec![(0b1_0000, 1)]).is_err());
        assert!(MemoryDatabase::from_kmers(0, 1, Vec::new()).is_err());
    }

    #[test]
    fn test_open_missing_file() {
        let db = MemoryDatabase::from_kmers(4, 1, vec![(1, 1)]).unwrap();
        assert!(matches!(db.open_file(2), Err(DatabaseError::InvalidFile(2))));
    }
}
