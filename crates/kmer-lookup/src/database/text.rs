//! Text dumps of k-mer databases
//!
//! Reads the `KMER<TAB>VALUE` listing produced when a k-mer database is
//! dumped as text, one k-mer per line. Blank lines and lines starting with
//! `#` are skipped. Every k-mer must have the same length.

use super::{DatabaseError, KmerDatabase, MemoryDatabase};
use crate::encoding::encode_kmer;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

/// Read a text dump from `path` into a [`MemoryDatabase`] with `2^file_bits` files.
pub fn read_kmer_dump<P: AsRef<Path>>(
    path: P,
    file_bits: usize,
) -> Result<MemoryDatabase, DatabaseError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let db = parse_kmer_dump(BufReader::new(file), file_bits)?;
    info!(
        "Read {} k-mers (k={}) from {}",
        db.histogram().total_occurrences(),
        db.kmer_len(),
        path.display()
    );
    Ok(db)
}

/// Parse a text dump from any buffered reader.
pub fn parse_kmer_dump<R: BufRead>(
    reader: R,
    file_bits: usize,
) -> Result<MemoryDatabase, DatabaseError> {
    let mut k: Option<usize> = None;
    let mut kmers: Vec<(u128, u64)> = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut fields = trimmed.split_whitespace();
        let kmer = fields.next().unwrap_or_default();
        let value = match fields.next() {
            Some(field) => field.parse::<u64>().map_err(|e| DatabaseError::Parse {
                line: line_no,
                message: format!("invalid value {field:?}: {e}"),
            })?,
            None => {
                return Err(DatabaseError::Parse {
                    line: line_no,
                    message: "missing value column".to_string(),
                })
            }
        };

        let expected = *k.get_or_insert(kmer.len());
        if kmer.len() != expected {
            return Err(DatabaseError::KmerLength {
                expected,
                actual: kmer.len(),
            });
        }
        let key = encode_kmer(kmer.as_bytes()).map_err(|e| DatabaseError::Parse {
            line: line_no,
            message: e.to_string(),
        })?;
        kmers.push((key, value));
    }

    let k = k.ok_or_else(|| DatabaseError::Layout("k-mer dump holds no k-mers".to_string()))?;
    MemoryDatabase::from_kmers(k, file_bits, kmers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_dump() {
        let text = "# kmer\tcount\nACGT\t3\n\nAAAA\t1\nTTTT 7\n";
        let db = parse_kmer_dump(text.as_bytes(), 2).unwrap();
        assert_eq!(db.kmer_len(), 4);
        assert_eq!(db.num_kmers(), 3);
        let all: Vec<_> = db.iter().collect();
        assert_eq!(
            all,
            vec![
                (encode_kmer(b"AAAA").unwrap(), 1),
                (encode_kmer(b"ACGT").unwrap(), 3),
                (encode_kmer(b"TTTT").unwrap(), 7),
            ]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_kmer_dump("ACGT\n".as_bytes(), 1),
            Err(DatabaseError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            parse_kmer_dump("ACGT\t1\nACG\t2\n".as_bytes(), 1),
            Err(DatabaseError::KmerLength { expected: 4, actual: 3 })
        ));
        assert!(matches!(
            parse_kmer_dump("ACGT\t1\nACNT\t2\n".as_bytes(), 1),
            Err(DatabaseError::Parse { line: 2, .. })
        ));
        assert!(matches!(
            parse_kmer_dump("ACGT\tx\n".as_bytes(), 1),
            Err(DatabaseError::Parse { line: 1, .. })
        ));
        assert!(parse_kmer_dump("".as_bytes(), 1).is_err());
    }

    #[test]
    fn test_read_dump_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(temp_file, "GATTACA\t4")?;
        writeln!(temp_file, "CATTAGA\t9")?;
        temp_file.flush()?;

        let db = read_kmer_dump(temp_file.path(), 3)?;
        assert_eq!(db.kmer_len(), 7);
        assert_eq!(db.num_files(), 8);
        assert_eq!(db.histogram().max_value(), 9);
        Ok(())
    }
}
