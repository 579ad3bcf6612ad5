use kmer_lookup::constants::low_mask;
use kmer_lookup::encoding::{canonical, decode_kmer, encode_kmer, reverse_complement};
use kmer_lookup::{BitPackedArray, ExactLookup, LookupConfig, MemoryDatabase};
use proptest::prelude::*;
use std::collections::BTreeMap;

proptest! {
    // Every width, including values straddling two words and segment ends.
    #[test]
    fn prop_bit_packed_round_trip(
        width in 1usize..=128,
        segment_words in 1usize..=4,
        seeds in prop::collection::vec(any::<u128>(), 1..300),
    ) {
        let mut array = BitPackedArray::new(width, segment_words * 128, false);
        array.allocate(seeds.len() as u64);
        let mask = low_mask(width);
        for (i, &s) in seeds.iter().enumerate() {
            array.set(i as u64, s & mask);
        }
        for (i, &s) in seeds.iter().enumerate() {
            prop_assert_eq!(array.get(i as u64), s & mask);
        }
    }

    #[test]
    fn prop_lookup_is_exact(
        k in 1usize..=24,
        file_bits in 0usize..=3,
        kmers in prop::collection::vec((any::<u64>(), 1u64..=50), 0..400),
        probes in prop::collection::vec(any::<u64>(), 0..50),
    ) {
        let mask = low_mask(2 * k);
        let kmers: Vec<(u128, u64)> = kmers.into_iter().map(|(key, v)| (key as u128 & mask, v)).collect();
        let db = MemoryDatabase::from_kmers(k, file_bits, kmers).unwrap();
        let config = LookupConfig {
            num_threads: 2,
            segment_bits: 1 << 16,
            ..LookupConfig::default()
        };
        let lookup = ExactLookup::load(&db, &config).unwrap();

        let stored: BTreeMap<u128, u64> = db.iter().collect();
        prop_assert_eq!(lookup.num_index(), stored.len() as u64);
        for (&key, &value) in &stored {
            prop_assert_eq!(lookup.value(key), value);
        }
        for probe in probes {
            let probe = probe as u128 & mask;
            prop_assert_eq!(lookup.exists_with_value(probe), stored.get(&probe).copied());
        }
    }

    #[test]
    fn prop_value_range_filter(
        kmers in prop::collection::vec((any::<u32>(), 1u64..=20), 1..300),
        min in 1u64..=10,
        span in 0u64..=10,
    ) {
        let max = min + span;
        let kmers: Vec<(u128, u64)> = kmers.into_iter().map(|(key, v)| (key as u128, v)).collect();
        let db = MemoryDatabase::from_kmers(16, 2, kmers).unwrap();
        let config = LookupConfig {
            min_value: min,
            max_value: Some(max),
            num_threads: 2,
            segment_bits: 1 << 16,
            ..LookupConfig::default()
        };
        let lookup = ExactLookup::load(&db, &config).unwrap();
        for (key, value) in db.iter() {
            let expected = (min..=max).contains(&value).then_some(value);
            prop_assert_eq!(lookup.exists_with_value(key), expected);
        }
    }

    #[test]
    fn prop_encoding_round_trip(seq in prop::collection::vec(prop::sample::select(b"ACGT".to_vec()), 1..=64)) {
        let k = seq.len();
        let key = encode_kmer(&seq).unwrap();
        prop_assert_eq!(decode_kmer(key, k).into_bytes(), seq);
        prop_assert_eq!(reverse_complement(reverse_complement(key, k), k), key);
        prop_assert!(canonical(key, k) <= key);
    }
}
