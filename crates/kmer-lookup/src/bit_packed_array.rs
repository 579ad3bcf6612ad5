//! Segmented array of fixed-width packed integers
//!
//! [`BitPackedArray`] stores values of any width from 1 to 128 bits packed
//! back to back inside 128-bit words. Storage is split into fixed-size
//! segments that are allocated lazily, so the array can grow to billions of
//! entries without a single huge reallocation.
//!
//! Layout: value `j` of a segment occupies bits `[j*W, (j+1)*W)` of the
//! segment, counted from the most significant bit of the first word. A value
//! whose field crosses a word boundary keeps its high part at the bottom of
//! word `w` and its low part at the top of word `w + 1`. Values never cross a
//! segment boundary.
//!
//! Writes go through `&self`: each 128-bit word is held as two `AtomicU64`
//! halves, and when locking is enabled every group of
//! [`WORDS_PER_LOCK`] words is guarded by a spin flag. That makes
//! [`BitPackedArray::set`] safe to call from many threads at once for
//! distinct indices, even when their fields share a word.

use crate::constants::{low_mask, WORDS_PER_LOCK, WORD_BITS};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// One allocation unit of the array
struct Segment {
    /// Two `u64` halves per 128-bit word: `[2w]` low, `[2w + 1]` high
    halves: Box<[AtomicU64]>,
    /// One flag per lock domain; empty when locking is disabled
    locks: Box<[AtomicBool]>,
}

impl Segment {
    fn new(words: usize, locks: usize) -> Self {
        Self {
            halves: alloc_atomics(2 * words, AtomicU64::default),
            locks: alloc_atomics(locks, AtomicBool::default),
        }
    }

    #[inline]
    fn load_word(&self, w: usize) -> u128 {
        let lo = self.halves[2 * w].load(Ordering::Relaxed) as u128;
        let hi = self.halves[2 * w + 1].load(Ordering::Relaxed) as u128;
        (hi << 64) | lo
    }

    #[inline]
    fn store_word(&self, w: usize, word: u128) {
        self.halves[2 * w].store(word as u64, Ordering::Relaxed);
        self.halves[2 * w + 1].store((word >> 64) as u64, Ordering::Relaxed);
    }

    fn fill(&self, fill_byte: u8) {
        let pattern = u64::from_ne_bytes([fill_byte; 8]);
        for half in self.halves.iter() {
            half.store(pattern, Ordering::Relaxed);
        }
    }
}

/// Allocate a boxed slice of atomics, aborting with the requested size on failure.
fn alloc_atomics<T>(len: usize, init: fn() -> T) -> Box<[T]> {
    let mut v: Vec<T> = Vec::new();
    if v.try_reserve_exact(len).is_err() {
        panic!(
            "BitPackedArray: failed to allocate {} bytes for a segment",
            len * std::mem::size_of::<T>()
        );
    }
    v.resize_with(len, init);
    v.into_boxed_slice()
}

/// Held lock domain; released on drop
struct DomainGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DomainGuard<'a> {
    #[inline]
    fn acquire(flag: &'a AtomicBool) -> Self {
        while flag
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while flag.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            }
        }
        Self { flag }
    }
}

impl Drop for DomainGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Position of a value inside the segmented storage
#[derive(Clone, Copy, Debug)]
struct Slot {
    segment: usize,
    word: usize,
    bit_offset: usize,
}

/// Segmented, optionally lock-protected array of `W`-bit unsigned values
pub struct BitPackedArray {
    value_width: usize,
    value_mask: u128,
    segment_bits: usize,
    values_per_segment: usize,
    words_per_segment: usize,
    locks_per_segment: usize,
    use_locks: bool,
    num_values_allocated: u64,
    valid_data: AtomicU64,
    segments: Vec<Segment>,
}

impl BitPackedArray {
    /// Create an empty array of `value_width`-bit values.
    ///
    /// `segment_bits` is rounded up to a whole number of 128-bit words.
    ///
    /// # Panics
    /// Panics if `value_width` is not in `1..=128` or if a segment cannot hold
    /// a single value. A malformed table must never be built.
    pub fn new(value_width: usize, segment_bits: usize, use_locks: bool) -> Self {
        assert!(
            value_width > 0 && value_width <= WORD_BITS,
            "BitPackedArray: invalid value width {} (must be 1..=128)",
            value_width
        );
        let words_per_segment = segment_bits.div_ceil(WORD_BITS);
        let segment_bits = words_per_segment * WORD_BITS;
        assert!(
            segment_bits >= value_width,
            "BitPackedArray: segment of {} bits cannot hold a {}-bit value",
            segment_bits,
            value_width
        );
        let locks_per_segment = if use_locks {
            words_per_segment.div_ceil(WORDS_PER_LOCK)
        } else {
            0
        };

        Self {
            value_width,
            value_mask: low_mask(value_width),
            segment_bits,
            values_per_segment: segment_bits / value_width,
            words_per_segment,
            locks_per_segment,
            use_locks,
            num_values_allocated: 0,
            valid_data: AtomicU64::new(0),
            segments: Vec::new(),
        }
    }

    /// Ensure storage exists for indices `0..num_elements`.
    ///
    /// Only missing segments are allocated; existing segments (and the values
    /// in them) are never touched, so calling this again with the same or a
    /// smaller size is a no-op.
    pub fn allocate(&mut self, num_elements: u64) {
        let needed = (num_elements / self.values_per_segment as u64) as usize + 1;
        if needed <= self.segments.len() {
            return;
        }
        if self.segments.try_reserve_exact(needed - self.segments.len()).is_err() {
            panic!(
                "BitPackedArray: failed to grow segment table to {} segments ({} values)",
                needed, num_elements
            );
        }
        while self.segments.len() < needed {
            self.segments
                .push(Segment::new(self.words_per_segment, self.locks_per_segment));
        }
        self.num_values_allocated = self.segments.len() as u64 * self.values_per_segment as u64;
    }

    /// Allocate storage for `num_elements`, fill every segment with
    /// `fill_byte` and mark the first `num_elements` values as valid.
    pub fn erase(&mut self, fill_byte: u8, num_elements: u64) {
        self.allocate(num_elements);
        for segment in &self.segments {
            segment.fill(fill_byte);
        }
        self.valid_data.store(num_elements, Ordering::Release);
    }

    #[inline]
    fn slot(&self, index: u64) -> Slot {
        let segment = (index / self.values_per_segment as u64) as usize;
        let local = (index % self.values_per_segment as u64) as usize;
        let bit = local * self.value_width;
        Slot {
            segment,
            word: bit / WORD_BITS,
            bit_offset: bit % WORD_BITS,
        }
    }

    /// Read the value at `index`.
    ///
    /// # Panics
    /// Panics if `index` is not below [`len`](Self::len).
    #[inline]
    pub fn get(&self, index: u64) -> u128 {
        let valid = self.valid_data.load(Ordering::Acquire);
        assert!(
            index < valid,
            "BitPackedArray::get: index {} out of bounds (valid {}, width {})",
            index,
            valid,
            self.value_width
        );
        let slot = self.slot(index);
        let segment = &self.segments[slot.segment];
        let width = self.value_width;

        if slot.bit_offset + width <= WORD_BITS {
            let shift = WORD_BITS - slot.bit_offset - width;
            (segment.load_word(slot.word) >> shift) & self.value_mask
        } else {
            let hi_bits = WORD_BITS - slot.bit_offset;
            let lo_bits = width - hi_bits;
            let hi = segment.load_word(slot.word) & low_mask(hi_bits);
            let lo = segment.load_word(slot.word + 1) >> (WORD_BITS - lo_bits);
            (hi << lo_bits) | lo
        }
    }

    /// Write `value` at `index`, preserving every neighbouring field.
    ///
    /// With locking enabled the lock domain(s) covering the touched word(s)
    /// are held for the read-modify-write, so concurrent writers of distinct
    /// indices never lose each other's bits.
    ///
    /// # Panics
    /// Panics if `index` is beyond the allocated storage or if `value` does
    /// not fit in the value width.
    #[inline]
    pub fn set(&self, index: u64, value: u128) {
        assert!(
            index < self.num_values_allocated,
            "BitPackedArray::set: index {} out of bounds (allocated {}, width {})",
            index,
            self.num_values_allocated,
            self.value_width
        );
        assert!(
            value & !self.value_mask == 0,
            "BitPackedArray::set: value {:#x} does not fit in {} bits",
            value,
            self.value_width
        );
        let slot = self.slot(index);
        let segment = &self.segments[slot.segment];
        let width = self.value_width;
        let straddles = slot.bit_offset + width > WORD_BITS;

        let (_first, _second) = if self.use_locks {
            let a = slot.word / WORDS_PER_LOCK;
            let b = if straddles { (slot.word + 1) / WORDS_PER_LOCK } else { a };
            let first = DomainGuard::acquire(&segment.locks[a]);
            let second = (b != a).then(|| DomainGuard::acquire(&segment.locks[b]));
            (Some(first), second)
        } else {
            (None, None)
        };

        if !straddles {
            let shift = WORD_BITS - slot.bit_offset - width;
            let mask = self.value_mask << shift;
            let word = segment.load_word(slot.word);
            segment.store_word(slot.word, (word & !mask) | (value << shift));
        } else {
            let hi_bits = WORD_BITS - slot.bit_offset;
            let lo_bits = width - hi_bits;

            let word = segment.load_word(slot.word);
            segment.store_word(slot.word, (word & !low_mask(hi_bits)) | (value >> lo_bits));

            let shift = WORD_BITS - lo_bits;
            let mask = low_mask(lo_bits) << shift;
            let word = segment.load_word(slot.word + 1);
            segment.store_word(
                slot.word + 1,
                (word & !mask) | ((value & low_mask(lo_bits)) << shift),
            );
        }

        self.valid_data.fetch_max(index + 1, Ordering::AcqRel);
    }

    /// Width of each value in bits
    #[inline]
    pub fn value_width(&self) -> usize {
        self.value_width
    }

    /// Segment size in bits (rounded to whole words)
    #[inline]
    pub fn segment_bits(&self) -> usize {
        self.segment_bits
    }

    /// Number of values stored per segment
    #[inline]
    pub fn values_per_segment(&self) -> usize {
        self.values_per_segment
    }

    /// Number of values storage has been allocated for
    #[inline]
    pub fn num_values_allocated(&self) -> u64 {
        self.num_values_allocated
    }

    /// Number of segments allocated so far
    #[inline]
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Whether writes are guarded by lock domains
    #[inline]
    pub fn uses_locks(&self) -> bool {
        self.use_locks
    }

    /// Number of valid values (one past the highest index written or erased)
    #[inline]
    pub fn len(&self) -> u64 {
        self.valid_data.load(Ordering::Acquire)
    }

    /// Whether no value is valid yet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated footprint in bits, including lock flags
    pub fn num_bits(&self) -> u64 {
        let per_segment = self.words_per_segment as u64 * WORD_BITS as u64
            + self.locks_per_segment as u64 * 8;
        self.segments.len() as u64 * per_segment
    }

    /// Allocated footprint in bytes
    pub fn num_bytes(&self) -> u64 {
        self.num_bits() / 8
    }
}

impl std::fmt::Debug for BitPackedArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitPackedArray")
            .field("value_width", &self.value_width)
            .field("segment_bits", &self.segment_bits)
            .field("segments", &self.segments.len())
            .field("len", &self.len())
            .field("use_locks", &self.use_locks)
            .finish()
    }
}
