//! Succinct bitmap with rank/select support.
//!
//! Implements the Rank9 indexing scheme over a separate directory so the raw
//! words can stay memory-mapped while the directory is always resident.
//!
//! # Layout
//!
//! Bits live in 64-bit words (bit `i` is bit `i % 64` of word `i / 64`). For
//! every 512-bit block the directory stores two words:
//! - Word 0: Absolute rank (number of 1s before this block)
//! - Word 1: Relative ranks (7 x 9-bit cumulative counts within the block)
//!
//! A sentinel entry after the last block holds the total. A sampled index
//! records the block of every 512th one-bit to narrow the select search.
//!
//! # Conventions
//!
//! Positions are 0-indexed. `rank1(i)` counts ones in `[0, i]`; `select1(k)`
//! takes a 1-indexed `k`, so `select1(rank1(i)) == i` whenever bit `i` is set.

use std::io::{Read, Write};

use crate::checksum::{self, Checksum, ChecksumReader, ChecksumWriter};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::header::{SectionHeader, SectionKind};
use crate::storage::{Backing, ByteCursor, WordBuffer};

const BLOCK_BITS: usize = 512;
const WORDS_PER_BLOCK: usize = BLOCK_BITS / 64;
const SELECT_SAMPLE: u64 = 512;

/// Largest bit count the u32 select samples can address.
pub const MAX_BITS: u64 = u32::MAX as u64 * BLOCK_BITS as u64;

/// A static bitmap with constant-time rank and near-constant-time select.
#[derive(Clone)]
pub struct Bitmap {
    words: WordBuffer,
    /// [abs_rank, rel_ranks] per block, plus a sentinel pair.
    directory: Vec<u64>,
    /// Block index for every 512th one-bit.
    select1_samples: Vec<u32>,
    len: usize,
    ones: usize,
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("len", &self.len)
            .field("ones", &self.ones)
            .field("mapped", &self.words.is_mapped())
            .finish()
    }
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
            && (0..self.words_in_use()).all(|i| self.data_word(i) == other.data_word(i))
    }
}

impl Eq for Bitmap {}

/// Incremental bitmap construction, one bit at a time.
#[derive(Debug, Default)]
pub struct BitmapBuilder {
    words: Vec<u64>,
    len: usize,
}

impl BitmapBuilder {
    /// Create a builder sized for roughly `capacity` bits.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            words: Vec::with_capacity(capacity.div_ceil(64)),
            len: 0,
        }
    }

    /// Append one bit.
    pub fn push(&mut self, bit: bool) -> Result<()> {
        if self.len as u64 >= MAX_BITS {
            return Err(Error::Construction(format!(
                "bitmap exceeds {MAX_BITS} bits"
            )));
        }
        if self.len % 64 == 0 {
            self.words.push(0);
        }
        if bit {
            if let Some(last) = self.words.last_mut() {
                *last |= 1u64 << (self.len % 64);
            }
        }
        self.len += 1;
        Ok(())
    }

    /// Number of bits pushed so far.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Return true if no bits were pushed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Freeze into a [`Bitmap`], building the rank/select directory.
    pub fn finish(self) -> Bitmap {
        Bitmap::with_words(WordBuffer::Owned(self.words), self.len)
    }
}

impl Bitmap {
    /// Build a bitmap from a stream of booleans, consumed exactly once.
    pub fn build<I: IntoIterator<Item = bool>>(bits: I) -> Result<Self> {
        let bits = bits.into_iter();
        let mut builder = BitmapBuilder::with_capacity(bits.size_hint().0);
        for bit in bits {
            builder.push(bit)?;
        }
        Ok(builder.finish())
    }

    /// Create a bitmap from packed words holding `len` bits.
    pub fn from_words(mut words: Vec<u64>, len: usize) -> Result<Self> {
        if len as u64 > MAX_BITS {
            return Err(Error::Construction(format!(
                "bitmap exceeds {MAX_BITS} bits"
            )));
        }
        let needed = len.div_ceil(64);
        if words.len() < needed {
            return Err(Error::Construction(format!(
                "{} words cannot hold {len} bits",
                words.len()
            )));
        }
        words.truncate(needed);
        Ok(Self::with_words(WordBuffer::Owned(words), len))
    }

    fn with_words(words: WordBuffer, len: usize) -> Self {
        let mut bitmap = Self {
            words,
            directory: Vec::new(),
            select1_samples: Vec::new(),
            len,
            ones: 0,
        };
        bitmap.index();
        bitmap
    }

    fn index(&mut self) {
        let num_blocks = self.len.div_ceil(BLOCK_BITS);
        let mut directory = Vec::with_capacity(num_blocks * 2 + 2);
        let mut select1_samples = Vec::new();

        let mut total_rank = 0u64;
        let mut next_select1_threshold = 0u64;

        for i in 0..num_blocks {
            directory.push(total_rank);
            while total_rank >= next_select1_threshold {
                select1_samples.push(i as u32);
                next_select1_threshold += SELECT_SAMPLE;
            }

            let mut relative_ranks = 0u64;
            let mut current_rel = 0u64;
            for j in 0..WORDS_PER_BLOCK {
                if j > 0 {
                    relative_ranks |= current_rel << (9 * (j - 1));
                }
                current_rel += self.data_word(i * WORDS_PER_BLOCK + j).count_ones() as u64;
            }
            directory.push(relative_ranks);
            total_rank += current_rel;
        }

        // Sentinel
        directory.push(total_rank);
        directory.push(0);
        while total_rank >= next_select1_threshold {
            select1_samples.push(num_blocks as u32);
            next_select1_threshold += SELECT_SAMPLE;
        }

        self.directory = directory;
        self.select1_samples = select1_samples;
        self.ones = total_rank as usize;
    }

    fn words_in_use(&self) -> usize {
        self.len.div_ceil(64)
    }

    /// Word `idx` with bits past `len` cleared; zero past the last word.
    #[inline]
    fn data_word(&self, idx: usize) -> u64 {
        if idx >= self.words_in_use() {
            return 0;
        }
        let word = self.words.word(idx);
        let used = self.len - idx * 64;
        if used >= 64 {
            word
        } else {
            word & ((1u64 << used) - 1)
        }
    }

    /// Total number of bits.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Alias of [`Bitmap::len`].
    pub fn num_bits(&self) -> usize {
        self.len
    }

    /// Return true if the bitmap has length 0.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.ones
    }

    /// Number of unset bits.
    pub fn count_zeros(&self) -> usize {
        self.len - self.ones
    }

    /// Return true if the words are a view into a memory map.
    pub fn is_mapped(&self) -> bool {
        self.words.is_mapped()
    }

    /// Approximate heap memory usage in bytes.
    pub fn heap_bytes(&self) -> usize {
        self.words.heap_bytes()
            + self.directory.capacity() * 8
            + self.select1_samples.capacity() * 4
    }

    /// Bit `i`, or `OutOfRange` if `i >= len()`.
    pub fn access(&self, i: usize) -> Result<bool> {
        if i >= self.len {
            return Err(Error::out_of_range(i, self.len));
        }
        Ok(self.bit(i))
    }

    /// Bit `i` for a position already known to be in range.
    #[inline]
    pub(crate) fn bit(&self, i: usize) -> bool {
        (self.words.word(i / 64) >> (i % 64)) & 1 == 1
    }

    /// Number of set bits in `[0, i)`; `i` is clamped to `len()`.
    pub fn rank1_before(&self, i: usize) -> usize {
        let i = i.min(self.len);
        let block_idx = i / BLOCK_BITS;
        let sub_block_idx = (i % BLOCK_BITS) / 64;
        let bit_offset = i % 64;

        let base = block_idx * 2;
        let mut rank = self.directory[base] as usize;

        if sub_block_idx > 0 {
            let relative_ranks = self.directory[base + 1];
            rank += ((relative_ranks >> (9 * (sub_block_idx - 1))) & 0x1FF) as usize;
        }

        if bit_offset > 0 {
            let word = self.data_word(block_idx * WORDS_PER_BLOCK + sub_block_idx);
            rank += (word & ((1u64 << bit_offset) - 1)).count_ones() as usize;
        }

        rank
    }

    /// Number of set bits in `[0, i]`; positions past the end count every bit.
    pub fn rank1(&self, i: usize) -> usize {
        self.rank1_before(i.saturating_add(1))
    }

    /// Number of unset bits in `[0, i]`.
    pub fn rank0(&self, i: usize) -> usize {
        i.saturating_add(1).min(self.len) - self.rank1(i)
    }

    /// Position of the `k`-th set bit, `k` counted from 1.
    pub fn select1(&self, k: usize) -> Result<usize> {
        if k == 0 || k > self.ones {
            return Err(Error::out_of_range(k, self.ones + 1));
        }

        let target = k as u64;
        let select_idx = (k - 1) / SELECT_SAMPLE as usize;
        let blocks = self.directory.len() / 2;
        let mut block_low = self.select1_samples[select_idx] as usize;
        let mut block_high = match self.select1_samples.get(select_idx + 1) {
            Some(&next) => (next as usize + 1).min(blocks),
            None => blocks,
        };

        while block_low < block_high {
            let mid = block_low + (block_high - block_low) / 2;
            if self.directory[mid * 2] < target {
                block_low = mid + 1;
            } else {
                block_high = mid;
            }
        }
        let block_idx = block_low - 1;
        let mut remaining = target - self.directory[block_idx * 2];

        let relative_ranks = self.directory[block_idx * 2 + 1];
        let mut sub_block_idx = 0;
        for j in 1..WORDS_PER_BLOCK {
            let rel_rank = (relative_ranks >> (9 * (j - 1))) & 0x1FF;
            if rel_rank < remaining {
                sub_block_idx = j;
            } else {
                break;
            }
        }

        if sub_block_idx > 0 {
            remaining -= (relative_ranks >> (9 * (sub_block_idx - 1))) & 0x1FF;
        }

        let word = self.data_word(block_idx * WORDS_PER_BLOCK + sub_block_idx);
        let pos_in_word = select_in_word(word, remaining as u32 - 1);
        Ok(block_idx * BLOCK_BITS + sub_block_idx * 64 + pos_in_word)
    }

    /// Serialize with the default checksum.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.save_with(writer, Checksum::default())
    }

    /// Serialize as a bitmap section with the given payload checksum.
    pub fn save_with<W: Write>(&self, writer: &mut W, checksum: Checksum) -> Result<()> {
        SectionHeader::new(SectionKind::Bitmap)
            .with_property("checksum", checksum)
            .write(writer)?;

        let mut out = ChecksumWriter::new(&mut *writer, checksum);
        out.write_all(&(self.len as u64).to_le_bytes())?;
        for i in 0..self.words_in_use() {
            out.write_all(&self.data_word(i).to_le_bytes())?;
        }
        out.finish()?;
        Ok(())
    }

    /// Serialize into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.save(&mut out)?;
        Ok(out)
    }

    /// Deserialize a `Bitmap` from `to_bytes()` output.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(Backing::from_vec(bytes.to_vec()));
        let bitmap = Self::read_section(&mut cursor, &Config::default())?;
        if !cursor.is_at_end() {
            return Err(Error::InvalidEncoding(
                "trailing bytes after bitmap".to_string(),
            ));
        }
        Ok(bitmap)
    }

    /// Read one bitmap section from `reader`.
    pub fn load<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    pub(crate) fn read_section(cursor: &mut ByteCursor, config: &Config) -> Result<Self> {
        let header = SectionHeader::read(cursor, config.strict_checksums)?
            .require(SectionKind::Bitmap)?;
        let mut input = ChecksumReader::new(&mut *cursor, header.checksum()?);

        let mut raw_len = [0u8; 8];
        input.read_exact(&mut raw_len)?;
        let len = u64::from_le_bytes(raw_len);
        if len > MAX_BITS {
            return Err(Error::InvalidEncoding(format!("bitmap of {len} bits")));
        }
        let len = usize::try_from(len)
            .map_err(|_| Error::InvalidEncoding(format!("bitmap of {len} bits")))?;

        let range = input.get_mut().take_range(len.div_ceil(64) * 8)?;
        let backing = input.get_ref().backing().clone();
        input.fold(&backing[range.clone()]);
        let words = WordBuffer::from_backing(&backing, range, config.load_mode);

        let matched = input.verify()?;
        checksum::enforce(matched, "bitmap", config.strict_checksums)?;

        Ok(Self::with_words(words, len))
    }
}

/// Position of the `k`-th (0-indexed) set bit of `word`.
#[inline]
fn select_in_word(word: u64, k: u32) -> usize {
    #[cfg(all(target_arch = "x86_64", target_feature = "bmi2"))]
    {
        // SAFETY: guarded by the bmi2 target feature.
        let res = unsafe { core::arch::x86_64::_pdep_u64(1u64 << k, word) };
        res.trailing_zeros() as usize
    }

    #[cfg(not(all(target_arch = "x86_64", target_feature = "bmi2")))]
    {
        let mut w = word;
        for _ in 0..k {
            w &= w - 1;
        }
        w.trailing_zeros() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_rank_basic() {
        let bm = Bitmap::from_words(vec![0b1011, 0b1101], 128).unwrap();
        assert_eq!(bm.rank1(0), 1);
        assert_eq!(bm.rank1(1), 2);
        assert_eq!(bm.rank1(3), 3);
        assert_eq!(bm.rank1_before(4), 3);
        assert_eq!(bm.rank0(2), 1);
        assert!(bm.access(0).unwrap());
        assert!(!bm.access(2).unwrap());
        assert_eq!(bm.count_ones(), 6);
        assert_eq!(bm.count_zeros(), 122);
    }

    #[test]
    fn test_bitmap_select_basic() {
        let bm = Bitmap::from_words(vec![0b1011], 64).unwrap();
        assert_eq!(bm.select1(1).unwrap(), 0);
        assert_eq!(bm.select1(2).unwrap(), 1);
        assert_eq!(bm.select1(3).unwrap(), 3);
        assert!(matches!(bm.select1(4), Err(Error::OutOfRange { .. })));
        assert!(matches!(bm.select1(0), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn test_access_out_of_range() {
        let bm = Bitmap::build([true, false]).unwrap();
        assert!(matches!(
            bm.access(2),
            Err(Error::OutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_build_matches_words() {
        let bits: Vec<bool> = (0..1500).map(|i| i % 3 == 0 || i % 7 == 0).collect();
        let bm = Bitmap::build(bits.iter().copied()).unwrap();
        assert_eq!(bm.len(), 1500);
        let mut ones = 0;
        for (i, &b) in bits.iter().enumerate() {
            assert_eq!(bm.access(i).unwrap(), b);
            if b {
                ones += 1;
                assert_eq!(bm.rank1(i), ones);
                assert_eq!(bm.select1(ones).unwrap(), i);
            }
        }
        assert_eq!(bm.count_ones(), ones);
    }

    #[test]
    fn test_dense_select_across_samples() {
        // Every bit set: select samples land on every block boundary.
        let bm = Bitmap::build(std::iter::repeat(true).take(4096)).unwrap();
        for k in [1, 511, 512, 513, 1024, 4095, 4096] {
            assert_eq!(bm.select1(k).unwrap(), k - 1);
        }
    }

    #[test]
    fn test_garbage_past_len_is_ignored() {
        let bm = Bitmap::from_words(vec![u64::MAX], 3).unwrap();
        assert_eq!(bm.count_ones(), 3);
        assert_eq!(bm.rank1(100), 3);
        assert_eq!(bm.to_bytes().unwrap(), Bitmap::build([true; 3]).unwrap().to_bytes().unwrap());
    }

    #[test]
    fn test_from_words_rejects_short_input() {
        assert!(matches!(
            Bitmap::from_words(vec![0], 65),
            Err(Error::Construction(_))
        ));
    }

    #[test]
    fn test_empty_bitmap() {
        let bm = Bitmap::build(std::iter::empty()).unwrap();
        assert!(bm.is_empty());
        assert_eq!(bm.rank1(0), 0);
        assert!(bm.select1(1).is_err());
        assert_eq!(Bitmap::from_bytes(&bm.to_bytes().unwrap()).unwrap(), bm);
    }

    #[test]
    fn test_round_trip_all_checksums() {
        let bm = Bitmap::build((0..777).map(|i| i % 5 == 1)).unwrap();
        for checksum in [Checksum::Crc8, Checksum::Crc16, Checksum::Crc32] {
            let mut buf = Vec::new();
            bm.save_with(&mut buf, checksum).unwrap();
            let back = Bitmap::from_bytes(&buf).unwrap();
            assert_eq!(back, bm);
            assert_eq!(back.select1(10).unwrap(), bm.select1(10).unwrap());
        }
    }

    #[test]
    fn test_corrupt_payload_and_trailing_bytes() {
        let bm = Bitmap::build((0..200).map(|i| i % 2 == 0)).unwrap();
        let mut bytes = bm.to_bytes().unwrap();
        let payload_byte = bytes.len() - 6;
        bytes[payload_byte] ^= 0x20;
        assert!(matches!(
            Bitmap::from_bytes(&bytes),
            Err(Error::ChecksumMismatch("bitmap"))
        ));

        let mut bytes = bm.to_bytes().unwrap();
        bytes.push(0);
        assert!(matches!(
            Bitmap::from_bytes(&bytes),
            Err(Error::InvalidEncoding(_))
        ));
    }
}
