//! Bit-packed sequence of fixed-width unsigned integers.
//!
//! Value `i` occupies bits `[i * w, (i + 1) * w)` of a little-endian word
//! stream, so a value may straddle two words. A width of 0 stores nothing
//! and reads back zeros.
//!
//! Space: $n \cdot w$ bits plus at most one partially filled word.

use std::io::{Read, Write};

use crate::checksum::{self, Checksum, ChecksumReader, ChecksumWriter};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::header::{SectionHeader, SectionKind};
use crate::storage::{Backing, ByteCursor, WordBuffer};
use crate::vbyte;

/// Number of bits needed to represent `max`.
pub fn bits_needed(max: u64) -> u8 {
    (u64::BITS - max.leading_zeros()) as u8
}

/// A random-access array of `len` integers of `width` bits each.
#[derive(Clone, PartialEq, Eq)]
pub struct Sequence {
    words: WordBuffer,
    width: u8,
    len: usize,
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("len", &self.len)
            .field("width", &self.width)
            .field("mapped", &self.words.is_mapped())
            .finish()
    }
}

impl Sequence {
    /// Create an empty sequence of `width`-bit values.
    pub fn create(width: u8, capacity_hint: usize) -> Result<Self> {
        if width > 64 {
            return Err(Error::InvalidArgument(format!(
                "sequence width {width} exceeds 64 bits"
            )));
        }
        let words = (capacity_hint.saturating_mul(width as usize)).div_ceil(64);
        Ok(Self {
            words: WordBuffer::with_capacity(words),
            width,
            len: 0,
        })
    }

    /// Pack `values` with the smallest width that fits their maximum.
    pub fn from_values(values: &[u64]) -> Self {
        let width = bits_needed(values.iter().copied().max().unwrap_or(0));
        let mut words = vec![0u64; (values.len() * width as usize).div_ceil(64)];
        for (i, &value) in values.iter().enumerate() {
            write_bits(&mut words, i * width as usize, width, value);
        }
        Self {
            words: WordBuffer::Owned(words),
            width,
            len: values.len(),
        }
    }

    /// Bits per value.
    pub fn width(&self) -> u8 {
        self.width
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Return true if the sequence holds no values.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return true if the words are a view into a memory map.
    pub fn is_mapped(&self) -> bool {
        self.words.is_mapped()
    }

    /// Heap bytes used by the packed words.
    pub fn heap_bytes(&self) -> usize {
        self.words.heap_bytes()
    }

    /// Append `value`. Mapped sequences are `ReadOnly`.
    pub fn append(&mut self, value: u64) -> Result<()> {
        let words = self.words.words_mut()?;
        check_fits(value, self.width)?;
        let bit = self.len * self.width as usize;
        let needed = (bit + self.width as usize).div_ceil(64);
        if words.len() < needed {
            words.resize(needed, 0);
        }
        write_bits(words, bit, self.width, value);
        self.len += 1;
        Ok(())
    }

    /// Overwrite value `i`.
    pub fn set(&mut self, i: usize, value: u64) -> Result<()> {
        if i >= self.len {
            return Err(Error::out_of_range(i, self.len));
        }
        check_fits(value, self.width)?;
        let bit = i * self.width as usize;
        write_bits(self.words.words_mut()?, bit, self.width, value);
        Ok(())
    }

    /// Value `i`, or `OutOfRange`.
    pub fn get(&self, i: usize) -> Result<u64> {
        if i >= self.len {
            return Err(Error::out_of_range(i, self.len));
        }
        Ok(self.value(i))
    }

    /// Value at a position already known to be in range.
    #[inline]
    pub(crate) fn value(&self, i: usize) -> u64 {
        if self.width == 0 {
            return 0;
        }
        let bit = i * self.width as usize;
        let word_idx = bit / 64;
        let offset = bit % 64;
        let mut value = self.words.word(word_idx) >> offset;
        if offset + self.width as usize > 64 {
            value |= self.words.word(word_idx + 1) << (64 - offset);
        }
        value & mask(self.width)
    }

    /// Iterate over all values.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len).map(move |i| self.value(i))
    }

    /// Serialize with the default checksum.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.save_with(writer, Checksum::default())
    }

    /// Serialize as a sequence section with the given payload checksum.
    ///
    /// Format: width u8, vbyte count, then `ceil(len * width / 64)` words.
    pub fn save_with<W: Write>(&self, writer: &mut W, checksum: Checksum) -> Result<()> {
        SectionHeader::new(SectionKind::Sequence)
            .with_property("checksum", checksum)
            .write(writer)?;

        let mut out = ChecksumWriter::new(&mut *writer, checksum);
        out.write_all(&[self.width])?;
        vbyte::write(&mut out, self.len as u64)?;
        let words = self.words_in_use();
        for i in 0..words {
            let mut word = self.words.word(i);
            let used = self.len * self.width as usize - i * 64;
            if used < 64 {
                word &= (1u64 << used) - 1;
            }
            out.write_all(&word.to_le_bytes())?;
        }
        out.finish()?;
        Ok(())
    }

    fn words_in_use(&self) -> usize {
        (self.len * self.width as usize).div_ceil(64)
    }

    /// Serialize into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.save(&mut out)?;
        Ok(out)
    }

    /// Deserialize a `Sequence` from `to_bytes()` output.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(Backing::from_vec(bytes.to_vec()));
        let sequence = Self::read_section(&mut cursor, &Config::default())?;
        if !cursor.is_at_end() {
            return Err(Error::InvalidEncoding(
                "trailing bytes after sequence".to_string(),
            ));
        }
        Ok(sequence)
    }

    /// Read one sequence section from `reader`.
    pub fn load<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    pub(crate) fn read_section(cursor: &mut ByteCursor, config: &Config) -> Result<Self> {
        let header = SectionHeader::read(cursor, config.strict_checksums)?
            .require(SectionKind::Sequence)?;
        let mut input = ChecksumReader::new(&mut *cursor, header.checksum()?);

        let mut width = [0u8; 1];
        input.read_exact(&mut width)?;
        let width = width[0];
        if width > 64 {
            return Err(Error::InvalidEncoding(format!("sequence width {width}")));
        }
        let len = vbyte::read_usize(&mut input)?;
        let bits = len
            .checked_mul(width as usize)
            .ok_or_else(|| Error::InvalidEncoding(format!("sequence of {len} values")))?;

        let range = input.get_mut().take_range(bits.div_ceil(64) * 8)?;
        let backing = input.get_ref().backing().clone();
        input.fold(&backing[range.clone()]);
        let words = WordBuffer::from_backing(&backing, range, config.load_mode);

        let matched = input.verify()?;
        checksum::enforce(matched, "sequence", config.strict_checksums)?;

        Ok(Self { words, width, len })
    }
}

fn mask(width: u8) -> u64 {
    if width == 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn check_fits(value: u64, width: u8) -> Result<()> {
    if value & !mask(width) != 0 {
        return Err(Error::ValueTooLarge { value, width });
    }
    Ok(())
}

/// Write the low `width` bits of `value` at bit position `bit`.
fn write_bits(words: &mut [u64], bit: usize, width: u8, value: u64) {
    if width == 0 {
        return;
    }
    let low = mask(width);
    let width = width as usize;
    let word_idx = bit / 64;
    let offset = bit % 64;

    words[word_idx] &= !(low << offset);
    words[word_idx] |= value << offset;
    if offset + width > 64 {
        let spill = offset + width - 64;
        let high_mask = (1u64 << spill) - 1;
        words[word_idx + 1] &= !high_mask;
        words[word_idx + 1] |= value >> (64 - offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_needed() {
        assert_eq!(bits_needed(0), 0);
        assert_eq!(bits_needed(1), 1);
        assert_eq!(bits_needed(2), 2);
        assert_eq!(bits_needed(255), 8);
        assert_eq!(bits_needed(256), 9);
        assert_eq!(bits_needed(u64::MAX), 64);
    }

    #[test]
    fn test_append_get_across_word_boundary() {
        let mut seq = Sequence::create(13, 10).unwrap();
        let values: Vec<u64> = (0..40).map(|i| (i * 977) % 8192).collect();
        for &v in &values {
            seq.append(v).unwrap();
        }
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(seq.get(i).unwrap(), v);
        }
        assert!(matches!(seq.get(40), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn test_value_too_large() {
        let mut seq = Sequence::create(3, 0).unwrap();
        seq.append(7).unwrap();
        assert!(matches!(
            seq.append(8),
            Err(Error::ValueTooLarge { value: 8, width: 3 })
        ));
        assert!(matches!(seq.set(0, 9), Err(Error::ValueTooLarge { .. })));
        assert!(matches!(seq.set(1, 1), Err(Error::OutOfRange { .. })));
        assert!(matches!(
            Sequence::create(65, 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_set_preserves_neighbours() {
        let values: Vec<u64> = (0..23).map(|i| 5 + i % 3).collect();
        let mut seq = Sequence::from_values(&values);
        assert_eq!(seq.width(), 3);
        // value 21 starts at bit 63 and straddles two words
        seq.set(21, 0).unwrap();
        assert_eq!(seq.get(20).unwrap(), 7);
        assert_eq!(seq.get(21).unwrap(), 0);
        assert_eq!(seq.get(22).unwrap(), 6);
    }

    #[test]
    fn test_full_width_and_zero_width() {
        let seq = Sequence::from_values(&[u64::MAX, 0, 1 << 63]);
        assert_eq!(seq.width(), 64);
        assert_eq!(seq.iter().collect::<Vec<_>>(), vec![u64::MAX, 0, 1 << 63]);

        let zeros = Sequence::from_values(&[0, 0, 0]);
        assert_eq!(zeros.width(), 0);
        assert_eq!(zeros.len(), 3);
        assert_eq!(zeros.get(2).unwrap(), 0);
        assert_eq!(Sequence::from_bytes(&zeros.to_bytes().unwrap()).unwrap(), zeros);
    }

    #[test]
    fn test_round_trip_preserves_width_and_len() {
        let mut seq = Sequence::create(20, 0).unwrap();
        for v in [1u64, 1 << 19, 12345, 0] {
            seq.append(v).unwrap();
        }
        let bytes = seq.to_bytes().unwrap();
        let back = Sequence::from_bytes(&bytes).unwrap();
        assert_eq!(back.width(), 20);
        assert_eq!(back.len(), 4);
        assert_eq!(back, seq);
        assert_eq!(back.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_truncated_section() {
        let seq = Sequence::from_values(&[1, 2, 3, 4, 5]);
        let bytes = seq.to_bytes().unwrap();
        assert!(matches!(
            Sequence::from_bytes(&bytes[..bytes.len() - 5]),
            Err(Error::EndOfStream)
        ));
    }

    #[test]
    fn test_mapped_sequence_is_read_only() {
        use crate::config::LoadMode;
        use std::io::Write;

        // width 2, four values: the last word still has spare bits
        let seq = Sequence::from_values(&[1, 2, 3, 1]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        seq.save(&mut file).unwrap();
        file.flush().unwrap();

        let config = Config::default().with_load_mode(LoadMode::Mapped);
        let mut cursor = ByteCursor::new(Backing::map_file(file.path()).unwrap());
        let mut mapped = Sequence::read_section(&mut cursor, &config).unwrap();
        assert!(mapped.is_mapped());
        assert_eq!(mapped, seq);

        assert!(matches!(mapped.append(2), Err(Error::ReadOnly)));
        assert!(matches!(mapped.set(0, 2), Err(Error::ReadOnly)));
        assert_eq!(mapped.len(), 4);
        assert_eq!(mapped.iter().collect::<Vec<_>>(), vec![1, 2, 3, 1]);
    }
}
