//! Adjacency list: a sorted one-to-many mapping from keys `1..=K` to value lists.
//!
//! Values of successive keys are laid out contiguously in a [`Sequence`]. A
//! parallel [`Bitmap`] sets the bit of the *last* value of each key, so
//! key `k` owns positions `select1(k - 1) + 1 ..= select1(k)` (key 1 starts
//! at 0) and position `p` belongs to key `rank1_before(p) + 1`.
//!
//! ```text
//! key:      1     2  3
//! values: [4 7 9][2][1 8]
//! bitmap:  0 0 1  1  0 1
//! ```

use std::cmp::Ordering;
use std::io::Write;
use std::ops::Range;

use crate::bitmap::{Bitmap, BitmapBuilder};
use crate::checksum::Checksum;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::sequence::Sequence;
use crate::storage::ByteCursor;

/// Keyed value lists backed by one bitmap and one sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjacencyList {
    bitmap: Bitmap,
    sequence: Sequence,
}

impl AdjacencyList {
    /// Build from value groups in key order; group `i` becomes key `i + 1`.
    ///
    /// Ordering of values inside a group is the caller's responsibility.
    /// Empty groups cannot be represented and are rejected.
    pub fn build<I, G>(groups: I) -> Result<Self>
    where
        I: IntoIterator<Item = G>,
        G: IntoIterator<Item = u64>,
    {
        let mut bits = BitmapBuilder::default();
        let mut values = Vec::new();
        for (key, group) in groups.into_iter().enumerate() {
            let before = values.len();
            values.extend(group);
            if values.len() == before {
                return Err(Error::Construction(format!(
                    "key {} has no values",
                    key + 1
                )));
            }
            for _ in before..values.len() - 1 {
                bits.push(false)?;
            }
            bits.push(true)?;
        }
        Ok(Self {
            bitmap: bits.finish(),
            sequence: Sequence::from_values(&values),
        })
    }

    /// Pair an existing bitmap and sequence.
    pub fn from_parts(bitmap: Bitmap, sequence: Sequence) -> Result<Self> {
        if bitmap.len() != sequence.len() {
            return Err(Error::Construction(format!(
                "bitmap has {} bits but sequence has {} values",
                bitmap.len(),
                sequence.len()
            )));
        }
        if !bitmap.is_empty() && !bitmap.bit(bitmap.len() - 1) {
            return Err(Error::Construction(
                "last value is not terminated by a set bit".to_string(),
            ));
        }
        Ok(Self { bitmap, sequence })
    }

    /// Boundary bitmap.
    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// Value sequence.
    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    /// Number of keys.
    pub fn num_keys(&self) -> usize {
        self.bitmap.count_ones()
    }

    /// Total number of values.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Return true if there are no values.
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Heap bytes of both parts.
    pub fn heap_bytes(&self) -> usize {
        self.bitmap.heap_bytes() + self.sequence.heap_bytes()
    }

    /// Half-open position range of `key`'s values.
    pub fn range(&self, key: usize) -> Result<Range<usize>> {
        if key == 0 || key > self.num_keys() {
            return Err(Error::out_of_range(key, self.num_keys() + 1));
        }
        Ok(self.key_range(key))
    }

    /// Range of a key already known to be in `1..=num_keys()`.
    #[inline]
    pub(crate) fn key_range(&self, key: usize) -> Range<usize> {
        let begin = match key {
            1 => 0,
            _ => self.select(key - 1) + 1,
        };
        begin..self.select(key) + 1
    }

    #[inline]
    fn select(&self, k: usize) -> usize {
        // k is within 1..=num_keys() for every caller.
        self.bitmap.select1(k).unwrap_or(self.bitmap.len())
    }

    /// Value at `pos`.
    pub fn value_at(&self, pos: usize) -> Result<u64> {
        self.sequence.get(pos)
    }

    #[inline]
    pub(crate) fn value(&self, pos: usize) -> u64 {
        self.sequence.value(pos)
    }

    /// Return true if `pos` holds the last value of its key.
    #[inline]
    pub(crate) fn is_last(&self, pos: usize) -> bool {
        self.bitmap.bit(pos)
    }

    /// Key owning position `pos`.
    pub fn key_of(&self, pos: usize) -> Result<usize> {
        if pos >= self.len() {
            return Err(Error::out_of_range(pos, self.len()));
        }
        Ok(self.key_at(pos))
    }

    #[inline]
    pub(crate) fn key_at(&self, pos: usize) -> usize {
        self.bitmap.rank1_before(pos) + 1
    }

    /// Position of `value` within `key`'s list, found by binary search.
    pub fn search(&self, key: usize, value: u64) -> Result<Option<usize>> {
        let range = self.range(key)?;
        let pos = self.lower_bound(range.clone(), value);
        Ok((pos < range.end && self.value(pos) == value).then_some(pos))
    }

    /// First position in `range` whose value is not less than `value`.
    pub(crate) fn lower_bound(&self, range: Range<usize>, value: u64) -> usize {
        let mut low = range.start;
        let mut high = range.end;
        while low < high {
            let mid = low + (high - low) / 2;
            match self.value(mid).cmp(&value) {
                Ordering::Less => low = mid + 1,
                Ordering::Equal | Ordering::Greater => high = mid,
            }
        }
        low
    }

    /// Iterate over `(key, value)` pairs in layout order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        let mut key = 1;
        (0..self.len()).map(move |pos| {
            let current = key;
            if self.is_last(pos) {
                key += 1;
            }
            (current, self.value(pos))
        })
    }

    /// Serialize the bitmap section followed by the sequence section.
    pub fn save_with<W: Write>(&self, writer: &mut W, checksum: Checksum) -> Result<()> {
        self.bitmap.save_with(writer, checksum)?;
        self.sequence.save_with(writer, checksum)
    }

    pub(crate) fn read_section(cursor: &mut ByteCursor, config: &Config) -> Result<Self> {
        let bitmap = Bitmap::read_section(cursor, config)?;
        let sequence = Sequence::read_section(cursor, config)?;
        Self::from_parts(bitmap, sequence)
            .map_err(|err| Error::InvalidEncoding(format!("adjacency list: {err}")))
    }
}
