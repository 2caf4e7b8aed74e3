//! Backing bytes and word buffers.
//!
//! Persisted structures are parsed from a [`Backing`]: either heap bytes or a
//! read-only memory map. Word arrays are then materialized as a
//! [`WordBuffer`], which either owns its words or stays a view into the
//! backing, depending on the configured [`LoadMode`]. Views keep the backing
//! alive through an `Arc`, so a mapping is released when the last structure
//! referencing it is dropped.

use std::fs::File;
use std::io::{self, Read};
use std::ops::{Deref, Range};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::config::LoadMode;
use crate::error::{Error, Result};

/// Shared, immutable bytes a structure is parsed from.
#[derive(Clone)]
pub enum Backing {
    /// Bytes resident on the heap.
    Heap(Arc<[u8]>),
    /// A read-only memory map.
    Mapped(Arc<Mmap>),
}

impl Backing {
    /// Wrap heap bytes.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Backing::Heap(bytes.into())
    }

    /// Read a whole file onto the heap.
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_vec(std::fs::read(path)?))
    }

    /// Memory-map a file.
    ///
    /// The file must not be modified while any structure built from the
    /// mapping is alive.
    pub fn map_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and the caller owns the file for
        // the lifetime of the index.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Backing::Mapped(Arc::new(mmap)))
    }

    /// Open `path` according to `mode`.
    pub fn open<P: AsRef<Path>>(path: P, mode: LoadMode) -> Result<Self> {
        match mode {
            LoadMode::Loaded => Self::read_file(path),
            LoadMode::Mapped => Self::map_file(path),
        }
    }

    /// Return true for a memory-mapped backing.
    pub fn is_mapped(&self) -> bool {
        matches!(self, Backing::Mapped(_))
    }
}

impl Deref for Backing {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Backing::Heap(bytes) => bytes,
            Backing::Mapped(map) => map,
        }
    }
}

impl std::fmt::Debug for Backing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_mapped() { "Mapped" } else { "Heap" };
        f.debug_struct("Backing")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

/// Sequential reader over a [`Backing`].
pub(crate) struct ByteCursor {
    backing: Backing,
    pos: usize,
}

impl ByteCursor {
    pub(crate) fn new(backing: Backing) -> Self {
        Self { backing, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.pos >= self.backing.len()
    }

    pub(crate) fn backing(&self) -> &Backing {
        &self.backing
    }

    /// Consume `n` bytes and return their range in the backing.
    pub(crate) fn take_range(&mut self, n: usize) -> Result<Range<usize>> {
        let end = self.pos.checked_add(n).ok_or(Error::EndOfStream)?;
        if end > self.backing.len() {
            return Err(Error::EndOfStream);
        }
        let range = self.pos..end;
        self.pos = end;
        Ok(range)
    }
}

impl Read for ByteCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = &self.backing[self.pos.min(self.backing.len())..];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// Read the little-endian word at byte offset `at`.
#[inline]
fn read_word(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

/// Fixed-width 64-bit words, owned or viewed through a backing.
#[derive(Clone)]
pub enum WordBuffer {
    /// Words resident on the heap.
    Owned(Vec<u64>),
    /// Little-endian words inside a backing, starting at byte `offset`.
    Mapped {
        /// The backing bytes.
        backing: Backing,
        /// Byte offset of the first word.
        offset: usize,
        /// Number of words.
        len: usize,
    },
}

impl Default for WordBuffer {
    fn default() -> Self {
        WordBuffer::Owned(Vec::new())
    }
}

impl WordBuffer {
    /// Empty owned buffer with room for `capacity` words.
    pub fn with_capacity(capacity: usize) -> Self {
        WordBuffer::Owned(Vec::with_capacity(capacity))
    }

    /// Words stored at `range` of `backing`, copied or viewed per `mode`.
    pub(crate) fn from_backing(backing: &Backing, range: Range<usize>, mode: LoadMode) -> Self {
        let len = range.len() / 8;
        match mode {
            LoadMode::Loaded => {
                let bytes = &backing[range];
                WordBuffer::Owned((0..len).map(|i| read_word(bytes, i * 8)).collect())
            }
            LoadMode::Mapped => WordBuffer::Mapped {
                backing: backing.clone(),
                offset: range.start,
                len,
            },
        }
    }

    /// Number of words.
    pub fn len(&self) -> usize {
        match self {
            WordBuffer::Owned(words) => words.len(),
            WordBuffer::Mapped { len, .. } => *len,
        }
    }

    /// Return true if there are no words.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Word at `i`. Panics if `i >= len()`; callers check bounds once.
    #[inline]
    pub fn word(&self, i: usize) -> u64 {
        match self {
            WordBuffer::Owned(words) => words[i],
            WordBuffer::Mapped {
                backing,
                offset,
                len,
            } => {
                assert!(i < *len, "word {i} out of {len}");
                read_word(backing, offset + i * 8)
            }
        }
    }

    /// Mutable owned words; a view into a backing is `ReadOnly`.
    pub fn words_mut(&mut self) -> Result<&mut Vec<u64>> {
        match self {
            WordBuffer::Owned(words) => Ok(words),
            WordBuffer::Mapped { .. } => Err(Error::ReadOnly),
        }
    }

    /// Return true for a view into a memory map.
    pub fn is_mapped(&self) -> bool {
        matches!(
            self,
            WordBuffer::Mapped {
                backing: Backing::Mapped(_),
                ..
            }
        )
    }

    /// Heap bytes held by this buffer.
    pub fn heap_bytes(&self) -> usize {
        match self {
            WordBuffer::Owned(words) => words.capacity() * 8,
            WordBuffer::Mapped { .. } => 0,
        }
    }
}

impl PartialEq for WordBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && (0..self.len()).all(|i| self.word(i) == other.word(i))
    }
}

impl Eq for WordBuffer {}

impl std::fmt::Debug for WordBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordBuffer")
            .field("len", &self.len())
            .field("mapped", &matches!(self, WordBuffer::Mapped { .. }))
            .finish()
    }
}
