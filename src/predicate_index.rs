//! Predicate index: the y occurrences of a [`BitmapTriples`] grouped by y.
//!
//! Key `p` lists, in ascending order, every position of the subjects
//! sequence that holds `p`. A pattern binding the predicate but not the
//! subject then visits only those positions instead of scanning.
//!
//! Because positions are ascending and the subjects sequence is laid out by
//! subject, walking `occurrences(p)` visits subjects in ascending order and
//! keeps results in layout order.

use std::io::{Read, Write};
use std::ops::Range;
use std::time::Instant;

use log::debug;

use crate::adjacency::AdjacencyList;
use crate::bitmap::BitmapBuilder;
use crate::checksum::Checksum;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::header::{SectionHeader, SectionKind};
use crate::sequence::Sequence;
use crate::storage::{Backing, ByteCursor};
use crate::triples::BitmapTriples;

/// Transposed view of the middle component of a [`BitmapTriples`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateIndex {
    positions: AdjacencyList,
}

impl PredicateIndex {
    /// Build by counting sort over the y occurrences of `triples`.
    ///
    /// Fails with `Construction` if some id in `1..=max_y` never occurs.
    pub fn build_from(triples: &BitmapTriples) -> Result<Self> {
        let timer = Instant::now();
        let subjects = triples.subjects();
        let predicates = usize::try_from(triples.max_y())
            .map_err(|_| Error::Construction("too many predicates".to_string()))?;
        if predicates > subjects.len() {
            return Err(Error::Construction(format!(
                "{predicates} predicates cannot all occur in {} y occurrences",
                subjects.len()
            )));
        }

        let mut counts = vec![0usize; predicates + 1];
        for pos in 0..subjects.len() {
            let p = subjects.value(pos);
            match counts.get_mut(p as usize) {
                Some(count) if p != 0 => *count += 1,
                _ => {
                    return Err(Error::Construction(format!(
                        "predicate {p} at position {pos} is outside 1..={predicates}"
                    )))
                }
            }
        }
        if let Some(missing) = (1..=predicates).find(|&p| counts[p] == 0) {
            return Err(Error::Construction(format!(
                "predicate {missing} has no occurrences"
            )));
        }

        let mut offsets = Vec::with_capacity(predicates + 1);
        let mut running = 0;
        for &count in &counts[1..] {
            offsets.push(running);
            running += count;
        }

        let mut slots = vec![0u64; subjects.len()];
        for pos in 0..subjects.len() {
            let p = subjects.value(pos) as usize;
            slots[offsets[p - 1]] = pos as u64;
            offsets[p - 1] += 1;
        }

        let mut bits = BitmapBuilder::with_capacity(slots.len());
        for &count in &counts[1..] {
            for _ in 1..count {
                bits.push(false)?;
            }
            bits.push(true)?;
        }

        let positions = AdjacencyList::from_parts(bits.finish(), Sequence::from_values(&slots))?;
        debug!(
            "built predicate index over {predicates} predicates ({} entries) in {:?}",
            positions.len(),
            timer.elapsed()
        );
        Ok(Self { positions })
    }

    /// Number of indexed predicates.
    pub fn num_predicates(&self) -> usize {
        self.positions.num_keys()
    }

    /// Number of indexed occurrences.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Return true if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Heap bytes of the index.
    pub fn heap_bytes(&self) -> usize {
        self.positions.heap_bytes()
    }

    /// Slot range of `predicate`; resolve slots with [`Self::position`].
    pub fn occurrences(&self, predicate: u64) -> Result<Range<usize>> {
        self.positions
            .range(usize::try_from(predicate).unwrap_or(usize::MAX))
    }

    /// Subjects-sequence position stored in `slot`.
    pub fn position(&self, slot: usize) -> Result<usize> {
        Ok(self.positions.value_at(slot)? as usize)
    }

    #[inline]
    pub(crate) fn key_range(&self, predicate: u64) -> Range<usize> {
        self.positions.key_range(predicate as usize)
    }

    #[inline]
    pub(crate) fn slot(&self, slot: usize) -> usize {
        self.positions.value(slot) as usize
    }

    /// Reject an index that was built for different triples.
    pub(crate) fn check_compatible(&self, triples: &BitmapTriples) -> Result<()> {
        let subjects = triples.subjects();
        if self.num_predicates() as u64 != triples.max_y() || self.len() != subjects.len() {
            return Err(Error::InvalidArgument(format!(
                "predicate index covers {} predicates and {} occurrences, triples have {} and {}",
                self.num_predicates(),
                self.len(),
                triples.max_y(),
                subjects.len()
            )));
        }
        let stale = self.positions.iter().find(|&(predicate, pos)| {
            pos as usize >= subjects.len() || subjects.value(pos as usize) != predicate as u64
        });
        if let Some((predicate, pos)) = stale {
            return Err(Error::InvalidArgument(format!(
                "predicate index maps {predicate} to position {pos}, which holds another id"
            )));
        }
        Ok(())
    }

    /// Serialize with the default checksum.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.save_with(writer, Checksum::default())
    }

    /// Serialize the index section.
    pub fn save_with<W: Write>(&self, writer: &mut W, checksum: Checksum) -> Result<()> {
        SectionHeader::new(SectionKind::PredicateIndex)
            .with_property("predicates", self.num_predicates())
            .with_property("entries", self.len())
            .write(writer)?;
        self.positions.save_with(writer, checksum)
    }

    /// Serialize into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.save(&mut out)?;
        Ok(out)
    }

    /// Deserialize from `to_bytes()` output.
    pub fn from_bytes(bytes: &[u8], config: &Config) -> Result<Self> {
        Self::from_backing(Backing::from_vec(bytes.to_vec()), config)
    }

    /// Read a whole index section from `reader`.
    pub fn load<R: Read>(reader: &mut R, config: &Config) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_backing(Backing::from_vec(bytes), config)
    }

    /// Parse an index section occupying all of `backing`.
    pub fn from_backing(backing: Backing, config: &Config) -> Result<Self> {
        let mut cursor = ByteCursor::new(backing);
        let header = SectionHeader::read(&mut cursor, config.strict_checksums)?
            .require(SectionKind::PredicateIndex)?;
        let predicates: usize = header.parse("predicates")?;
        let entries: usize = header.parse("entries")?;

        let positions = AdjacencyList::read_section(&mut cursor, config)?;
        if !cursor.is_at_end() {
            return Err(Error::InvalidEncoding(
                "trailing bytes after predicate index".to_string(),
            ));
        }
        if positions.num_keys() != predicates || positions.len() != entries {
            return Err(Error::InvalidEncoding(format!(
                "predicate index header announces {predicates}/{entries}, found {}/{}",
                positions.num_keys(),
                positions.len()
            )));
        }
        Ok(Self { positions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triples::TripleId;

    fn triples() -> BitmapTriples {
        let triples = [
            TripleId::new(1, 1, 1),
            TripleId::new(1, 3, 2),
            TripleId::new(2, 2, 1),
            TripleId::new(2, 3, 1),
            TripleId::new(3, 1, 4),
        ];
        BitmapTriples::build(triples, &Config::default()).unwrap()
    }

    #[test]
    fn test_groups_positions_by_predicate() {
        let bt = triples();
        let index = PredicateIndex::build_from(&bt).unwrap();
        assert_eq!(index.num_predicates(), 3);
        assert_eq!(index.len(), 5);

        let positions = |p| -> Vec<usize> {
            index
                .occurrences(p)
                .unwrap()
                .map(|slot| index.position(slot).unwrap())
                .collect()
        };
        // subjects sequence: [1 3][2 3][1]
        assert_eq!(positions(1), vec![0, 4]);
        assert_eq!(positions(2), vec![2]);
        assert_eq!(positions(3), vec![1, 3]);
        assert!(index.occurrences(0).is_err());
        assert!(index.occurrences(4).is_err());
    }

    #[test]
    fn test_sparse_predicates_are_rejected() {
        let sparse = [TripleId::new(1, 1, 1), TripleId::new(1, 3, 1)];
        let bt = BitmapTriples::build(sparse, &Config::default()).unwrap();
        assert!(matches!(
            PredicateIndex::build_from(&bt),
            Err(Error::Construction(_))
        ));
        assert!(bt.ensure_predicate_index().is_none());
        assert_eq!(bt.search(TripleId::new(0, 3, 0)).count(), 1);
    }

    #[test]
    fn test_round_trip_and_attach() {
        let bt = triples();
        let index = PredicateIndex::build_from(&bt).unwrap();
        let bytes = index.to_bytes().unwrap();
        let back = PredicateIndex::from_bytes(&bytes, &Config::default()).unwrap();
        assert_eq!(back, index);

        bt.attach_predicate_index(back).unwrap();
        assert!(bt.predicate_index().is_some());
        assert!(bt.attach_predicate_index(index).is_err());
    }

    #[test]
    fn test_incompatible_index_is_rejected() {
        let other = BitmapTriples::build([TripleId::new(1, 1, 1)], &Config::default()).unwrap();
        let index = PredicateIndex::build_from(&other).unwrap();
        let bt = triples();
        assert!(matches!(
            bt.attach_predicate_index(index),
            Err(Error::InvalidArgument(_))
        ));
        assert!(bt.predicate_index().is_none());
    }
}
