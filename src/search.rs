//! Lazy triple-pattern iterator.
//!
//! Every search walks a range of *slots*. A slot resolves to a y occurrence
//! (a position of the subjects sequence), either directly or through the
//! predicate index, and each y occurrence expands into its run of z values.
//! Strategies only differ in which slots they walk and which filters stay
//! active; results always come out in layout order.

use std::fmt;
use std::iter::FusedIterator;
use std::ops::Range;

use crate::predicate_index::PredicateIndex;
use crate::triples::{BitmapTriples, Id, TripleId};

/// How a [`SearchIter`] locates its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Nothing can match.
    Empty,
    /// Major bound: walk its y range.
    Major,
    /// Major and middle bound: a single y occurrence.
    MajorMiddle,
    /// Middle bound, major unbound: walk the predicate index.
    PredicateIndex,
    /// Walk every y occurrence and filter.
    Scan,
}

/// Iterator over the triples matching a pattern.
///
/// Created by [`BitmapTriples::search`]. Restart with [`SearchIter::reset`].
#[derive(Clone)]
pub struct SearchIter<'a> {
    triples: &'a BitmapTriples,
    /// Pattern in layout coordinates.
    pattern: [Id; 3],
    strategy: Strategy,
    index: Option<&'a PredicateIndex>,
    initial: Range<usize>,
    slots: Range<usize>,
    /// z positions left in the current run.
    run: Range<usize>,
    x: Id,
    y: Id,
    last: Option<usize>,
}

impl<'a> SearchIter<'a> {
    pub(crate) fn empty(triples: &'a BitmapTriples) -> Self {
        Self::with_slots(triples, [0; 3], Strategy::Empty, None, 0..0)
    }

    /// Plan a search for `pattern`, given in layout coordinates and known to
    /// be within the stored id ranges.
    pub(crate) fn new(
        triples: &'a BitmapTriples,
        pattern: [Id; 3],
        index: Option<&'a PredicateIndex>,
    ) -> Self {
        let [x, y, _] = pattern;
        let subjects = triples.subjects();

        if x != 0 {
            let range = subjects.key_range(x as usize);
            if y == 0 {
                return Self::with_slots(triples, pattern, Strategy::Major, None, range);
            }
            let pos = subjects.lower_bound(range.clone(), y);
            if pos < range.end && subjects.value(pos) == y {
                return Self::with_slots(
                    triples,
                    pattern,
                    Strategy::MajorMiddle,
                    None,
                    pos..pos + 1,
                );
            }
            return Self::with_slots(triples, pattern, Strategy::Empty, None, 0..0);
        }

        match index {
            Some(index) if y != 0 => {
                let slots = index.key_range(y);
                Self::with_slots(triples, pattern, Strategy::PredicateIndex, Some(index), slots)
            }
            _ => Self::with_slots(triples, pattern, Strategy::Scan, None, 0..subjects.len()),
        }
    }

    fn with_slots(
        triples: &'a BitmapTriples,
        pattern: [Id; 3],
        strategy: Strategy,
        index: Option<&'a PredicateIndex>,
        slots: Range<usize>,
    ) -> Self {
        Self {
            triples,
            pattern,
            strategy,
            index,
            initial: slots.clone(),
            slots,
            run: 0..0,
            x: 0,
            y: 0,
            last: None,
        }
    }

    /// Strategy chosen for this pattern.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The pattern being searched.
    pub fn pattern(&self) -> TripleId {
        self.triples.order().from_coords(self.pattern)
    }

    /// Position in the objects sequence of the last returned triple.
    ///
    /// Pass it to [`BitmapTriples::triple_at`] to recover the triple.
    pub fn last_position(&self) -> Option<usize> {
        self.last
    }

    /// Restart from the first match.
    pub fn reset(&mut self) {
        self.slots = self.initial.clone();
        self.run = 0..0;
        self.last = None;
    }

    /// Move to the next y occurrence that passes the middle filter.
    fn advance_run(&mut self) -> bool {
        let subjects = self.triples.subjects();
        let objects = self.triples.objects();
        let [_, want_y, want_z] = self.pattern;

        for slot in self.slots.by_ref() {
            let py = match self.index {
                Some(index) => index.slot(slot),
                None => slot,
            };
            let y = subjects.value(py);
            if want_y != 0 && y != want_y {
                continue;
            }
            self.x = subjects.key_at(py) as Id;
            self.y = y;
            let run = objects.key_range(py + 1);
            self.run = match want_z {
                0 => run,
                z => objects.lower_bound(run.clone(), z)..run.end,
            };
            return true;
        }
        false
    }
}

impl Iterator for SearchIter<'_> {
    type Item = TripleId;

    fn next(&mut self) -> Option<TripleId> {
        let objects = self.triples.objects();
        let want_z = self.pattern[2];
        loop {
            if let Some(pos) = self.run.next() {
                let z = objects.value(pos);
                if want_z != 0 && z != want_z {
                    // Runs are ascending, nothing further can match.
                    self.run = 0..0;
                    continue;
                }
                self.last = Some(pos);
                return Some(self.triples.order().from_coords([self.x, self.y, z]));
            }
            if !self.advance_run() {
                return None;
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.strategy {
            Strategy::Empty => (0, Some(0)),
            _ if self.pattern == [0; 3] => {
                let done = self.last.map_or(0, |pos| pos + 1);
                let left = self.triples.num_triples() - done;
                (left, Some(left))
            }
            _ => (0, Some(self.triples.num_triples())),
        }
    }
}

impl FusedIterator for SearchIter<'_> {}

impl fmt::Debug for SearchIter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchIter")
            .field("pattern", &self.pattern())
            .field("strategy", &self.strategy)
            .field("slots", &self.slots)
            .field("run", &self.run)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, IndexPolicy};

    fn triples(policy: IndexPolicy) -> BitmapTriples {
        let triples = [
            (1, 1, 2),
            (1, 1, 3),
            (1, 2, 3),
            (2, 1, 1),
            (2, 3, 3),
            (3, 2, 1),
            (3, 2, 2),
        ]
        .map(TripleId::from);
        let config = Config::default().with_predicate_index(policy);
        BitmapTriples::build(triples, &config).unwrap()
    }

    fn collect(bt: &BitmapTriples, s: Id, p: Id, o: Id) -> Vec<(Id, Id, Id)> {
        bt.search(TripleId::new(s, p, o))
            .map(|t| (t.subject, t.predicate, t.object))
            .collect()
    }

    #[test]
    fn test_strategy_dispatch() {
        let bt = triples(IndexPolicy::Lazy);
        let strategy = |s, p, o| bt.search(TripleId::new(s, p, o)).strategy();
        assert_eq!(strategy(1, 0, 0), Strategy::Major);
        assert_eq!(strategy(1, 0, 3), Strategy::Major);
        assert_eq!(strategy(1, 2, 0), Strategy::MajorMiddle);
        assert_eq!(strategy(1, 3, 0), Strategy::Empty);
        assert_eq!(strategy(0, 2, 0), Strategy::PredicateIndex);
        assert_eq!(strategy(0, 0, 1), Strategy::Scan);
        assert_eq!(strategy(0, 0, 0), Strategy::Scan);
        assert_eq!(strategy(0, 9, 0), Strategy::Empty);

        let no_index = triples(IndexPolicy::Disabled);
        assert_eq!(no_index.search(TripleId::new(0, 2, 0)).strategy(), Strategy::Scan);
    }

    #[test]
    fn test_bound_major() {
        let bt = triples(IndexPolicy::Lazy);
        assert_eq!(collect(&bt, 2, 0, 0), vec![(2, 1, 1), (2, 3, 3)]);
        assert_eq!(collect(&bt, 1, 0, 3), vec![(1, 1, 3), (1, 2, 3)]);
        assert_eq!(collect(&bt, 1, 1, 0), vec![(1, 1, 2), (1, 1, 3)]);
        assert_eq!(collect(&bt, 1, 1, 3), vec![(1, 1, 3)]);
        assert!(collect(&bt, 1, 1, 1).is_empty());
        assert!(collect(&bt, 1, 3, 0).is_empty());
    }

    #[test]
    fn test_unbound_major_with_and_without_index() {
        for policy in [IndexPolicy::Lazy, IndexPolicy::Disabled] {
            let bt = triples(policy);
            assert_eq!(collect(&bt, 0, 2, 0), vec![(1, 2, 3), (3, 2, 1), (3, 2, 2)]);
            assert_eq!(collect(&bt, 0, 2, 1), vec![(3, 2, 1)]);
            assert_eq!(collect(&bt, 0, 1, 3), vec![(1, 1, 3)]);
            assert_eq!(collect(&bt, 0, 0, 3), vec![(1, 1, 3), (1, 2, 3), (2, 3, 3)]);
        }
    }

    #[test]
    fn test_out_of_range_components_are_empty() {
        let bt = triples(IndexPolicy::Lazy);
        assert!(collect(&bt, 4, 0, 0).is_empty());
        assert!(collect(&bt, 0, 4, 0).is_empty());
        assert!(collect(&bt, 0, 0, 4).is_empty());
        assert!(collect(&bt, 1, 1, 9).is_empty());
    }

    #[test]
    fn test_reset_restarts() {
        let bt = triples(IndexPolicy::Lazy);
        let mut iter = bt.search(TripleId::new(0, 1, 0));
        let first: Vec<TripleId> = iter.by_ref().collect();
        assert_eq!(first.len(), 3);
        assert_eq!(iter.next(), None);
        iter.reset();
        assert_eq!(iter.last_position(), None);
        assert_eq!(iter.collect::<Vec<_>>(), first);
    }

    #[test]
    fn test_last_position_recovers_triple() {
        let bt = triples(IndexPolicy::Lazy);
        let mut iter = bt.search(TripleId::new(0, 2, 0));
        while let Some(t) = iter.next() {
            let pos = iter.last_position().unwrap();
            assert_eq!(bt.triple_at(pos).unwrap(), t);
        }
    }

    #[test]
    fn test_size_hint_of_full_scan() {
        let bt = triples(IndexPolicy::Lazy);
        let mut iter = bt.iter();
        assert_eq!(iter.size_hint(), (7, Some(7)));
        iter.next();
        iter.next();
        assert_eq!(iter.size_hint(), (5, Some(5)));
        assert_eq!(iter.count(), 5);
    }
}
