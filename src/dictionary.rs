//! Term dictionary interface and term-level search.
//!
//! The index only stores ids. A [`Dictionary`] maps terms to the dense ids of
//! each role and back; [`search_terms`] runs a pattern given as terms.

use crate::error::{Error, Result};
use crate::search::SearchIter;
use crate::triples::{BitmapTriples, Id, TripleId};

/// Role an id plays in a triple; ids are dense per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// Subject position.
    Subject,
    /// Predicate position.
    Predicate,
    /// Object position.
    Object,
}

impl IdKind {
    /// Lowercase role name.
    pub fn name(self) -> &'static str {
        match self {
            IdKind::Subject => "subject",
            IdKind::Predicate => "predicate",
            IdKind::Object => "object",
        }
    }
}

/// Bidirectional term/id mapping provided by the caller.
///
/// Ids for each role are `1..=N`; `id_to_string` must invert every
/// successful `string_to_id`.
pub trait Dictionary {
    /// Id of `term` in `kind`, or `None` if the term is unknown.
    fn string_to_id(&self, term: &str, kind: IdKind) -> Option<Id>;

    /// Term for `id` in `kind`, or `None` if the id is not allocated.
    fn id_to_string(&self, id: Id, kind: IdKind) -> Option<String>;
}

/// A triple of terms.
pub type TermTriple = (String, String, String);

/// Iterator returned by [`search_terms`].
pub struct TermSearch<'a, D: ?Sized> {
    dict: &'a D,
    ids: Option<SearchIter<'a>>,
}

impl<D: Dictionary + ?Sized> TermSearch<'_, D> {
    fn term(&self, id: Id, kind: IdKind) -> Result<String> {
        self.dict.id_to_string(id, kind).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "{} id {id} is missing from the dictionary",
                kind.name()
            ))
        })
    }

    fn translate(&self, id: TripleId) -> Result<TermTriple> {
        Ok((
            self.term(id.subject, IdKind::Subject)?,
            self.term(id.predicate, IdKind::Predicate)?,
            self.term(id.object, IdKind::Object)?,
        ))
    }
}

impl<D: Dictionary + ?Sized> Iterator for TermSearch<'_, D> {
    type Item = Result<TermTriple>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.as_mut()?.next()?;
        Some(self.translate(id))
    }
}

/// Resolve a term pattern to ids; `None` components are wildcards.
///
/// Returns `None` when a bound term is unknown, so nothing can match.
pub fn resolve_pattern<D: Dictionary + ?Sized>(
    dict: &D,
    subject: Option<&str>,
    predicate: Option<&str>,
    object: Option<&str>,
) -> Option<TripleId> {
    let resolve = |term: Option<&str>, kind| match term {
        None => Some(0),
        Some(term) => dict.string_to_id(term, kind).filter(|&id| id != 0),
    };
    Some(TripleId::new(
        resolve(subject, IdKind::Subject)?,
        resolve(predicate, IdKind::Predicate)?,
        resolve(object, IdKind::Object)?,
    ))
}

/// Search `triples` with a pattern of terms and translate matches back.
///
/// Unknown terms yield an empty iterator. An id the dictionary cannot
/// translate is reported as an error item.
pub fn search_terms<'a, D: Dictionary + ?Sized>(
    triples: &'a BitmapTriples,
    dict: &'a D,
    subject: Option<&str>,
    predicate: Option<&str>,
    object: Option<&str>,
) -> TermSearch<'a, D> {
    let ids = resolve_pattern(dict, subject, predicate, object).map(|p| triples.search(p));
    TermSearch { dict, ids }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::collections::HashMap;

    struct MapDictionary {
        terms: HashMap<IdKind, Vec<&'static str>>,
    }

    impl MapDictionary {
        fn new(
            subjects: &[&'static str],
            predicates: &[&'static str],
            objects: &[&'static str],
        ) -> Self {
            let mut terms = HashMap::new();
            terms.insert(IdKind::Subject, subjects.to_vec());
            terms.insert(IdKind::Predicate, predicates.to_vec());
            terms.insert(IdKind::Object, objects.to_vec());
            Self { terms }
        }
    }

    impl Dictionary for MapDictionary {
        fn string_to_id(&self, term: &str, kind: IdKind) -> Option<Id> {
            let pos = self.terms.get(&kind)?.iter().position(|t| *t == term)?;
            Some(pos as Id + 1)
        }

        fn id_to_string(&self, id: Id, kind: IdKind) -> Option<String> {
            let index = usize::try_from(id).ok()?.checked_sub(1)?;
            self.terms.get(&kind)?.get(index).map(|t| t.to_string())
        }
    }

    fn fixture() -> (BitmapTriples, MapDictionary) {
        let dict = MapDictionary::new(
            &[":alice", ":bob"],
            &[":knows", ":name"],
            &[":bob", "\"Alice\""],
        );
        let triples = [
            TripleId::new(1, 1, 1),
            TripleId::new(1, 2, 2),
            TripleId::new(2, 1, 1),
        ];
        (BitmapTriples::build(triples, &Config::default()).unwrap(), dict)
    }

    fn owned(s: &str, p: &str, o: &str) -> TermTriple {
        (s.to_string(), p.to_string(), o.to_string())
    }

    #[test]
    fn test_search_by_terms() {
        let (bt, dict) = fixture();
        let knows: Vec<TermTriple> = search_terms(&bt, &dict, None, Some(":knows"), None)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            knows,
            vec![owned(":alice", ":knows", ":bob"), owned(":bob", ":knows", ":bob")]
        );

        let alice: Vec<TermTriple> =
            search_terms(&bt, &dict, Some(":alice"), None, Some("\"Alice\""))
                .collect::<Result<_>>()
                .unwrap();
        assert_eq!(alice, vec![owned(":alice", ":name", "\"Alice\"")]);
    }

    #[test]
    fn test_unknown_term_is_empty() {
        let (bt, dict) = fixture();
        assert!(resolve_pattern(&dict, Some(":carol"), None, None).is_none());
        assert_eq!(search_terms(&bt, &dict, Some(":carol"), None, None).count(), 0);
        assert_eq!(search_terms(&bt, &dict, None, None, None).count(), 3);
    }

    #[test]
    fn test_untranslatable_id_is_an_error() {
        let (bt, _) = fixture();
        let short = MapDictionary::new(&[":alice", ":bob"], &[":knows"], &[":bob", "\"Alice\""]);
        let results: Vec<Result<TermTriple>> =
            search_terms(&bt, &short, Some(":alice"), None, None).collect();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::InvalidArgument(_))));
    }
}
