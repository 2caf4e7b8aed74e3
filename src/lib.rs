//! # Bitmap Triples
//!
//! *A compact, read-only index over integer triples that answers every
//! triple pattern without decompressing.*
//!
//! ## Intuition First
//!
//! Sort a set of `(subject, predicate, object)` ids. Consecutive triples
//! share subjects, and triples with the same subject share predicates, so
//! the sorted list is really a two-level tree. Store each level as a flat
//! list of child ids plus a bitmap marking where each parent's children end.
//! Rank and select on those bitmaps then navigate the tree in constant time.
//!
//! ```text
//! (1,1,1) (1,1,2) (1,2,1) (2,1,1)
//!
//! subjects  -> predicates   [1 2][1]       bits 0 1 1
//! predicate -> objects      [1 2][1][1]    bits 0 1 1 1
//! ```
//!
//! ## Components
//!
//! - [`Bitmap`]: rank/select bit vector (Rank9 directory, sampled select).
//! - [`Sequence`]: bit-packed fixed-width integers.
//! - [`AdjacencyList`]: bitmap + sequence as a one-to-many mapping.
//! - [`BitmapTriples`]: two stacked adjacency lists and the pattern search.
//! - [`PredicateIndex`]: optional transposition for `?P?` and `?PO`.
//! - [`vbyte`], [`checksum`], [`header`]: the persisted section format.
//!
//! ## Query shapes
//!
//! With the major component bound, a search touches only that component's
//! range. With only the middle component bound, the predicate index jumps to
//! its occurrences; without one the search scans. Results always come out in
//! the layout's sort order.
//!
//! ## Example
//!
//! ```
//! use tribits::{BitmapTriples, Config, TripleId};
//!
//! let triples = [(1, 1, 1), (1, 1, 2), (1, 2, 1), (2, 1, 1)].map(TripleId::from);
//! let bt = BitmapTriples::build(triples, &Config::default())?;
//!
//! let objects: Vec<u64> = bt.search(TripleId::new(1, 1, 0)).map(|t| t.object).collect();
//! assert_eq!(objects, [1, 2]);
//! assert_eq!(bt.search(TripleId::new(0, 1, 0)).count(), 3);
//!
//! let bytes = bt.to_bytes()?;
//! let back = BitmapTriples::from_bytes(&bytes, &Config::default())?;
//! assert_eq!(back.iter().collect::<Vec<_>>(), bt.iter().collect::<Vec<_>>());
//! # Ok::<(), tribits::Error>(())
//! ```
//!
//! ## What Could Go Wrong
//!
//! 1. **Unsorted input**: the build is a single pass and rejects input that
//!    is out of order for the chosen [`Order`].
//! 2. **Sparse major ids**: every major id in `1..=N` needs a triple.
//! 3. **Mapped files**: a memory-mapped index must not be modified on disk
//!    while it is open.
//!
//! ## References
//!
//! - Fernández, J. D., et al. (2013). "Binary RDF representation for
//!   publication and exchange (HDT)."
//! - Vigna, S. (2008). "Broadword implementation of rank/select queries."

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adjacency;
pub mod bitmap;
pub mod checksum;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod header;
pub mod predicate_index;
pub mod search;
pub mod sequence;
pub mod storage;
pub mod triples;
pub mod vbyte;

pub use adjacency::AdjacencyList;
pub use bitmap::{Bitmap, BitmapBuilder};
pub use checksum::Checksum;
pub use config::{Config, IndexPolicy, LoadMode};
pub use dictionary::{search_terms, Dictionary, IdKind};
pub use error::{Error, Result};
pub use predicate_index::PredicateIndex;
pub use search::{SearchIter, Strategy};
pub use sequence::{bits_needed, Sequence};
pub use triples::{BitmapTriples, Id, Order, TripleId};
