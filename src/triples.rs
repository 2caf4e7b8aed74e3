//! Bitmap triples: two stacked adjacency lists over sorted triple ids.
//!
//! Triples are laid out by a permutation [`Order`] into coordinates
//! `(x, y, z)`; for the default SPO order these are subject, predicate and
//! object.
//!
//! - `subjects` maps each `x` in `1..=X` to its ascending `y` values. Every
//!   entry is one *y occurrence*.
//! - `objects` maps each y occurrence (position `p`, key `p + 1`) to its
//!   ascending `z` values. Every entry is one triple.
//!
//! ```text
//! triples (1,1,1) (1,1,2) (1,2,1) (2,1,1)
//! subjects: y=[1 2][1]    bits=[0 1][1]
//! objects:  z=[1 2][1][1] bits=[0 1][1][1]
//! ```
//!
//! # Complexity
//!
//! | pattern | strategy | cost |
//! |---|---|---|
//! | `x??` `x?z` | range of `x` | result size (`log` per y for `x?z`) |
//! | `xy?` `xyz` | binary search `y` (and `z`) | `O(log n)` + result |
//! | `?y?` `?yz` | predicate index, else scan | occurrences of `y` |
//! | `??z` `???` | linear scan | `O(n)` |

use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use log::{debug, warn};

use crate::adjacency::AdjacencyList;
use crate::bitmap::BitmapBuilder;
use crate::checksum::Checksum;
use crate::config::{Config, IndexPolicy};
use crate::error::{Error, Result};
use crate::header::{SectionHeader, SectionKind};
use crate::predicate_index::PredicateIndex;
use crate::search::SearchIter;
use crate::sequence::Sequence;
use crate::storage::{Backing, ByteCursor};

/// Subject, predicate or object id, starting at 1.
///
/// In a pattern, 0 is the wildcard; it is never an allocated id.
pub type Id = u64;

/// A triple of ids for subject, predicate and object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TripleId {
    /// Subject id.
    pub subject: Id,
    /// Predicate id.
    pub predicate: Id,
    /// Object id.
    pub object: Id,
}

impl TripleId {
    /// Create a new triple id.
    pub const fn new(subject: Id, predicate: Id, object: Id) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// The all-wildcard pattern.
    pub const fn any() -> Self {
        Self::new(0, 0, 0)
    }

    /// Return true if `self`, read as a pattern, matches `triple`.
    pub fn matches(&self, triple: &TripleId) -> bool {
        (self.subject == 0 || self.subject == triple.subject)
            && (self.predicate == 0 || self.predicate == triple.predicate)
            && (self.object == 0 || self.object == triple.object)
    }
}

impl From<(Id, Id, Id)> for TripleId {
    fn from((s, p, o): (Id, Id, Id)) -> Self {
        Self::new(s, p, o)
    }
}

/// Which triple component is major, middle and minor in the layout.
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Order {
    #[default]
    SPO = 1,
    SOP = 2,
    PSO = 3,
    POS = 4,
    OSP = 5,
    OPS = 6,
}

impl Order {
    /// Every supported permutation.
    pub const ALL: [Order; 6] = [
        Order::SPO,
        Order::SOP,
        Order::PSO,
        Order::POS,
        Order::OSP,
        Order::OPS,
    ];

    /// Map a triple to layout coordinates `[x, y, z]`.
    pub fn to_coords(self, t: TripleId) -> [Id; 3] {
        let TripleId {
            subject: s,
            predicate: p,
            object: o,
        } = t;
        match self {
            Order::SPO => [s, p, o],
            Order::SOP => [s, o, p],
            Order::PSO => [p, s, o],
            Order::POS => [p, o, s],
            Order::OSP => [o, s, p],
            Order::OPS => [o, p, s],
        }
    }

    /// Map layout coordinates back to a triple.
    pub fn from_coords(self, [x, y, z]: [Id; 3]) -> TripleId {
        match self {
            Order::SPO => TripleId::new(x, y, z),
            Order::SOP => TripleId::new(x, z, y),
            Order::PSO => TripleId::new(y, x, z),
            Order::POS => TripleId::new(z, x, y),
            Order::OSP => TripleId::new(y, z, x),
            Order::OPS => TripleId::new(z, y, x),
        }
    }
}

impl TryFrom<u8> for Order {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self> {
        Order::ALL
            .into_iter()
            .find(|order| *order as u8 == tag)
            .ok_or_else(|| Error::InvalidEncoding(format!("unknown triple order {tag}")))
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for Order {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Order::ALL
            .into_iter()
            .find(|order| order.to_string() == s)
            .ok_or_else(|| Error::InvalidEncoding(format!("unknown triple order {s:?}")))
    }
}

/// Immutable, queryable triple index.
pub struct BitmapTriples {
    order: Order,
    /// x -> y values; one entry per y occurrence.
    subjects: AdjacencyList,
    /// y occurrence -> z values; one entry per triple.
    objects: AdjacencyList,
    max_y: Id,
    max_z: Id,
    index_policy: IndexPolicy,
    /// `Some(None)` records that an index could not be built.
    predicate_index: OnceLock<Option<PredicateIndex>>,
}

impl fmt::Debug for BitmapTriples {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitmapTriples")
            .field("order", &self.order)
            .field("triples", &self.num_triples())
            .field("subjects", &self.subjects)
            .field("objects", &self.objects)
            .field("predicate_index", &self.predicate_index())
            .finish()
    }
}

impl BitmapTriples {
    /// Build from triples sorted by `config.order`, consumed once.
    ///
    /// Rejects zero ids, unsorted input and gaps in the major component.
    /// Duplicate triples are kept as distinct occurrences.
    pub fn build<I: IntoIterator<Item = TripleId>>(triples: I, config: &Config) -> Result<Self> {
        let timer = Instant::now();
        let order = config.order;

        let mut bits_y = BitmapBuilder::default();
        let mut bits_z = BitmapBuilder::default();
        let mut values_y = Vec::new();
        let mut values_z = Vec::new();

        let mut last: Option<[Id; 3]> = None;
        for triple in triples {
            let [x, y, z] = order.to_coords(triple);
            if x == 0 || y == 0 || z == 0 {
                return Err(Error::Construction(format!(
                    "triple {triple:?} has a zero id"
                )));
            }

            match last {
                None => {
                    if x != 1 {
                        return Err(Error::Construction(format!(
                            "first major id is {x}, expected 1"
                        )));
                    }
                    values_y.push(y);
                    values_z.push(z);
                }
                Some([lx, ly, lz]) => {
                    if x != lx {
                        if x < lx {
                            return Err(unsorted(order, triple));
                        }
                        if x != lx + 1 {
                            return Err(Error::Construction(format!(
                                "major ids must be correlative, {lx} is followed by {x}"
                            )));
                        }
                        bits_y.push(true)?;
                        values_y.push(y);
                        bits_z.push(true)?;
                        values_z.push(z);
                    } else if y != ly {
                        if y < ly {
                            return Err(unsorted(order, triple));
                        }
                        bits_y.push(false)?;
                        values_y.push(y);
                        bits_z.push(true)?;
                        values_z.push(z);
                    } else {
                        if z < lz {
                            return Err(unsorted(order, triple));
                        }
                        bits_z.push(false)?;
                        values_z.push(z);
                    }
                }
            }
            last = Some([x, y, z]);
        }

        if last.is_some() {
            bits_y.push(true)?;
            bits_z.push(true)?;
        }

        let max_y = values_y.iter().copied().max().unwrap_or(0);
        let max_z = values_z.iter().copied().max().unwrap_or(0);
        let subjects =
            AdjacencyList::from_parts(bits_y.finish(), Sequence::from_values(&values_y))?;
        let objects =
            AdjacencyList::from_parts(bits_z.finish(), Sequence::from_values(&values_z))?;

        let triples =
            Self::assemble(order, subjects, objects, max_y, max_z, config.predicate_index);
        debug!(
            "built {} bitmap triples ({} y occurrences) in {:?}",
            triples.num_triples(),
            triples.subjects.len(),
            timer.elapsed()
        );
        triples.apply_policy();
        Ok(triples)
    }

    fn assemble(
        order: Order,
        subjects: AdjacencyList,
        objects: AdjacencyList,
        max_y: Id,
        max_z: Id,
        index_policy: IndexPolicy,
    ) -> Self {
        Self {
            order,
            subjects,
            objects,
            max_y,
            max_z,
            index_policy,
            predicate_index: OnceLock::new(),
        }
    }

    fn apply_policy(&self) {
        if self.index_policy == IndexPolicy::Eager {
            self.ensure_predicate_index();
        }
    }

    /// Layout permutation.
    pub fn order(&self) -> Order {
        self.order
    }

    /// Number of stored triples, duplicates included.
    pub fn num_triples(&self) -> usize {
        self.objects.len()
    }

    /// Return true if no triples are stored.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Number of distinct major ids (subjects for SPO).
    pub fn num_subjects(&self) -> usize {
        self.subjects.num_keys()
    }

    /// Largest middle id (predicate for SPO).
    pub fn max_y(&self) -> Id {
        self.max_y
    }

    /// Largest minor id (object for SPO).
    pub fn max_z(&self) -> Id {
        self.max_z
    }

    /// Major -> middle adjacency list.
    pub fn subjects(&self) -> &AdjacencyList {
        &self.subjects
    }

    /// Middle occurrence -> minor adjacency list.
    pub fn objects(&self) -> &AdjacencyList {
        &self.objects
    }

    /// Heap bytes of both adjacency lists and any predicate index.
    pub fn size_in_bytes(&self) -> usize {
        self.subjects.heap_bytes()
            + self.objects.heap_bytes()
            + self.predicate_index().map_or(0, PredicateIndex::heap_bytes)
    }

    /// Iterate over every triple in layout order.
    pub fn iter(&self) -> SearchIter<'_> {
        self.search(TripleId::any())
    }

    /// Iterate over triples matching `pattern` (0 components are wildcards).
    ///
    /// Results come in layout order. Ids outside the stored ranges yield
    /// an empty iterator.
    pub fn search(&self, pattern: TripleId) -> SearchIter<'_> {
        let coords = self.order.to_coords(pattern);
        let [x, y, z] = coords;
        let out_of_range =
            x > self.num_subjects() as Id || y > self.max_y || z > self.max_z;
        if out_of_range {
            return SearchIter::empty(self);
        }

        let index = if x == 0 && y != 0 {
            self.index_for_search()
        } else {
            None
        };
        SearchIter::new(self, coords, index)
    }

    /// Triple stored at `pos` of the objects sequence.
    pub fn triple_at(&self, pos: usize) -> Result<TripleId> {
        let z = self.objects.value_at(pos)?;
        let py = self.objects.key_at(pos) - 1;
        let y = self.subjects.value(py);
        let x = self.subjects.key_at(py) as Id;
        Ok(self.order.from_coords([x, y, z]))
    }

    /// Return true if `triple` is stored.
    pub fn contains(&self, triple: TripleId) -> bool {
        let [x, y, z] = self.order.to_coords(triple);
        x != 0 && y != 0 && z != 0 && self.search(triple).next().is_some()
    }

    /// Currently available predicate index, without building one.
    pub fn predicate_index(&self) -> Option<&PredicateIndex> {
        self.predicate_index.get().and_then(Option::as_ref)
    }

    /// Build the predicate index if missing and return it.
    ///
    /// Built once per handle; concurrent callers share the same build.
    /// Returns `None` when the middle ids are not dense.
    pub fn ensure_predicate_index(&self) -> Option<&PredicateIndex> {
        self.predicate_index
            .get_or_init(|| match PredicateIndex::build_from(self) {
                Ok(index) => Some(index),
                Err(err) => {
                    warn!("predicate index unavailable, falling back to scans: {err}");
                    None
                }
            })
            .as_ref()
    }

    fn index_for_search(&self) -> Option<&PredicateIndex> {
        match self.index_policy {
            IndexPolicy::Disabled => self.predicate_index(),
            IndexPolicy::Lazy | IndexPolicy::Eager => self.ensure_predicate_index(),
        }
    }

    /// Attach a previously built or loaded predicate index.
    pub fn attach_predicate_index(&self, index: PredicateIndex) -> Result<()> {
        index.check_compatible(self)?;
        self.predicate_index
            .set(Some(index))
            .map_err(|_| Error::InvalidArgument("a predicate index is already present".to_string()))
    }

    /// Serialize with the default checksum.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.save_with(writer, Checksum::default())
    }

    /// Serialize the triples section; the predicate index is not included.
    pub fn save_with<W: Write>(&self, writer: &mut W, checksum: Checksum) -> Result<()> {
        SectionHeader::new(SectionKind::Triples)
            .with_property("order", self.order)
            .with_property("triples", self.num_triples())
            .with_property("max_y", self.max_y)
            .with_property("max_z", self.max_z)
            .write(writer)?;
        self.subjects.save_with(writer, checksum)?;
        self.objects.save_with(writer, checksum)
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

    /// Read a whole triples section from `reader`.
    pub fn load<R: Read>(reader: &mut R, config: &Config) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_backing(Backing::from_vec(bytes), config)
    }

    /// Parse a triples section occupying all of `backing`.
    pub fn from_backing(backing: Backing, config: &Config) -> Result<Self> {
        let triples = Self::parse(backing, config)?;
        triples.apply_policy();
        Ok(triples)
    }

    fn parse(backing: Backing, config: &Config) -> Result<Self> {
        let timer = Instant::now();
        let mapped = backing.is_mapped();
        let mut cursor = ByteCursor::new(backing);
        let triples = Self::read_section(&mut cursor, config)?;
        if !cursor.is_at_end() {
            return Err(Error::InvalidEncoding(format!(
                "{} trailing bytes after triples",
                cursor.backing().len() - cursor.position()
            )));
        }
        debug!(
            "loaded {} triples ({}) in {:?}",
            triples.num_triples(),
            if mapped { "mapped" } else { "heap" },
            timer.elapsed()
        );
        Ok(triples)
    }

    fn read_section(cursor: &mut ByteCursor, config: &Config) -> Result<Self> {
        let header = SectionHeader::read(cursor, config.strict_checksums)?
            .require(SectionKind::Triples)?;
        let order: Order = header.parse("order")?;
        let num_triples: usize = header.parse("triples")?;
        let max_y: Id = header.parse("max_y")?;
        let max_z: Id = header.parse("max_z")?;

        let subjects = AdjacencyList::read_section(cursor, config)?;
        let objects = AdjacencyList::read_section(cursor, config)?;
        if objects.len() != num_triples {
            return Err(Error::InvalidEncoding(format!(
                "header announces {num_triples} triples, found {}",
                objects.len()
            )));
        }
        if objects.num_keys() != subjects.len() {
            return Err(Error::InvalidEncoding(format!(
                "{} y occurrences but {} object groups",
                subjects.len(),
                objects.num_keys()
            )));
        }
        let stored_y = subjects.sequence().iter().max().unwrap_or(0);
        let stored_z = objects.sequence().iter().max().unwrap_or(0);
        if (max_y, max_z) != (stored_y, stored_z) {
            return Err(Error::InvalidEncoding(format!(
                "header announces max ids {max_y}/{max_z}, payload holds {stored_y}/{stored_z}"
            )));
        }
        Ok(Self::assemble(order, subjects, objects, max_y, max_z, config.predicate_index))
    }

    /// Open a triples file and its predicate index sidecar, if present.
    pub fn open<P: AsRef<Path>>(path: P, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        let triples = Self::parse(Backing::open(path, config.load_mode)?, config)?;

        let sidecar = sidecar_path(path);
        if sidecar.exists() {
            let backing = Backing::open(&sidecar, config.load_mode)?;
            let index = PredicateIndex::from_backing(backing, config)?;
            triples.attach_predicate_index(index)?;
            debug!("attached predicate index from {}", sidecar.display());
        }
        triples.apply_policy();
        Ok(triples)
    }

    /// Write the triples file, plus a sidecar if a predicate index exists.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P, config: &Config) -> Result<()> {
        let path = path.as_ref();
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        self.save_with(&mut out, config.checksum)?;
        out.flush()?;

        if let Some(index) = self.predicate_index() {
            let mut out = std::io::BufWriter::new(std::fs::File::create(sidecar_path(path))?);
            index.save_with(&mut out, config.checksum)?;
            out.flush()?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a BitmapTriples {
    type Item = TripleId;
    type IntoIter = SearchIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Location of the predicate index stored next to a triples file.
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".pidx");
    PathBuf::from(name)
}

fn unsorted(order: Order, triple: TripleId) -> Error {
    Error::Construction(format!("triple {triple:?} is out of {order} order"))
}
