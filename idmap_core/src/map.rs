use std::fmt;
use std::io::Write;
use std::mem::size_of;
use std::path::Path;
use std::str::FromStr;

use crate::dense::DenseIndex;
use crate::element::{Element, EmptyValue, Entry, Id};
use crate::error::Result;
use crate::sparse::SparseIndex;

/// Operations shared by every id index.
pub trait IdMap<I: Id, V: Element + EmptyValue> {
    /// Pre-allocates room for `additional` more elements.
    fn reserve(&mut self, additional: usize);

    fn set(&mut self, id: I, value: V);

    /// Fails with `Error::NotFound` when no value is recorded for `id`.
    fn get(&self, id: I) -> Result<V>;

    fn get_opt(&self, id: I) -> Option<V>;

    /// Number of stored elements.
    fn size(&self) -> usize;

    /// `size()` times the element size, in bytes.
    fn used_memory(&self) -> usize;

    /// Drops every element and releases the backing memory.
    fn clear(&mut self);

    /// Prepares the index for lookups. Only sparse indices need it.
    fn sort(&mut self) {}

    /// Writes the raw image of the backing array to `sink`.
    fn dump(&self, sink: &mut dyn Write) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Storage strategy of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// One slot per possible id, located by offset.
    Dense,
    /// `(id, value)` pairs, located by binary search.
    Sparse,
}

impl IndexKind {
    /// Recommends the strategy that needs less memory for `count` ids
    /// spread up to `max_id`.
    pub fn for_density<I: Id, V: Element>(count: usize, max_id: I) -> Self {
        let Some(slots) = max_id.to_index().and_then(|index| index.checked_add(1)) else {
            return IndexKind::Sparse;
        };
        let dense_bytes = slots.saturating_mul(V::SIZE);
        let sparse_bytes = count.saturating_mul(size_of::<Entry<I, V>>());
        if dense_bytes <= sparse_bytes {
            IndexKind::Dense
        } else {
            IndexKind::Sparse
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Dense => write!(f, "dense"),
            IndexKind::Sparse => write!(f, "sparse"),
        }
    }
}

impl FromStr for IndexKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dense" => Ok(IndexKind::Dense),
            "sparse" => Ok(IndexKind::Sparse),
            other => Err(format!("unknown index kind '{other}', expected dense or sparse")),
        }
    }
}

/// An index whose strategy is picked at runtime.
#[derive(Debug, Clone)]
pub enum AnyIndex<I, V> {
    Dense(DenseIndex<I, V>),
    Sparse(SparseIndex<I, V>),
}

impl<I: Id, V: Element + EmptyValue> AnyIndex<I, V> {
    pub fn new(kind: IndexKind) -> Self {
        match kind {
            IndexKind::Dense => AnyIndex::Dense(DenseIndex::new()),
            IndexKind::Sparse => AnyIndex::Sparse(SparseIndex::new()),
        }
    }

    /// Loads a dump written by an index of the same kind.
    pub fn load<P: AsRef<Path>>(kind: IndexKind, path: P) -> Result<Self> {
        Ok(match kind {
            IndexKind::Dense => AnyIndex::Dense(DenseIndex::load(path)?),
            IndexKind::Sparse => AnyIndex::Sparse(SparseIndex::load(path)?),
        })
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            AnyIndex::Dense(_) => IndexKind::Dense,
            AnyIndex::Sparse(_) => IndexKind::Sparse,
        }
    }

    fn inner(&self) -> &dyn IdMap<I, V> {
        match self {
            AnyIndex::Dense(index) => index,
            AnyIndex::Sparse(index) => index,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn IdMap<I, V> {
        match self {
            AnyIndex::Dense(index) => index,
            AnyIndex::Sparse(index) => index,
        }
    }
}

impl<I: Id, V: Element + EmptyValue> IdMap<I, V> for AnyIndex<I, V> {
    fn reserve(&mut self, additional: usize) {
        self.inner_mut().reserve(additional)
    }

    fn set(&mut self, id: I, value: V) {
        self.inner_mut().set(id, value)
    }

    fn get(&self, id: I) -> Result<V> {
        self.inner().get(id)
    }

    fn get_opt(&self, id: I) -> Option<V> {
        self.inner().get_opt(id)
    }

    fn size(&self) -> usize {
        self.inner().size()
    }

    fn used_memory(&self) -> usize {
        self.inner().used_memory()
    }

    fn clear(&mut self) {
        self.inner_mut().clear()
    }

    fn sort(&mut self) {
        self.inner_mut().sort()
    }

    fn dump(&self, sink: &mut dyn Write) -> Result<()> {
        self.inner().dump(sink)
    }

    fn name(&self) -> &'static str {
        self.inner().name()
    }
}
