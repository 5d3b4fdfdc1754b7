use std::fs::File;
use std::io::Write;
use std::path::Path;

use rayon::prelude::*;
use tracing::debug;

use crate::element::{Element, EmptyValue, Entry, Id};
use crate::error::{Error, Result};
use crate::image::{read_image, write_image};
use crate::map::IdMap;

/// Lists at least this long are sorted on the rayon pool.
const PARALLEL_SORT_THRESHOLD: usize = 1 << 16;

/// An append-only list of `(id, value)` entries searched by binary search.
///
/// `set` only appends: it neither sorts nor replaces an earlier entry for
/// the same id. The list has to be sorted with [`SparseIndex::sort`] after
/// loading it and before querying it; lookups on an unsorted list return
/// arbitrary (but memory safe) results. [`SparseIndex::into_sorted`] moves
/// the index into a read-only phase where lookups are always correct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseIndex<I, V> {
    entries: Vec<Entry<I, V>>,
    sorted: bool,
}

impl<I: Id, V: Element + EmptyValue> SparseIndex<I, V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            sorted: true,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            sorted: true,
        }
    }

    /// Builds an index from the raw image held in `file`, as written by
    /// [`SparseIndex::dump`]. Entries keep their stored order.
    pub fn from_file(file: &File) -> Result<Self> {
        let entries: Vec<Entry<I, V>> = read_image(file)?;
        let sorted = entries.is_sorted_by_key(|entry| entry.id);
        Ok(Self { entries, sorted })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file(&File::open(path)?)
    }

    pub fn reserve(&mut self, additional: usize) {
        self.entries.reserve(additional);
    }

    /// Appends an entry.
    pub fn set(&mut self, id: I, value: V) {
        if self.sorted && self.entries.last().is_some_and(|last| last.id > id) {
            self.sorted = false;
        }
        self.entries.push(Entry::new(id, value));
    }

    /// Looks `id` up by lower-bound binary search.
    ///
    /// Among duplicate ids the leftmost entry wins, which after a
    /// [`SparseIndex::sort`] is the first one inserted.
    pub fn get(&self, id: I) -> Result<V> {
        self.get_opt(id).ok_or(Error::NotFound(id.as_u64()))
    }

    pub fn get_opt(&self, id: I) -> Option<V> {
        lower_bound(&self.entries, id).first().map(|entry| entry.value)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `size()` times the entry size, padding included.
    pub fn used_memory(&self) -> usize {
        self.entries.len() * Entry::<I, V>::SIZE
    }

    pub fn clear(&mut self) {
        debug!(entries = self.entries.len(), "clearing sparse index");
        self.entries = Vec::new();
        self.sorted = true;
    }

    /// Sorts the entries by id. Entries with the same id keep their
    /// insertion order, so a lookup finds the first value inserted for an
    /// id. Sorting whole `(id, value)` pairs would instead put the smallest
    /// value first.
    pub fn sort(&mut self) {
        if self.sorted {
            return;
        }
        if self.entries.len() >= PARALLEL_SORT_THRESHOLD {
            self.entries.par_sort_by_key(|entry| entry.id);
        } else {
            self.entries.sort_by_key(|entry| entry.id);
        }
        self.sorted = true;
        debug!(entries = self.entries.len(), "sorted sparse index");
    }

    /// Whether the entries are known to be in id order.
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Sorts, then keeps only the first inserted entry for every id.
    pub fn dedup(&mut self) {
        self.sort();
        let before = self.entries.len();
        self.entries.dedup_by_key(|entry| entry.id);
        if self.entries.len() < before {
            debug!(
                removed = before - self.entries.len(),
                "dropped duplicate ids"
            );
        }
    }

    /// Writes the entries in their current order as a raw list image.
    pub fn dump(&self, sink: &mut dyn Write) -> Result<()> {
        write_image(&self.entries, sink)
    }

    /// Sorts and switches to the query phase.
    pub fn into_sorted(mut self) -> SortedSparseIndex<I, V> {
        self.sort();
        SortedSparseIndex {
            entries: self.entries,
        }
    }

    pub fn as_slice(&self) -> &[Entry<I, V>] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry<I, V>> {
        self.entries.iter()
    }

    /// Mutable access to the entries. Ids may change, so the index has to
    /// be sorted again before the next lookup.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entry<I, V>> {
        self.sorted = false;
        self.entries.iter_mut()
    }
}

/// The entries equal to `id` at the lower bound of `id`, empty if none.
fn lower_bound<I: Id, V>(entries: &[Entry<I, V>], id: I) -> &[Entry<I, V>] {
    let start = entries.partition_point(|entry| entry.id < id);
    let len = entries[start..]
        .iter()
        .take_while(|entry| entry.id == id)
        .count();
    &entries[start..start + len]
}

impl<I: Id, V: Element + EmptyValue> Default for SparseIndex<I, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Id, V: Element + EmptyValue> IdMap<I, V> for SparseIndex<I, V> {
    fn reserve(&mut self, additional: usize) {
        SparseIndex::reserve(self, additional)
    }

    fn set(&mut self, id: I, value: V) {
        SparseIndex::set(self, id, value)
    }

    fn get(&self, id: I) -> Result<V> {
        SparseIndex::get(self, id)
    }

    fn get_opt(&self, id: I) -> Option<V> {
        SparseIndex::get_opt(self, id)
    }

    fn size(&self) -> usize {
        SparseIndex::size(self)
    }

    fn used_memory(&self) -> usize {
        SparseIndex::used_memory(self)
    }

    fn clear(&mut self) {
        SparseIndex::clear(self)
    }

    fn sort(&mut self) {
        SparseIndex::sort(self)
    }

    fn dump(&self, sink: &mut dyn Write) -> Result<()> {
        SparseIndex::dump(self, sink)
    }

    fn name(&self) -> &'static str {
        "sparse"
    }
}

impl<'a, I, V> IntoIterator for &'a SparseIndex<I, V> {
    type Item = &'a Entry<I, V>;
    type IntoIter = std::slice::Iter<'a, Entry<I, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<'a, I, V> IntoIterator for &'a mut SparseIndex<I, V> {
    type Item = &'a mut Entry<I, V>;
    type IntoIter = std::slice::IterMut<'a, Entry<I, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.sorted = false;
        self.entries.iter_mut()
    }
}

impl<I: Id, V: Element + EmptyValue> Extend<(I, V)> for SparseIndex<I, V> {
    fn extend<T: IntoIterator<Item = (I, V)>>(&mut self, iter: T) {
        for (id, value) in iter {
            self.set(id, value);
        }
    }
}

impl<I: Id, V: Element + EmptyValue> FromIterator<(I, V)> for SparseIndex<I, V> {
    /// Collects the pairs in iteration order. The result still needs a
    /// [`SparseIndex::sort`] unless the ids came in ascending order.
    fn from_iter<T: IntoIterator<Item = (I, V)>>(iter: T) -> Self {
        let mut index = SparseIndex::new();
        index.extend(iter);
        index
    }
}

/// A sparse index in its query phase: always sorted, no more inserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedSparseIndex<I, V> {
    entries: Vec<Entry<I, V>>,
}

impl<I: Id, V: Element + EmptyValue> SortedSparseIndex<I, V> {
    pub fn get(&self, id: I) -> Result<V> {
        self.get_opt(id).ok_or(Error::NotFound(id.as_u64()))
    }

    pub fn get_opt(&self, id: I) -> Option<V> {
        lower_bound(&self.entries, id).first().map(|entry| entry.value)
    }

    /// Every entry stored for `id`, in insertion order.
    pub fn get_all(&self, id: I) -> &[Entry<I, V>] {
        lower_bound(&self.entries, id)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn used_memory(&self) -> usize {
        self.entries.len() * Entry::<I, V>::SIZE
    }

    pub fn dump(&self, sink: &mut dyn Write) -> Result<()> {
        write_image(&self.entries, sink)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry<I, V>> {
        self.entries.iter()
    }

    /// Back to the build phase to append more entries.
    pub fn into_unsorted(self) -> SparseIndex<I, V> {
        SparseIndex {
            entries: self.entries,
            sorted: true,
        }
    }
}
