use std::fs::File;
use std::io::Write;
use std::marker::PhantomData;
use std::path::Path;

use tracing::debug;

use crate::element::{Element, EmptyValue, Id};
use crate::error::{Error, Result};
use crate::image::{read_image, write_image};
use crate::map::IdMap;

/// A direct-indexed map from ids to values.
/// Ids are used as offsets into an internal vector.
/// Slots that were never set hold `V::EMPTY` as a sentinel value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseIndex<I, V> {
    slots: Vec<V>,
    _id: PhantomData<I>,
}

impl<I: Id, V: Element + EmptyValue> DenseIndex<I, V> {
    /// Creates an empty `DenseIndex`.
    pub fn new() -> Self {
        Self::from_slots(Vec::new())
    }

    /// Creates an empty `DenseIndex` with room for ids below `capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_slots(Vec::with_capacity(capacity))
    }

    fn from_slots(slots: Vec<V>) -> Self {
        Self {
            slots,
            _id: PhantomData,
        }
    }

    /// Builds an index from the raw image held in `file`, as written by
    /// [`DenseIndex::dump`].
    ///
    /// # Arguments
    ///
    /// * `file` - An open, readable file whose length is a multiple of the
    ///   value size and which holds at most one slot per possible id.
    pub fn from_file(file: &File) -> Result<Self> {
        let slots: Vec<V> = read_image(file)?;
        if let Some(last) = slots.len().checked_sub(1)
            && last as u64 > I::MAX_ID
        {
            return Err(Error::TooManySlots {
                slots: slots.len(),
                max_id: I::MAX_ID,
            });
        }
        Ok(Self::from_slots(slots))
    }

    /// Opens and loads the raw image at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file(&File::open(path)?)
    }

    /// Pre-allocates room for at least `additional` more slots.
    /// The number of slots does not change.
    pub fn reserve(&mut self, additional: usize) {
        self.slots.reserve(additional);
    }

    /// Inserts or updates the value for the given id.
    /// Grows the slot vector if the id is beyond the last slot; every new
    /// slot in between is filled with `V::EMPTY`.
    ///
    /// # Arguments
    ///
    /// * `id` - The id to insert.
    /// * `value` - The value to associate with the id.
    ///
    /// # Panics
    ///
    /// If `id` cannot be addressed on this platform, like any other
    /// allocation failure.
    pub fn set(&mut self, id: I, value: V) {
        let index = match id.to_index() {
            Some(index) if index < usize::MAX => index,
            _ => panic!("id {id} exceeds the addressable slot range"),
        };
        if index >= self.slots.len() {
            if index >= self.slots.capacity() {
                debug!(
                    from = self.slots.len(),
                    to = index + 1,
                    "growing dense index"
                );
            }
            self.slots.resize(index + 1, V::EMPTY);
        }
        self.slots[index] = value;
    }

    /// Retrieves the value stored for the given id.
    ///
    /// # Returns
    ///
    /// * `Ok(value)` if the slot exists and is not empty, or
    ///   `Err(Error::NotFound)` otherwise.
    pub fn get(&self, id: I) -> Result<V> {
        self.get_opt(id).ok_or(Error::NotFound(id.as_u64()))
    }

    /// Retrieves the value stored for the given id, if present.
    #[inline(always)]
    pub fn get_opt(&self, id: I) -> Option<V> {
        match id.to_index().and_then(|index| self.slots.get(index)) {
            Some(&value) if !value.is_empty() => Some(value),
            _ => None,
        }
    }

    /// Number of slots, one more than the highest id ever set.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bytes taken by the slots, `size() * size_of::<V>()`.
    pub fn used_memory(&self) -> usize {
        self.slots.len() * V::SIZE
    }

    /// Removes every slot and gives the memory back to the allocator.
    pub fn clear(&mut self) {
        debug!(slots = self.slots.len(), "clearing dense index");
        self.slots = Vec::new();
    }

    /// Writes every slot, empty ones included, as a raw array image.
    pub fn dump(&self, sink: &mut dyn Write) -> Result<()> {
        write_image(&self.slots, sink)
    }

    /// Returns a vector of all ids that have an associated value.
    ///
    /// # Returns
    ///
    /// * `Vec<I>` containing all ids with set values, in ascending order.
    pub fn keys(&self) -> Vec<I> {
        self.entries().map(|(id, _)| id).collect()
    }

    /// Iterates over the `(id, value)` pairs of the non-empty slots.
    pub fn entries(&self) -> impl Iterator<Item = (I, V)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, &value)| {
                if value.is_empty() {
                    None
                } else {
                    Some((I::from_index(index), value))
                }
            })
    }

    /// All slots in id order.
    pub fn as_slice(&self) -> &[V] {
        &self.slots
    }

    /// Iterates over all slots in id order, empty slots included.
    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, V> {
        self.slots.iter_mut()
    }
}

impl<I: Id, V: Element + EmptyValue> Default for DenseIndex<I, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Id, V: Element + EmptyValue> IdMap<I, V> for DenseIndex<I, V> {
    fn reserve(&mut self, additional: usize) {
        DenseIndex::reserve(self, additional)
    }

    fn set(&mut self, id: I, value: V) {
        DenseIndex::set(self, id, value)
    }

    fn get(&self, id: I) -> Result<V> {
        DenseIndex::get(self, id)
    }

    fn get_opt(&self, id: I) -> Option<V> {
        DenseIndex::get_opt(self, id)
    }

    fn size(&self) -> usize {
        DenseIndex::size(self)
    }

    fn used_memory(&self) -> usize {
        DenseIndex::used_memory(self)
    }

    fn clear(&mut self) {
        DenseIndex::clear(self)
    }

    fn dump(&self, sink: &mut dyn Write) -> Result<()> {
        DenseIndex::dump(self, sink)
    }

    fn name(&self) -> &'static str {
        "dense"
    }
}

impl<'a, I, V> IntoIterator for &'a DenseIndex<I, V> {
    type Item = &'a V;
    type IntoIter = std::slice::Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.iter()
    }
}

impl<'a, I, V> IntoIterator for &'a mut DenseIndex<I, V> {
    type Item = &'a mut V;
    type IntoIter = std::slice::IterMut<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.iter_mut()
    }
}

impl<I: Id, V: Element + EmptyValue> Extend<(I, V)> for DenseIndex<I, V> {
    fn extend<T: IntoIterator<Item = (I, V)>>(&mut self, iter: T) {
        for (id, value) in iter {
            self.set(id, value);
        }
    }
}

impl<I: Id, V: Element + EmptyValue> FromIterator<(I, V)> for DenseIndex<I, V> {
    /// Constructs a `DenseIndex` from an iterator of `(id, value)` pairs.
    /// The index is sized once to fit the largest id.
    fn from_iter<T: IntoIterator<Item = (I, V)>>(iter: T) -> Self {
        let pairs: Vec<(I, V)> = iter.into_iter().collect();

        // Find the maximum id to determine initial size
        let capacity = pairs
            .iter()
            .map(|&(id, _)| id)
            .max()
            .and_then(Id::to_index)
            .map_or(0, |index| index.saturating_add(1));

        let mut map = DenseIndex::with_capacity(capacity);
        map.extend(pairs);
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Location;
    use std::io::{Seek, SeekFrom};

    #[test]
    fn test_new_creates_empty_map() {
        let map = DenseIndex::<u32, u32>::new();
        assert_eq!(map.size(), 0);
        assert_eq!(map.get_opt(0), None);
        assert!(matches!(map.get(5), Err(Error::NotFound(5))));
    }

    #[test]
    fn test_set_grows_and_fills_gaps() {
        let mut map = DenseIndex::<u32, u32>::new();
        map.set(5, 42);
        assert_eq!(map.size(), 6);
        assert_eq!(map.get(5).unwrap(), 42);
        for id in 0..5 {
            assert!(matches!(map.get(id), Err(Error::NotFound(n)) if n == id as u64));
        }
        assert!(matches!(map.get(6), Err(Error::NotFound(6))));
        assert_eq!(&map.as_slice()[..5], &[u32::MAX; 5]);
    }

    #[test]
    fn test_set_overwrites_existing_value() {
        let mut map = DenseIndex::<u32, u32>::new();
        map.set(3, 50);
        map.set(3, 75);
        assert_eq!(map.get(3).unwrap(), 75);
        assert_eq!(map.size(), 4);
    }

    #[test]
    fn test_set_below_size_does_not_shrink() {
        let mut map = DenseIndex::<u64, u32>::new();
        map.set(10, 1);
        map.set(2, 2);
        assert_eq!(map.size(), 11);
        assert_eq!(map.get(10).unwrap(), 1);
        assert_eq!(map.get(2).unwrap(), 2);
    }

    #[test]
    fn test_sentinel_value_reads_as_missing() {
        let mut map = DenseIndex::<u32, u32>::new();
        map.set(1, u32::MAX);
        assert_eq!(map.size(), 2);
        assert_eq!(map.get_opt(1), None);
    }

    #[test]
    fn test_reserve_keeps_size() {
        let mut map = DenseIndex::<u32, u64>::new();
        map.reserve(1000);
        assert_eq!(map.size(), 0);
        assert_eq!(map.used_memory(), 0);
    }

    #[test]
    fn test_used_memory() {
        let mut map = DenseIndex::<u32, u64>::new();
        map.set(99, 1);
        assert_eq!(map.used_memory(), 100 * 8);

        let mut locations = DenseIndex::<u64, Location>::new();
        locations.set(3, Location::new(1, 2));
        assert_eq!(locations.used_memory(), 4 * 8);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut map = DenseIndex::<u32, u32>::new();
        map.set(7, 70);
        map.clear();
        assert_eq!(map.size(), 0);
        assert_eq!(map.used_memory(), 0);
        assert!(map.get(7).is_err());
        assert_eq!(map.as_slice().len(), 0);
    }

    #[test]
    fn test_keys_method() {
        let mut map = DenseIndex::<u32, u32>::new();
        map.set(2, 20);
        map.set(8, 80);
        map.set(5, 50);

        assert_eq!(map.keys(), vec![2, 5, 8]);
        let entries: Vec<(u32, u32)> = map.entries().collect();
        assert_eq!(entries, vec![(2, 20), (5, 50), (8, 80)]);
    }

    #[test]
    fn test_keys_empty_map() {
        let map = DenseIndex::<u32, u32>::new();
        assert_eq!(map.keys(), Vec::<u32>::new());
    }

    #[test]
    fn test_iteration_includes_gaps() {
        let mut map = DenseIndex::<u16, u8>::new();
        map.set(2, 9);
        let slots: Vec<u8> = map.iter().copied().collect();
        assert_eq!(slots, vec![u8::MAX, u8::MAX, 9]);

        // restartable
        assert_eq!((&map).into_iter().count(), 3);
        assert_eq!(map.iter().count(), 3);
    }

    #[test]
    fn test_iter_mut() {
        let mut map = DenseIndex::<u32, u32>::new();
        map.set(0, 1);
        map.set(1, 2);
        for value in &mut map {
            *value *= 10;
        }
        assert_eq!(map.get(0).unwrap(), 10);
        assert_eq!(map.get(1).unwrap(), 20);
    }

    #[test]
    fn test_from_iterator() {
        let map: DenseIndex<u32, u32> = vec![(4, 40), (0, 0), (2, 20)].into_iter().collect();
        assert_eq!(map.size(), 5);
        assert_eq!(map.get(0).unwrap(), 0);
        assert_eq!(map.get(4).unwrap(), 40);
        assert!(map.get(3).is_err());
    }

    #[test]
    fn test_dump_length() {
        let mut map = DenseIndex::<u32, u32>::new();
        map.set(5, 42);
        let mut bytes = Vec::new();
        map.dump(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 6 * 4);
        assert_eq!(&bytes[20..24], &42u32.to_ne_bytes());
        assert_eq!(&bytes[0..4], &[0xFF; 4]);
    }

    #[test]
    fn test_dump_and_reload() {
        let mut map = DenseIndex::<u64, Location>::new();
        map.set(1, Location::from_degrees(7.5, 47.25));
        map.set(4, Location::from_degrees(-0.1, 51.5));

        let mut file = tempfile::tempfile().unwrap();
        map.dump(&mut file).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(file.metadata().unwrap().len(), 5 * 8);

        let loaded = DenseIndex::<u64, Location>::from_file(&file).unwrap();
        assert_eq!(loaded, map);
        assert_eq!(loaded.get(4).unwrap(), Location::from_degrees(-0.1, 51.5));
        assert!(loaded.get(0).is_err());
        assert!(loaded.get(2).is_err());
    }

    #[test]
    fn test_reload_rejects_slots_beyond_id_range() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&vec![0u8; 70_000]).unwrap();
        let result = DenseIndex::<u16, u8>::from_file(&file);
        assert!(matches!(
            result,
            Err(Error::TooManySlots {
                slots: 70_000,
                max_id: 65_535
            })
        ));
    }

    #[test]
    fn test_reload_full_id_range() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&vec![0u8; 65_536]).unwrap();
        let loaded = DenseIndex::<u16, u8>::from_file(&file).unwrap();
        let keys = loaded.keys();
        assert_eq!(keys.len(), 65_536);
        assert_eq!(keys.last(), Some(&u16::MAX));
        assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dense.idx");

        let map: DenseIndex<u32, u64> = vec![(3, 30), (1, 10)].into_iter().collect();
        let mut file = File::create(&path).unwrap();
        map.dump(&mut file).unwrap();
        drop(file);

        let loaded = DenseIndex::<u32, u64>::load(&path).unwrap();
        assert_eq!(loaded.keys(), vec![1, 3]);
        assert_eq!(loaded.get(3).unwrap(), 30);
    }
}
