//! An ordered key/value mapping with structural diffing.
//!
//! [`OrderedMap`] preserves insertion (and explicit reorder) order while
//! keeping O(1) amortized key lookup. [`OrderedMap::diff`] compares two
//! versions of a collection and reports the deletions, insertions, and moves
//! that turn one into the other, which is exactly the shape animated list
//! updates want.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct OrderedMap<K, V> {
    keys: Vec<K>,
    entries: HashMap<K, V>,
}

/// The structural difference between two [`OrderedMap`] versions.
///
/// `deleted` indices are positions in the *old* ordering, `inserted` indices
/// are positions in the *new* ordering, and `moved` pairs are
/// `(old_index, new_index)` for keys present in both at different positions.
/// Computing a diff never mutates either collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub deleted: Vec<usize>,
    pub inserted: Vec<usize>,
    pub moved: Vec<(usize, usize)>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.inserted.is_empty() && self.moved.is_empty()
    }
}

impl<K, V> OrderedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    /// The current position of `key`, if present.
    pub fn index_of(&self, key: &K) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    /// The entry at position `index` in the current ordering.
    pub fn get_index(&self, index: usize) -> Option<(&K, &V)> {
        let key = self.keys.get(index)?;
        Some((key, &self.entries[key]))
    }

    /// Appends an entry at the tail. If the key already exists, its value is
    /// replaced and its position is unchanged.
    pub fn append(&mut self, key: K, value: V) {
        if self.entries.insert(key.clone(), value).is_none() {
            self.keys.push(key);
        }
    }

    /// Inserts an entry at `index`, shifting later entries. An existing key
    /// is first removed from its old position.
    pub fn insert(&mut self, index: usize, key: K, value: V) {
        if self.entries.insert(key.clone(), value).is_some() {
            if let Some(old) = self.keys.iter().position(|k| *k == key) {
                self.keys.remove(old);
            }
        }
        let index = index.min(self.keys.len());
        self.keys.insert(index, key);
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.entries.remove(key)?;
        if let Some(index) = self.keys.iter().position(|k| k == key) {
            self.keys.remove(index);
        }
        Some(value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.keys.iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.keys.iter().map(move |k| (k, &self.entries[k]))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.keys.iter().map(move |k| &self.entries[k])
    }

    /// Returns a reordered copy sorted by the given comparator.
    pub fn sorted_by<F>(&self, mut compare: F) -> Self
    where
        V: Clone,
        F: FnMut((&K, &V), (&K, &V)) -> std::cmp::Ordering,
    {
        let mut keys = self.keys.clone();
        keys.sort_by(|a, b| compare((a, &self.entries[a]), (b, &self.entries[b])));
        Self {
            keys,
            entries: self.entries.clone(),
        }
    }

    /// Computes the structural difference from `self` (old) to `new`.
    pub fn diff(&self, new: &Self) -> Diff {
        let new_positions: HashMap<&K, usize> =
            new.keys.iter().enumerate().map(|(i, k)| (k, i)).collect();

        let mut diff = Diff::default();
        for (old_index, key) in self.keys.iter().enumerate() {
            match new_positions.get(key) {
                None => diff.deleted.push(old_index),
                Some(&new_index) if new_index != old_index => {
                    diff.moved.push((old_index, new_index));
                }
                Some(_) => {}
            }
        }
        for (new_index, key) in new.keys.iter().enumerate() {
            if !self.entries.contains_key(key) {
                diff.inserted.push(new_index);
            }
        }
        diff
    }
}

impl<K: Eq + Hash + Clone, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone, V> FromIterator<(K, V)> for OrderedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.append(key, value);
        }
        map
    }
}
