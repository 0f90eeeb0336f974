use std::marker::PhantomData;

use crate::EntityRef;

/// The owning arena for one kind of entity.
///
/// Pushing a value allocates the next dense reference; references are never
/// reused, so a handle stays valid for as long as the map lives.
pub struct PrimaryMap<K: EntityRef, V> {
    data: Vec<V>,
    phantom: PhantomData<K>,
}

impl<K: EntityRef, V> Default for PrimaryMap<K, V> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            phantom: PhantomData,
        }
    }
}

impl<K: EntityRef, V: Clone> Clone for PrimaryMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            phantom: PhantomData,
        }
    }
}

impl<K: EntityRef, V: PartialEq> PartialEq for PrimaryMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<K: EntityRef + std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for PrimaryMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: EntityRef, V> PrimaryMap<K, V> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            phantom: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if `entity` was allocated by this map.
    #[inline]
    pub fn is_valid(&self, entity: K) -> bool {
        entity.index() < self.data.len()
    }

    /// The reference the next `push` will return.
    #[inline]
    pub fn next_key(&self) -> K {
        K::new(self.data.len())
    }

    #[inline]
    pub fn push(&mut self, value: V) -> K {
        let k = K::new(self.data.len());
        self.data.push(value);
        k
    }

    #[inline]
    pub fn get(&self, entity: K) -> Option<&V> {
        self.data.get(entity.index())
    }

    #[inline]
    pub fn get_mut(&mut self, entity: K) -> Option<&mut V> {
        self.data.get_mut(entity.index())
    }

    pub fn keys(&self) -> impl DoubleEndedIterator<Item = K> + ExactSizeIterator {
        (0..self.data.len()).map(K::new)
    }

    #[inline]
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.data.iter()
    }

    #[inline]
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.data.iter_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.data.iter().enumerate().map(|(i, v)| (K::new(i), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut V)> {
        self.data
            .iter_mut()
            .enumerate()
            .map(|(i, v)| (K::new(i), v))
    }
}

impl<K: EntityRef, V> std::ops::Index<K> for PrimaryMap<K, V> {
    type Output = V;

    /// # Panics
    ///
    /// Panics if the reference was not allocated by this map.
    #[inline]
    fn index(&self, entity: K) -> &Self::Output {
        &self.data[entity.index()]
    }
}

impl<K: EntityRef, V> std::ops::IndexMut<K> for PrimaryMap<K, V> {
    #[inline]
    fn index_mut(&mut self, entity: K) -> &mut Self::Output {
        &mut self.data[entity.index()]
    }
}

impl<K: EntityRef, V> FromIterator<V> for PrimaryMap<K, V> {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        Self {
            data: iter.into_iter().collect(),
            phantom: PhantomData,
        }
    }
}
