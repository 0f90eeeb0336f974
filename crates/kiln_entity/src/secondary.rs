use crate::EntityRef;

use std::{
    marker::PhantomData,
    ops::{Index, IndexMut},
};

/// Side table keyed by entities allocated elsewhere.
///
/// Every key reads as the default value until it is written; writing past
/// the end grows the table.
#[derive(Clone)]
pub struct SecondaryMap<K, V>
where
    K: EntityRef,
    V: Clone,
{
    default: V,
    data: Vec<V>,
    phantom: PhantomData<K>,
}

impl<K, V> SecondaryMap<K, V>
where
    K: EntityRef,
    V: Clone,
{
    pub fn new() -> Self
    where
        V: Default,
    {
        Self::with_default(V::default())
    }

    /// Table pre-sized for `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self
    where
        V: Default,
    {
        Self {
            default: V::default(),
            data: Vec::with_capacity(capacity),
            phantom: PhantomData,
        }
    }

    pub fn with_default(default: V) -> Self {
        Self {
            default,
            data: Vec::new(),
            phantom: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn get(&self, key: K) -> &V {
        self.data.get(key.index()).unwrap_or(&self.default)
    }

    /// Iterates over the keys that have storage, written or not.
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.data.iter().enumerate().map(|(i, v)| (K::new(i), v))
    }
}

impl<K, V> Default for SecondaryMap<K, V>
where
    K: EntityRef,
    V: Clone + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Index<K> for SecondaryMap<K, V>
where
    K: EntityRef,
    V: Clone,
{
    type Output = V;

    fn index(&self, key: K) -> &V {
        self.get(key)
    }
}

impl<K, V> IndexMut<K> for SecondaryMap<K, V>
where
    K: EntityRef,
    V: Clone,
{
    fn index_mut(&mut self, key: K) -> &mut V {
        let index = key.index();
        if index >= self.data.len() {
            self.data.resize(index + 1, self.default.clone());
        }
        &mut self.data[index]
    }
}
