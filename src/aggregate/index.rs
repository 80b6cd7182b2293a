//! Key indices over aggregate elements

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::tuple::Tuple;
use crate::types::{same_projection, Error, KeyTuple, Projection, Result};

/// Mapping from projected key to the elements carrying it
///
/// Buckets keep elements in the order they were added to the index.
pub struct Index<T: ?Sized + Tuple = dyn Tuple> {
    projection: Arc<dyn Projection>,
    entries: HashMap<KeyTuple, Vec<Arc<T>>>,
}

impl<T: ?Sized + Tuple> Index<T> {
    /// Build an index over `elements`
    pub fn build(projection: Arc<dyn Projection>, elements: &[Arc<T>]) -> Result<Self> {
        let mut index = Self {
            projection,
            entries: HashMap::with_capacity(elements.len()),
        };
        for element in elements {
            let key = index.key_of(element)?;
            index.insert_keyed(key, Arc::clone(element));
        }
        Ok(index)
    }

    /// Projection this index is built from
    pub fn projection(&self) -> &Arc<dyn Projection> {
        &self.projection
    }

    /// Fail unless `projection` computes the same key as this index
    ///
    /// Indices are cached by projection name, so two different projections
    /// must not share one.
    pub fn check_projection(&self, projection: &Arc<dyn Projection>) -> Result<()> {
        if same_projection(&self.projection, projection) {
            Ok(())
        } else {
            Err(Error::definition(format!(
                "Index '{}' is already built from a different projection",
                projection.name()
            )))
        }
    }

    /// Projection name
    pub fn name(&self) -> &str {
        self.projection.name()
    }

    /// Key of `element` under this index
    pub fn key_of(&self, element: &T) -> Result<KeyTuple> {
        self.projection.project(element.as_dyn())
    }

    /// Elements carrying `key`, empty when none do
    pub fn get(&self, key: &KeyTuple) -> &[Arc<T>] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First element carrying `key`
    pub fn get_one(&self, key: &KeyTuple) -> Option<&Arc<T>> {
        self.entries.get(key).and_then(|bucket| bucket.first())
    }

    /// Whether any element carries `key`
    pub fn contains_key(&self, key: &KeyTuple) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct keys in arbitrary order
    pub fn keys(&self) -> impl Iterator<Item = &KeyTuple> {
        self.entries.keys()
    }

    pub(crate) fn insert_keyed(&mut self, key: KeyTuple, element: Arc<T>) {
        self.entries.entry(key).or_default().push(element);
    }

    /// Remove `element` (by identity) from the bucket of `key`
    pub(crate) fn remove_keyed(&mut self, key: &KeyTuple, element: &Arc<T>) -> bool {
        let Some(bucket) = self.entries.get_mut(key) else {
            return false;
        };
        let Some(pos) = bucket.iter().position(|e| Arc::ptr_eq(e, element)) else {
            return false;
        };
        bucket.remove(pos);
        if bucket.is_empty() {
            self.entries.remove(key);
        }
        true
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Total number of indexed elements
    pub fn element_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

impl<T: ?Sized + Tuple> Clone for Index<T> {
    fn clone(&self) -> Self {
        Self {
            projection: Arc::clone(&self.projection),
            entries: self.entries.clone(),
        }
    }
}

impl<T: ?Sized + Tuple> fmt::Debug for Index<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("projection", &self.projection.name())
            .field("keys", &self.entries.len())
            .finish()
    }
}
