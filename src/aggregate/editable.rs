//! Single-writer aggregate keeping its indices live
//!
//! Every mutation computes the keys of the affected elements for every built
//! index before touching anything, so a failing projection leaves both the
//! sequence and the indices unchanged.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::aggregate::{check_content, key_projection, Aggregate, Index};
use crate::log_trace;
use crate::tuple::Tuple;
use crate::types::{Error, FieldSet, KeyTuple, Projection, Result};

/// Ordered, mutable collection of records
pub struct EditableAggregate<T: ?Sized + Tuple = dyn Tuple> {
    content: Arc<FieldSet>,
    elements: Vec<Arc<T>>,
    indices: HashMap<Arc<str>, Index<T>>,
}

impl<T: ?Sized + Tuple> EditableAggregate<T> {
    /// Empty aggregate over `content`
    pub fn new(content: Arc<FieldSet>) -> Self {
        Self::from_parts(content, Vec::new(), HashMap::new())
    }

    pub(crate) fn from_parts(
        content: Arc<FieldSet>,
        elements: Vec<Arc<T>>,
        indices: HashMap<Arc<str>, Index<T>>,
    ) -> Self {
        Self {
            content,
            elements,
            indices,
        }
    }

    /// Scheme every element follows
    pub fn content(&self) -> &Arc<FieldSet> {
        &self.content
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether there are no elements
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Elements in order
    pub fn elements(&self) -> &[Arc<T>] {
        &self.elements
    }

    /// Element at `position`
    pub fn at(&self, position: usize) -> Result<&Arc<T>> {
        self.elements.get(position).ok_or(Error::IndexOutOfBounds {
            index: position,
            size: self.elements.len(),
        })
    }

    /// Position of `element` by identity
    pub fn position(&self, element: &Arc<T>) -> Option<usize> {
        self.elements.iter().position(|e| Arc::ptr_eq(e, element))
    }

    /// Keys of `element` under every built index
    fn keys_of(&self, element: &Arc<T>) -> Result<Vec<(Arc<str>, KeyTuple)>> {
        check_content(&self.content, element.as_dyn())?;
        self.indices
            .iter()
            .map(|(name, index)| Ok((Arc::clone(name), index.key_of(element)?)))
            .collect()
    }

    fn index_keyed(&mut self, keys: Vec<(Arc<str>, KeyTuple)>, element: &Arc<T>) {
        for (name, key) in keys {
            if let Some(index) = self.indices.get_mut(&name) {
                index.insert_keyed(key, Arc::clone(element));
            }
        }
    }

    fn unindex(&mut self, element: &Arc<T>) -> Result<()> {
        let keys = self.keys_of(element)?;
        for (name, key) in keys {
            if let Some(index) = self.indices.get_mut(&name) {
                index.remove_keyed(&key, element);
            }
        }
        Ok(())
    }

    /// Append `element`
    pub fn push(&mut self, element: Arc<T>) -> Result<()> {
        let keys = self.keys_of(&element)?;
        self.index_keyed(keys, &element);
        self.elements.push(element);
        Ok(())
    }

    /// Insert `element` at `position`
    pub fn insert(&mut self, position: usize, element: Arc<T>) -> Result<()> {
        if position > self.elements.len() {
            return Err(Error::IndexOutOfBounds {
                index: position,
                size: self.elements.len(),
            });
        }
        let keys = self.keys_of(&element)?;
        self.index_keyed(keys, &element);
        self.elements.insert(position, element);
        Ok(())
    }

    /// Remove and return the element at `position`
    pub fn remove_at(&mut self, position: usize) -> Result<Arc<T>> {
        let element = Arc::clone(self.at(position)?);
        self.unindex(&element)?;
        Ok(self.elements.remove(position))
    }

    /// Remove `element` by identity; returns whether it was present
    pub fn remove(&mut self, element: &Arc<T>) -> Result<bool> {
        match self.position(element) {
            Some(position) => self.remove_at(position).map(|_| true),
            None => Ok(false),
        }
    }

    /// Replace the element at `position`, returning the old one
    pub fn replace(&mut self, position: usize, element: Arc<T>) -> Result<Arc<T>> {
        let old = Arc::clone(self.at(position)?);
        let keys = self.keys_of(&element)?;
        self.unindex(&old)?;
        self.index_keyed(keys, &element);
        Ok(std::mem::replace(&mut self.elements[position], element))
    }

    /// Append every element of `elements`, keeping built indices current
    ///
    /// All keys are computed up front; on error nothing is added.
    pub fn extend(&mut self, elements: impl IntoIterator<Item = Arc<T>>) -> Result<()> {
        let staged = elements
            .into_iter()
            .map(|e| self.keys_of(&e).map(|keys| (e, keys)))
            .collect::<Result<Vec<_>>>()?;
        log_trace!("Bulk extending aggregate by {} elements", staged.len());
        self.elements.reserve(staged.len());
        for (element, keys) in staged {
            self.index_keyed(keys, &element);
            self.elements.push(element);
        }
        Ok(())
    }

    /// Remove every element; built indices stay registered but empty
    pub fn clear(&mut self) {
        self.elements.clear();
        self.indices.values_mut().for_each(Index::clear);
    }

    /// Projection of the content scheme's key called `name`
    pub fn key(&self, name: &str) -> Result<Arc<dyn Projection>> {
        key_projection(&self.content, name)
    }

    /// Already built index called `name`
    pub fn index(&self, name: &str) -> Option<&Index<T>> {
        self.indices.get(name)
    }

    /// Index for `projection`, building it when `create` is set
    pub fn get_index(&mut self, projection: &Arc<dyn Projection>, create: bool) -> Result<Option<&Index<T>>> {
        match self.indices.get(projection.name()) {
            Some(index) => index.check_projection(projection)?,
            None if !create => return Ok(None),
            None => {
                let built = Index::build(Arc::clone(projection), &self.elements)?;
                self.indices.insert(Arc::from(projection.name()), built);
            }
        }
        Ok(self.indices.get(projection.name()))
    }

    /// Elements whose projection equals `key`, as a view
    pub fn get(&mut self, projection: &Arc<dyn Projection>, key: &KeyTuple) -> Result<Aggregate<T>> {
        let content = Arc::clone(&self.content);
        let subset: Vec<Arc<T>> = self
            .get_index(projection, true)?
            .map(|index| index.get(key).to_vec())
            .unwrap_or_default();
        Ok(Aggregate::from_parts(content, subset.into()))
    }

    /// One element whose projection equals `key`
    pub fn get_one(&mut self, projection: &Arc<dyn Projection>, key: &KeyTuple) -> Result<Option<Arc<T>>> {
        Ok(self
            .get_index(projection, true)?
            .and_then(|index| index.get_one(key).cloned()))
    }

    /// Immutable view of the current contents
    pub fn snapshot(&self) -> Aggregate<T> {
        Aggregate::from_parts(Arc::clone(&self.content), self.elements.clone().into())
    }
}

impl<T: ?Sized + Tuple> fmt::Debug for EditableAggregate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditableAggregate")
            .field("content", &self.content.owner())
            .field("len", &self.elements.len())
            .field("indices", &self.indices.keys().collect::<Vec<_>>())
            .finish()
    }
}
