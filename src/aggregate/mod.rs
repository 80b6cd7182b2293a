//! Ordered record collections with secondary indices
//!
//! An [`Aggregate`] is an immutable, ordered view over records of one
//! content scheme. Indices are built lazily the first time a projection is
//! queried and cached by projection name. [`EditableAggregate`] is the
//! single-writer variant: every index it has built stays consistent across
//! add, remove, replace and bulk extend.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::tuple::Tuple;
use crate::types::{Error, FieldSet, KeyTuple, Projection, Result};

/// Key indices
pub mod index;
/// Single-writer aggregates
pub mod editable;

pub use editable::EditableAggregate;
pub use index::Index;

#[cfg(test)]
mod tests;

/// Immutable ordered collection of records
pub struct Aggregate<T: ?Sized + Tuple = dyn Tuple> {
    content: Arc<FieldSet>,
    elements: Arc<[Arc<T>]>,
    indices: DashMap<Arc<str>, Arc<Index<T>>>,
}

impl<T: ?Sized + Tuple> Aggregate<T> {
    /// Create a view, checking every element against `content`
    pub fn new(content: Arc<FieldSet>, elements: Vec<Arc<T>>) -> Result<Self> {
        for element in &elements {
            check_content(&content, element.as_dyn())?;
        }
        Ok(Self::from_parts(content, elements.into()))
    }

    pub(crate) fn from_parts(content: Arc<FieldSet>, elements: Arc<[Arc<T>]>) -> Self {
        Self {
            content,
            elements,
            indices: DashMap::new(),
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

    /// Element at `position`
    pub fn at(&self, position: usize) -> Result<&Arc<T>> {
        self.elements.get(position).ok_or(Error::IndexOutOfBounds {
            index: position,
            size: self.elements.len(),
        })
    }

    /// Elements in order
    pub fn elements(&self) -> &[Arc<T>] {
        &self.elements
    }

    /// Iterate elements in order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.elements.iter()
    }

    /// Projection of the content scheme's key called `name`
    pub fn key(&self, name: &str) -> Result<Arc<dyn Projection>> {
        key_projection(&self.content, name)
    }

    /// Index for `projection`, building it when `create` is set
    pub fn get_index(&self, projection: &Arc<dyn Projection>, create: bool) -> Result<Option<Arc<Index<T>>>> {
        if let Some(index) = self.indices.get(projection.name()) {
            index.check_projection(projection)?;
            return Ok(Some(Arc::clone(index.value())));
        }
        if !create {
            return Ok(None);
        }
        let built = Arc::new(Index::build(Arc::clone(projection), &self.elements)?);
        let entry = self
            .indices
            .entry(Arc::from(projection.name()))
            .or_insert(built);
        entry.check_projection(projection)?;
        Ok(Some(Arc::clone(entry.value())))
    }

    /// Elements whose projection equals `key`, as a new view
    pub fn get(&self, projection: &Arc<dyn Projection>, key: &KeyTuple) -> Result<Aggregate<T>> {
        let subset: Vec<Arc<T>> = match self.get_index(projection, true)? {
            Some(index) => index.get(key).to_vec(),
            None => Vec::new(),
        };
        Ok(Self::from_parts(Arc::clone(&self.content), subset.into()))
    }

    /// One element whose projection equals `key`
    pub fn get_one(&self, projection: &Arc<dyn Projection>, key: &KeyTuple) -> Result<Option<Arc<T>>> {
        Ok(self
            .get_index(projection, true)?
            .and_then(|index| index.get_one(key).cloned()))
    }

    /// Editable copy; built indices are carried over
    pub fn to_editable(&self) -> EditableAggregate<T> {
        let indices = self
            .indices
            .iter()
            .map(|entry| (Arc::clone(entry.key()), (**entry.value()).clone()))
            .collect();
        EditableAggregate::from_parts(Arc::clone(&self.content), self.elements.to_vec(), indices)
    }
}

impl<T: ?Sized + Tuple> Clone for Aggregate<T> {
    fn clone(&self) -> Self {
        Self::from_parts(Arc::clone(&self.content), Arc::clone(&self.elements))
    }
}

impl<T: ?Sized + Tuple> fmt::Debug for Aggregate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregate")
            .field("content", &self.content.owner())
            .field("len", &self.elements.len())
            .field("indices", &self.indices.len())
            .finish()
    }
}

pub(crate) fn check_content(content: &FieldSet, element: &dyn Tuple) -> Result<()> {
    if content.same_layout(element.field_set()) {
        Ok(())
    } else {
        Err(Error::type_mismatch(
            content.owner().unwrap_or("<anonymous>"),
            element.field_set().owner().unwrap_or("<anonymous>"),
        ))
    }
}

pub(crate) fn key_projection(content: &FieldSet, name: &str) -> Result<Arc<dyn Projection>> {
    content
        .key(name)
        .map(|key| Arc::clone(key) as Arc<dyn Projection>)
        .ok_or_else(|| Error::definition(format!("No key '{}' on {}", name, content.owner().unwrap_or("<anonymous>"))))
}
