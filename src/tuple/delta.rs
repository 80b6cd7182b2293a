//! Change tracking between two states of a record
//!
//! A [`DeltaTuple`] reads through to its original record except where a
//! field is dirty. Dirty means the value actually changed: identity is
//! checked first, then value equality. Nested records produce nested
//! deltas, and a nested record going from present to null becomes a nested
//! delete.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::tuple::{check_writable, EditableTuple, FieldMask, Tuple, TupleRef, ValueTuple};
use crate::types::{Error, FieldSet, Result, Value};

/// Sparse overlay of changed fields on top of an original record
#[derive(Clone)]
pub struct DeltaTuple {
    field_set: Arc<FieldSet>,
    original: Option<TupleRef>,
    dirty: FieldMask,
    overlay: Vec<Value>,
    nested: BTreeMap<usize, Arc<DeltaTuple>>,
    delete: bool,
}

impl DeltaTuple {
    /// Empty delta over `original`, ready for [`EditableTuple::set`]
    pub fn edit(original: TupleRef) -> Self {
        let field_set = Arc::clone(original.field_set());
        Self::blank(field_set, Some(original))
    }

    /// Empty insert delta for a record of `field_set`
    pub fn insert(field_set: Arc<FieldSet>) -> Self {
        Self::blank(field_set, None)
    }

    /// Delta deleting `original`
    pub fn delete(original: TupleRef) -> Self {
        let mut delta = Self::edit(original);
        delta.delete = true;
        delta
    }

    fn blank(field_set: Arc<FieldSet>, original: Option<TupleRef>) -> Self {
        let len = field_set.len();
        Self {
            field_set,
            original,
            dirty: FieldMask::with_capacity(len),
            overlay: vec![Value::Null; len],
            nested: BTreeMap::new(),
            delete: false,
        }
    }

    /// Compute the change from `original` to `updated`
    ///
    /// A missing original describes an insert, a missing update a delete.
    pub fn between(original: Option<TupleRef>, updated: Option<&dyn Tuple>) -> Result<Self> {
        let (original, updated) = match (original, updated) {
            (None, None) => {
                return Err(Error::definition("A delta needs an original or an updated record"))
            }
            (Some(original), None) => return Ok(Self::delete(original)),
            (original, Some(updated)) => (original, updated),
        };

        if let Some(o) = &original {
            if !o.field_set().same_layout(updated.field_set()) {
                return Err(Error::type_mismatch(
                    o.field_set().owner().unwrap_or("<anonymous>"),
                    updated.field_set().owner().unwrap_or("<anonymous>"),
                ));
            }
        }

        let mut delta = Self::blank(Arc::clone(updated.field_set()), original);
        for field in updated.field_set().fields().iter().filter(|f| f.is_stored()) {
            delta.record(field.index(), updated.stored(field.index()))?;
        }
        Ok(delta)
    }

    /// Track `value` for `index`, comparing against the original
    fn record(&mut self, index: usize, value: Value) -> Result<()> {
        let before = self.original_value(index);
        self.nested.remove(&index);
        if before.same_ref(&value) || before == value {
            self.dirty.remove(index);
            self.overlay[index] = Value::Null;
            return Ok(());
        }

        match (before.as_record(), value.as_record()) {
            (Some(o), Some(u)) => {
                let nested = Self::between(Some(Arc::clone(o) as TupleRef), Some(u.as_dyn()))?;
                self.nested.insert(index, Arc::new(nested));
            }
            (Some(o), None) if value.is_null() => {
                self.nested.insert(index, Arc::new(Self::delete(Arc::clone(o) as TupleRef)));
            }
            _ => {}
        }
        self.dirty.insert(index);
        self.overlay[index] = value;
        Ok(())
    }

    fn original_value(&self, index: usize) -> Value {
        self.original.as_ref().map(|o| o.stored(index)).unwrap_or_default()
    }

    /// Copy of this delta reading through to `base` instead of its original
    ///
    /// Committed deltas are kept this way so that a version never holds a
    /// strong reference back to itself or to an older version of its chain.
    pub(crate) fn detached(&self, base: &ValueTuple) -> Self {
        Self {
            original: self.original.as_ref().map(|_| Arc::new(base.clone()) as TupleRef),
            ..self.clone()
        }
    }

    /// Record this delta was computed against
    pub fn original(&self) -> Option<&TupleRef> {
        self.original.as_ref()
    }

    /// Whether applying this delta removes the record
    pub fn is_delete(&self) -> bool {
        self.delete
    }

    /// Whether this delta creates a record
    pub fn is_insert(&self) -> bool {
        self.original.is_none() && !self.delete
    }

    /// Whether nothing changes
    pub fn is_empty(&self) -> bool {
        !self.delete && self.dirty.is_empty()
    }

    /// Whether the field at `index` changed
    pub fn is_dirty(&self, index: usize) -> bool {
        self.dirty.contains(index)
    }

    /// Indices of changed fields
    pub fn dirty_fields(&self) -> Vec<usize> {
        self.dirty.iter().collect()
    }

    /// Names of changed fields
    pub fn dirty_names(&self) -> Vec<String> {
        let fields = self.field_set.fields();
        self.dirty.iter().map(|i| fields[i].name().to_string()).collect()
    }

    /// Nested delta of a record-valued field
    pub fn nested(&self, index: usize) -> Option<&Arc<DeltaTuple>> {
        self.nested.get(&index)
    }

    /// The updated record, or `None` for a delete
    pub fn freeze(&self) -> Option<ValueTuple> {
        if self.delete {
            return None;
        }
        Some(self.snapshot())
    }

    /// Apply the dirty fields on top of `target`
    ///
    /// Returns `None` when this delta is a delete.
    pub fn apply_to(&self, target: &dyn Tuple) -> Result<Option<ValueTuple>> {
        if self.delete {
            return Ok(None);
        }
        if !target.field_set().same_layout(&self.field_set) {
            return Err(Error::type_mismatch(
                self.field_set.owner().unwrap_or("<anonymous>"),
                target.field_set().owner().unwrap_or("<anonymous>"),
            ));
        }
        let mut values = target.stored_values();
        for index in self.dirty.iter() {
            values[index] = self.overlay[index].clone();
        }
        let applied = ValueTuple::from_parts(Arc::clone(target.field_set()), values);
        Ok(Some(match target.base_extent() {
            Some(base) => applied.with_base(Arc::clone(base)),
            None => applied,
        }))
    }

    /// Fields both deltas change to different values
    ///
    /// A delete overlaps every field the other delta changes.
    pub fn overlapping(&self, other: &DeltaTuple) -> Vec<usize> {
        match (self.delete, other.delete) {
            (true, true) => Vec::new(),
            (true, false) => other.dirty_fields(),
            (false, true) => self.dirty_fields(),
            (false, false) => self
                .dirty
                .iter()
                .filter(|&i| other.dirty.contains(i) && self.overlay[i] != other.overlay[i])
                .collect(),
        }
    }
}

impl Tuple for DeltaTuple {
    fn field_set(&self) -> &Arc<FieldSet> {
        &self.field_set
    }

    fn stored(&self, index: usize) -> Value {
        if self.dirty.contains(index) {
            self.overlay[index].clone()
        } else {
            self.original_value(index)
        }
    }

    fn as_dyn(&self) -> &dyn Tuple {
        self
    }

    fn is_mutable(&self) -> bool {
        true
    }

    fn base_extent(&self) -> Option<&Arc<ValueTuple>> {
        self.original.as_ref().and_then(|o| o.base_extent())
    }
}

impl EditableTuple for DeltaTuple {
    fn set(&mut self, index: usize, value: Value) -> Result<()> {
        if self.delete {
            return Err(Error::read_only("delta is a delete"));
        }
        check_writable(&self.field_set, index)?;
        self.record(index, value)
    }
}

impl fmt::Debug for DeltaTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("DeltaTuple");
        s.field("owner", &self.field_set.owner());
        if self.delete {
            s.field("delete", &true);
        } else {
            let changes: Vec<String> = self
                .dirty
                .iter()
                .map(|i| format!("{}={}", self.field_set.fields()[i].name(), self.overlay[i]))
                .collect();
            s.field("insert", &self.is_insert()).field("changes", &changes);
        }
        s.finish()
    }
}
