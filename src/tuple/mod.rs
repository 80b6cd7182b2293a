//! The record hierarchy
//!
//! [`Tuple`] is the read contract every record representation implements:
//! immutable [`ValueTuple`]s, mutable [`MutableTuple`]s, sparse
//! [`DeltaTuple`]s, accumulating [`BufferTuple`]s and versioned
//! [`JournalTuple`]s. Equality between records is defined field by field in
//! scheme order and never depends on the backing representation.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::types::{Error, FieldSet, Result, Value};

/// Field bitmask
pub mod mask;
/// Immutable and mutable value-backed tuples
pub mod value_tuple;
/// Change tracking
pub mod delta;
/// Ambient transaction id
pub mod transaction;
/// Versioned records
pub mod journal;
/// Accumulating edit surface
pub mod buffer;

pub use buffer::{BufferTuple, Origin};
pub use delta::DeltaTuple;
pub use journal::{JournalTuple, PreparedUpdate};
pub use mask::FieldMask;
pub use transaction::{TransactionContext, TransactionGuard};
pub use value_tuple::{MutableTuple, ValueTuple};

/// Shared, type-erased record
pub type TupleRef = Arc<dyn Tuple>;

/// Read access to one structured record
pub trait Tuple: Send + Sync + std::fmt::Debug {
    /// Scheme this record follows
    fn field_set(&self) -> &Arc<FieldSet>;

    /// Stored value at `index`
    ///
    /// Callers guarantee `index < self.len()`. Computed fields are never
    /// read through this method.
    fn stored(&self, index: usize) -> Value;

    /// This record as a trait object
    fn as_dyn(&self) -> &dyn Tuple;

    /// Whether the record accepts writes
    fn is_mutable(&self) -> bool {
        false
    }

    /// Extent holding the fields of the next base-type level, if any
    fn base_extent(&self) -> Option<&Arc<ValueTuple>> {
        None
    }

    /// Number of fields
    fn len(&self) -> usize {
        self.field_set().len()
    }

    /// Whether the scheme has no fields
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bounds-checked value at `index`; computed fields are evaluated
    fn get(&self, index: usize) -> Result<Value> {
        let field = self.field_set().field(index)?;
        match field.evaluator() {
            Some(evaluator) => evaluator.evaluate(self.as_dyn()),
            None => Ok(self.stored(index)),
        }
    }

    /// Value of the field called `name`
    fn get_by_name(&self, name: &str) -> Result<Value> {
        let index = self.field_set().index_of(name)?;
        self.get(index)
    }

    /// Stored values in scheme order (computed fields read as null)
    fn stored_values(&self) -> Vec<Value> {
        self.field_set()
            .fields()
            .iter()
            .map(|f| if f.is_stored() { self.stored(f.index()) } else { Value::Null })
            .collect()
    }

    /// Immutable copy of this record, including its base extents
    fn snapshot(&self) -> ValueTuple {
        let tuple = ValueTuple::from_parts(Arc::clone(self.field_set()), self.stored_values());
        match self.base_extent() {
            Some(base) => tuple.with_base(Arc::clone(base)),
            None => tuple,
        }
    }

    /// Extent of this record belonging to the ancestor type `type_uri`
    fn widen(&self, type_uri: &str) -> Result<ValueTuple> {
        if self.field_set().owner() == Some(type_uri) {
            return Ok(self.snapshot());
        }
        let mut extent = self.base_extent();
        while let Some(e) = extent {
            if e.field_set().owner() == Some(type_uri) {
                return Ok(ValueTuple::clone(e));
            }
            extent = e.base_extent();
        }
        Err(Error::type_mismatch(
            type_uri,
            self.field_set().owner().unwrap_or("<anonymous>"),
        ))
    }

    /// JSON object keyed by field name
    fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.len());
        for field in self.field_set().fields() {
            let value = self.get(field.index()).unwrap_or_default();
            map.insert(field.name().to_string(), value.to_json());
        }
        serde_json::Value::Object(map)
    }
}

/// Write access to a record
pub trait EditableTuple: Tuple {
    /// Replace the value at `index`
    fn set(&mut self, index: usize, value: Value) -> Result<()>;

    /// Replace the value of the field called `name`
    fn set_by_name(&mut self, name: &str, value: Value) -> Result<()> {
        let index = self.field_set().index_of(name)?;
        self.set(index, value)
    }
}

/// Reject writes outside the scheme or to computed fields
pub(crate) fn check_writable(field_set: &FieldSet, index: usize) -> Result<()> {
    let field = field_set.field(index)?;
    if field.is_stored() {
        Ok(())
    } else {
        Err(Error::read_only(format!("field '{}' is computed", field.name())))
    }
}

/// Field-by-field equality in scheme order
pub fn tuple_eq(a: &dyn Tuple, b: &dyn Tuple) -> bool {
    if !a.field_set().same_layout(b.field_set()) {
        return false;
    }
    a.field_set()
        .fields()
        .iter()
        .filter(|f| f.is_stored())
        .all(|f| {
            let (x, y) = (a.stored(f.index()), b.stored(f.index()));
            x.same_ref(&y) || x == y
        })
}

/// Hash consistent with [`tuple_eq`]
pub fn tuple_hash<H: Hasher>(tuple: &dyn Tuple, state: &mut H) {
    tuple.len().hash(state);
    for field in tuple.field_set().fields().iter().filter(|f| f.is_stored()) {
        tuple.stored(field.index()).hash(state);
    }
}
