//! Value-backed tuples
//!
//! [`ValueTuple`] is the immutable record: values are shared behind an `Arc`
//! so clones are cheap and nested records can be compared by identity first.
//! [`MutableTuple`] owns its values and implements [`EditableTuple`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::tuple::{check_writable, tuple_eq, tuple_hash, EditableTuple, Tuple};
use crate::types::{Error, FieldSet, Result, Value};

/// Immutable record
#[derive(Clone)]
pub struct ValueTuple {
    field_set: Arc<FieldSet>,
    values: Arc<[Value]>,
    base: Option<Arc<ValueTuple>>,
}

impl ValueTuple {
    /// Create a record, checking the value count against the scheme
    pub fn new(field_set: Arc<FieldSet>, values: Vec<Value>) -> Result<Self> {
        if values.len() != field_set.len() {
            return Err(Error::definition(format!(
                "Expected {} values for {}, got {}",
                field_set.len(),
                field_set.owner().unwrap_or("<anonymous>"),
                values.len()
            )));
        }
        Ok(Self::from_parts(field_set, values))
    }

    pub(crate) fn from_parts(field_set: Arc<FieldSet>, values: Vec<Value>) -> Self {
        Self {
            field_set,
            values: values.into(),
            base: None,
        }
    }

    /// Record with every field null
    pub fn empty(field_set: Arc<FieldSet>) -> Self {
        let values = vec![Value::Null; field_set.len()];
        Self::from_parts(field_set, values)
    }

    /// Record built from `(name, value)` pairs; unnamed fields stay null
    pub fn from_pairs(field_set: Arc<FieldSet>, pairs: &[(&str, Value)]) -> Result<Self> {
        let mut values = vec![Value::Null; field_set.len()];
        for (name, value) in pairs {
            let index = field_set.index_of(name)?;
            check_writable(&field_set, index)?;
            values[index] = value.clone();
        }
        Ok(Self::from_parts(field_set, values))
    }

    /// Attach the extent of the next base-type level
    pub fn with_base(mut self, base: Arc<ValueTuple>) -> Self {
        self.base = Some(base);
        self
    }

    /// Copy of this record with one field replaced
    pub fn with(&self, index: usize, value: Value) -> Result<Self> {
        check_writable(&self.field_set, index)?;
        let mut values = self.values.to_vec();
        values[index] = value;
        Ok(Self {
            field_set: Arc::clone(&self.field_set),
            values: values.into(),
            base: self.base.clone(),
        })
    }

    /// Stored values in scheme order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Mutable copy of this record
    pub fn to_mutable(&self) -> MutableTuple {
        MutableTuple {
            field_set: Arc::clone(&self.field_set),
            values: self.values.to_vec(),
            base: self.base.clone(),
        }
    }
}

impl Tuple for ValueTuple {
    fn field_set(&self) -> &Arc<FieldSet> {
        &self.field_set
    }

    fn stored(&self, index: usize) -> Value {
        self.values.get(index).cloned().unwrap_or_default()
    }

    fn as_dyn(&self) -> &dyn Tuple {
        self
    }

    fn base_extent(&self) -> Option<&Arc<ValueTuple>> {
        self.base.as_ref()
    }

    fn snapshot(&self) -> ValueTuple {
        self.clone()
    }
}

impl PartialEq for ValueTuple {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.values, &other.values) || tuple_eq(self, other)
    }
}

impl Eq for ValueTuple {}

impl Hash for ValueTuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        tuple_hash(self, state);
    }
}

impl fmt::Debug for ValueTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.field_set.owner().unwrap_or("tuple"))?;
        for (i, field) in self.field_set.fields().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field.name(), self.stored(i))?;
        }
        write!(f, ")")
    }
}

/// Owned, writable record
#[derive(Clone)]
pub struct MutableTuple {
    field_set: Arc<FieldSet>,
    values: Vec<Value>,
    base: Option<Arc<ValueTuple>>,
}

impl MutableTuple {
    /// Record with every field null
    pub fn new(field_set: Arc<FieldSet>) -> Self {
        let values = vec![Value::Null; field_set.len()];
        Self {
            field_set,
            values,
            base: None,
        }
    }

    /// Null the value at `index`
    pub fn clear(&mut self, index: usize) -> Result<()> {
        self.set(index, Value::Null)
    }

    /// Freeze into an immutable record
    pub fn freeze(self) -> ValueTuple {
        ValueTuple {
            field_set: self.field_set,
            values: self.values.into(),
            base: self.base,
        }
    }
}

impl Tuple for MutableTuple {
    fn field_set(&self) -> &Arc<FieldSet> {
        &self.field_set
    }

    fn stored(&self, index: usize) -> Value {
        self.values.get(index).cloned().unwrap_or_default()
    }

    fn as_dyn(&self) -> &dyn Tuple {
        self
    }

    fn is_mutable(&self) -> bool {
        true
    }

    fn base_extent(&self) -> Option<&Arc<ValueTuple>> {
        self.base.as_ref()
    }
}

impl EditableTuple for MutableTuple {
    fn set(&mut self, index: usize, value: Value) -> Result<()> {
        check_writable(&self.field_set, index)?;
        self.values[index] = value;
        Ok(())
    }
}

impl PartialEq for MutableTuple {
    fn eq(&self, other: &Self) -> bool {
        tuple_eq(self, other)
    }
}

impl fmt::Debug for MutableTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableTuple")
            .field("owner", &self.field_set.owner())
            .field("values", &self.values)
            .finish()
    }
}
