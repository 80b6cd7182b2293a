//! Hashable lookup keys

use std::fmt;
use std::sync::Arc;

use crate::types::Value;

/// Immutable, fixed-size tuple of values used as a lookup key
///
/// Equality and hashing are by value; cloning shares the backing slice.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KeyTuple(Arc<[Value]>);

impl KeyTuple {
    /// Create a key from its component values
    pub fn new(values: impl IntoIterator<Item = Value>) -> Self {
        KeyTuple(values.into_iter().collect::<Vec<_>>().into())
    }

    /// Single-component key
    pub fn single(value: impl Into<Value>) -> Self {
        KeyTuple(vec![value.into()].into())
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key has no components
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Component at `index`
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// All components
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Whether every component is null
    ///
    /// All-null keys never take part in uniqueness checks.
    pub fn is_all_null(&self) -> bool {
        self.0.iter().all(Value::is_null)
    }
}

impl fmt::Debug for KeyTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyTuple").field(&self.0).finish()
    }
}

impl fmt::Display for KeyTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

impl From<Value> for KeyTuple {
    fn from(v: Value) -> Self {
        KeyTuple::single(v)
    }
}
