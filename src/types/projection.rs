//! Keys and projections
//!
//! A projection is a named function from a record to a [`KeyTuple`]. Keys
//! declared in a scheme project a fixed list of fields; [`FnProjection`]
//! wraps an evaluator supplied by the expression layer living outside this
//! crate.

use std::fmt;
use std::sync::Arc;

use crate::tuple::Tuple;
use crate::types::{KeyTuple, Result};

/// Named derived lookup function over a record
pub trait Projection: Send + Sync + fmt::Debug {
    /// Name used to register indices built from this projection
    fn name(&self) -> &str;

    /// Evaluate the projection for `tuple`
    fn project(&self, tuple: &dyn Tuple) -> Result<KeyTuple>;

    /// Whether at most one record may carry a given key
    fn is_unique(&self) -> bool {
        false
    }

    /// Projected field indices, for projections that are plain field keys
    fn key_fields(&self) -> Option<&[usize]> {
        None
    }
}

/// Whether `a` and `b` compute the same key
///
/// Field keys match when they project the same fields; any other
/// projection only matches itself.
pub fn same_projection(a: &Arc<dyn Projection>, b: &Arc<dyn Projection>) -> bool {
    Arc::ptr_eq(a, b) || matches!((a.key_fields(), b.key_fields()), (Some(x), Some(y)) if x == y)
}

/// Key over an ordered list of fields of one scheme
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Key {
    name: Arc<str>,
    fields: Vec<usize>,
    unique: bool,
}

impl Key {
    /// Create a key over field indices
    pub fn new(name: &str, fields: Vec<usize>, unique: bool) -> Self {
        Self {
            name: Arc::from(name),
            fields,
            unique,
        }
    }

    /// Key name
    pub fn key_name(&self) -> &str {
        &self.name
    }

    /// Indices of the projected fields
    pub fn field_indices(&self) -> &[usize] {
        &self.fields
    }
}

impl Projection for Key {
    fn name(&self) -> &str {
        &self.name
    }

    fn project(&self, tuple: &dyn Tuple) -> Result<KeyTuple> {
        let values = self
            .fields
            .iter()
            .map(|&i| tuple.get(i))
            .collect::<Result<Vec<_>>>()?;
        Ok(KeyTuple::new(values))
    }

    fn is_unique(&self) -> bool {
        self.unique
    }

    fn key_fields(&self) -> Option<&[usize]> {
        Some(&self.fields)
    }
}

type ProjectFn = dyn Fn(&dyn Tuple) -> Result<KeyTuple> + Send + Sync;

/// Projection backed by an externally supplied function
#[derive(Clone)]
pub struct FnProjection {
    name: Arc<str>,
    unique: bool,
    f: Arc<ProjectFn>,
}

impl FnProjection {
    /// Wrap `f` under `name`
    pub fn new<F>(name: &str, unique: bool, f: F) -> Self
    where
        F: Fn(&dyn Tuple) -> Result<KeyTuple> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            unique,
            f: Arc::new(f),
        }
    }
}

impl fmt::Debug for FnProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProjection")
            .field("name", &self.name)
            .field("unique", &self.unique)
            .finish()
    }
}

impl Projection for FnProjection {
    fn name(&self) -> &str {
        &self.name
    }

    fn project(&self, tuple: &dyn Tuple) -> Result<KeyTuple> {
        (self.f)(tuple)
    }

    fn is_unique(&self) -> bool {
        self.unique
    }
}
