//! Schema metadata: fields and field sets
//!
//! A [`FieldSet`] (also exposed as [`Scheme`]) is the ordered definition every
//! tuple follows. Field indices are assigned in declaration order, start at 0
//! and are contiguous; they never change for the life of the set.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::tuple::Tuple;
use crate::types::projection::Key;
use crate::types::{Error, Result, Value};

/// External evaluator computing a field value from the record it belongs to
pub trait Evaluator: Send + Sync {
    /// Compute the value for `tuple`
    fn evaluate(&self, tuple: &dyn Tuple) -> Result<Value>;
}

impl<F> Evaluator for F
where
    F: Fn(&dyn Tuple) -> Result<Value> + Send + Sync,
{
    fn evaluate(&self, tuple: &dyn Tuple) -> Result<Value> {
        self(tuple)
    }
}

/// How a field obtains its value
#[derive(Clone)]
pub enum FieldKind {
    /// Value is stored in the tuple
    Stored,
    /// Value is derived on read
    Computed(Arc<dyn Evaluator>),
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Stored => write!(f, "Stored"),
            FieldKind::Computed(_) => write!(f, "Computed"),
        }
    }
}

/// One column definition
#[derive(Clone, Debug)]
pub struct Field {
    name: Arc<str>,
    index: usize,
    type_uri: Arc<str>,
    kind: FieldKind,
}

impl Field {
    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position within the field set
    pub fn index(&self) -> usize {
        self.index
    }

    /// URI of the field's type
    pub fn type_uri(&self) -> &str {
        &self.type_uri
    }

    /// Storage kind
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Whether the value is held by the tuple
    pub fn is_stored(&self) -> bool {
        matches!(self.kind, FieldKind::Stored)
    }

    /// Evaluator for computed fields
    pub fn evaluator(&self) -> Option<&Arc<dyn Evaluator>> {
        match &self.kind {
            FieldKind::Computed(e) => Some(e),
            FieldKind::Stored => None,
        }
    }
}

/// Ordered, uniquely named field and key definitions
#[derive(Debug)]
pub struct FieldSet {
    owner: Option<Arc<str>>,
    fields: Vec<Field>,
    keys: Vec<Arc<Key>>,
    by_name: HashMap<Arc<str>, usize>,
}

/// Field set owned by a type
pub type Scheme = FieldSet;

impl FieldSet {
    /// Start building a field set owned by `owner` (a type URI)
    pub fn builder(owner: Option<&str>) -> FieldSetBuilder {
        FieldSetBuilder {
            owner: owner.map(Arc::from),
            fields: Vec::new(),
            keys: Vec::new(),
        }
    }

    /// URI of the owning type
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the set has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// All fields in index order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Field names in index order
    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.to_string()).collect()
    }

    /// Bounds check for positional access
    pub fn check_index(&self, index: usize) -> Result<()> {
        if index < self.fields.len() {
            Ok(())
        } else {
            Err(Error::IndexOutOfBounds { index, size: self.fields.len() })
        }
    }

    /// Field at `index`
    pub fn field(&self, index: usize) -> Result<&Field> {
        self.check_index(index)?;
        Ok(&self.fields[index])
    }

    /// Index of the field called `name`, if any
    pub fn find(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Index of the field called `name`
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.find(name).ok_or_else(|| Error::FieldNotFound {
            name: name.to_string(),
            valid: self.names(),
        })
    }

    /// Field called `name`
    pub fn field_by_name(&self, name: &str) -> Result<&Field> {
        let index = self.index_of(name)?;
        Ok(&self.fields[index])
    }

    /// Declared keys
    pub fn keys(&self) -> &[Arc<Key>] {
        &self.keys
    }

    /// Declared key called `name`
    pub fn key(&self, name: &str) -> Option<&Arc<Key>> {
        self.keys.iter().find(|k| k.key_name() == name)
    }

    /// Whether both sets describe the same columns in the same order
    pub fn same_layout(&self, other: &FieldSet) -> bool {
        self.fields.len() == other.fields.len()
            && self.fields.iter().zip(&other.fields).all(|(a, b)| a.name == b.name)
    }
}

/// Builder enforcing unique names and contiguous indices
pub struct FieldSetBuilder {
    owner: Option<Arc<str>>,
    fields: Vec<Field>,
    keys: Vec<(String, Vec<String>, bool)>,
}

impl FieldSetBuilder {
    /// Append a stored field
    pub fn field(mut self, name: &str, type_uri: &str) -> Self {
        self.push(name, type_uri, FieldKind::Stored);
        self
    }

    /// Append a computed field
    pub fn computed(mut self, name: &str, type_uri: &str, evaluator: Arc<dyn Evaluator>) -> Self {
        self.push(name, type_uri, FieldKind::Computed(evaluator));
        self
    }

    /// Declare a key over previously or later declared fields
    pub fn key(mut self, name: &str, fields: &[&str], unique: bool) -> Self {
        self.keys.push((
            name.to_string(),
            fields.iter().map(|f| f.to_string()).collect(),
            unique,
        ));
        self
    }

    fn push(&mut self, name: &str, type_uri: &str, kind: FieldKind) {
        let index = self.fields.len();
        self.fields.push(Field {
            name: Arc::from(name),
            index,
            type_uri: Arc::from(type_uri),
            kind,
        });
    }

    /// Validate and freeze the field set
    pub fn build(self) -> Result<Arc<FieldSet>> {
        let mut by_name = HashMap::with_capacity(self.fields.len());
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(Error::definition("Field names must not be empty"));
            }
            if by_name.insert(Arc::clone(&field.name), field.index).is_some() {
                return Err(Error::definition(format!("Duplicate field name '{}'", field.name)));
            }
        }

        let mut keys: Vec<Arc<Key>> = Vec::with_capacity(self.keys.len());
        for (name, field_names, unique) in self.keys {
            if keys.iter().any(|k| k.key_name() == name) {
                return Err(Error::definition(format!("Duplicate key name '{}'", name)));
            }
            if field_names.is_empty() {
                return Err(Error::definition(format!("Key '{}' has no fields", name)));
            }
            let mut indices = Vec::with_capacity(field_names.len());
            for field_name in &field_names {
                let index = by_name.get(field_name.as_str()).copied().ok_or_else(|| {
                    Error::definition(format!("Key '{}' references unknown field '{}'", name, field_name))
                })?;
                indices.push(index);
            }
            keys.push(Arc::new(Key::new(&name, indices, unique)));
        }

        Ok(Arc::new(FieldSet {
            owner: self.owner,
            fields: self.fields,
            keys,
            by_name,
        }))
    }
}
