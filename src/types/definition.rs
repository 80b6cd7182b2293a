//! Unlinked type definitions
//!
//! Factories produce a [`TypeDefinition`]; the registry turns it into a
//! canonical, linked [`Type`](crate::registry::Type). Definitions are plain
//! serde structs so prototype files can be written in TOML:
//!
//! ```toml
//! uri = "urn:x:Person"
//! base = "urn:x:Party"
//!
//! [[fields]]
//! name = "id"
//! type = "urn:builtin:int"
//!
//! [[keys]]
//! name = "pk"
//! fields = ["id"]
//! unique = true
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{Error, Evaluator, FieldSet, Result, ValueKind};

/// Kind of a type descriptor
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    /// Structured record with a scheme
    #[default]
    Record,
    /// Scalar built-in type
    Primitive,
    /// Fixed-size homogeneous sequence (`.array`)
    Array,
    /// Growable collection (`.list`)
    List,
    /// Editable front of a record type (`.buffer`)
    Buffer,
    /// Change-tracking variant of a record type (`.delta`)
    Delta,
    /// Meta-descriptor of a type (`.type`)
    Meta,
}

impl TypeKind {
    /// Whether values of this kind are aggregates with a content type
    pub fn is_aggregate(self) -> bool {
        matches!(self, TypeKind::Array | TypeKind::List)
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TypeKind::Record => "record",
            TypeKind::Primitive => "primitive",
            TypeKind::Array => "array",
            TypeKind::List => "list",
            TypeKind::Buffer => "buffer",
            TypeKind::Delta => "delta",
            TypeKind::Meta => "meta",
        };
        f.write_str(s)
    }
}

/// One field of a definition
#[derive(Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name
    pub name: String,
    /// URI of the field type
    #[serde(rename = "type")]
    pub type_uri: String,
    /// Evaluator for computed fields; never read from files
    #[serde(skip)]
    pub evaluator: Option<Arc<dyn Evaluator>>,
}

impl fmt::Debug for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDefinition")
            .field("name", &self.name)
            .field("type_uri", &self.type_uri)
            .field("computed", &self.evaluator.is_some())
            .finish()
    }
}

/// One key of a definition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDefinition {
    /// Key name
    pub name: String,
    /// Projected field names, in key order
    pub fields: Vec<String>,
    /// Uniqueness flag
    #[serde(default)]
    pub unique: bool,
}

/// Type descriptor as produced by a factory, before linking
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// Type identity
    pub uri: String,
    /// Descriptor kind
    #[serde(default)]
    pub kind: TypeKind,
    /// Value kind of primitive types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_kind: Option<ValueKind>,
    /// Behaviour parent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype: Option<String>,
    /// Structural parent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Own fields (not including base-type extents)
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    /// Keys over own fields
    #[serde(default)]
    pub keys: Vec<KeyDefinition>,
}

impl TypeDefinition {
    /// Empty record definition
    pub fn record(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            kind: TypeKind::Record,
            value_kind: None,
            archetype: None,
            base: None,
            fields: Vec::new(),
            keys: Vec::new(),
        }
    }

    /// Primitive definition holding values of `value_kind`
    pub fn primitive(uri: impl Into<String>, value_kind: ValueKind) -> Self {
        Self {
            kind: TypeKind::Primitive,
            value_kind: Some(value_kind),
            ..Self::record(uri)
        }
    }

    /// Parse a definition from TOML
    pub fn from_toml(contents: &str) -> Result<Self> {
        let definition: TypeDefinition = toml::from_str(contents)?;
        if definition.uri.is_empty() {
            return Err(Error::definition("Type definition without uri"));
        }
        Ok(definition)
    }

    /// Add a stored field
    pub fn with_field(mut self, name: &str, type_uri: &str) -> Self {
        self.fields.push(FieldDefinition {
            name: name.to_string(),
            type_uri: type_uri.to_string(),
            evaluator: None,
        });
        self
    }

    /// Add a computed field
    pub fn with_computed(mut self, name: &str, type_uri: &str, evaluator: Arc<dyn Evaluator>) -> Self {
        self.fields.push(FieldDefinition {
            name: name.to_string(),
            type_uri: type_uri.to_string(),
            evaluator: Some(evaluator),
        });
        self
    }

    /// Add a key
    pub fn with_key(mut self, name: &str, fields: &[&str], unique: bool) -> Self {
        self.keys.push(KeyDefinition {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            unique,
        });
        self
    }

    /// Set the structural parent
    pub fn with_base(mut self, base: &str) -> Self {
        self.base = Some(base.to_string());
        self
    }

    /// Set the behaviour parent
    pub fn with_archetype(mut self, archetype: &str) -> Self {
        self.archetype = Some(archetype.to_string());
        self
    }

    /// Build the scheme of a record definition
    pub fn build_scheme(&self) -> Result<Option<Arc<FieldSet>>> {
        if self.kind != TypeKind::Record {
            return Ok(None);
        }
        let mut builder = FieldSet::builder(Some(&self.uri));
        for field in &self.fields {
            builder = match &field.evaluator {
                Some(evaluator) => builder.computed(&field.name, &field.type_uri, Arc::clone(evaluator)),
                None => builder.field(&field.name, &field.type_uri),
            };
        }
        for key in &self.keys {
            let names: Vec<&str> = key.fields.iter().map(String::as_str).collect();
            builder = builder.key(&key.name, &names, key.unique);
        }
        builder.build().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prototype_toml() {
        let def = TypeDefinition::from_toml(
            r#"
            uri = "urn:x:Person"
            base = "urn:x:Party"

            [[fields]]
            name = "id"
            type = "urn:builtin:int"

            [[fields]]
            name = "name"
            type = "urn:builtin:string"

            [[keys]]
            name = "pk"
            fields = ["id"]
            unique = true
            "#,
        )
        .unwrap();

        assert_eq!(def.kind, TypeKind::Record);
        assert_eq!(def.base.as_deref(), Some("urn:x:Party"));
        let scheme = def.build_scheme().unwrap().unwrap();
        assert_eq!(scheme.names(), vec!["id", "name"]);
        assert!(scheme.key("pk").unwrap().field_indices() == [0]);
    }

    #[test]
    fn missing_uri_is_a_data_or_definition_error() {
        assert!(TypeDefinition::from_toml("kind = \"record\"").is_err());
        assert!(TypeDefinition::from_toml("uri = \"\"").is_err());
    }

    #[test]
    fn primitives_have_no_scheme() {
        let def = TypeDefinition::primitive("urn:builtin:int", ValueKind::Int);
        assert!(def.build_scheme().unwrap().is_none());
    }
}
