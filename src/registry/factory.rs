//! Type factories
//!
//! A factory turns a URI into an unlinked [`TypeDefinition`], or declines
//! with `Ok(None)` so the next factory in the chain gets a turn.

use std::sync::Arc;

use dashmap::DashMap;

use crate::constants::BUILTIN_PREFIX;
use crate::log_trace;
use crate::registry::TypeRegistry;
use crate::types::{Error, Result, TypeDefinition, ValueKind};

/// Source of type definitions
pub trait TypeFactory: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Produce the definition for `uri`, or `None` if this factory does not
    /// know it
    fn create(&self, registry: &TypeRegistry, uri: &str) -> Result<Option<TypeDefinition>>;
}

/// Primitive types under `urn:builtin:`
#[derive(Debug, Default)]
pub struct BuiltinTypeFactory;

impl BuiltinTypeFactory {
    /// Value kind of the builtin called `name`; `any` maps to null
    pub fn value_kind(name: &str) -> Option<ValueKind> {
        Some(match name {
            "bool" | "boolean" => ValueKind::Bool,
            "int" | "integer" | "long" => ValueKind::Int,
            "float" | "double" => ValueKind::Float,
            "string" | "text" => ValueKind::Text,
            "bytes" | "binary" => ValueKind::Bytes,
            "any" => ValueKind::Null,
            _ => return None,
        })
    }
}

impl TypeFactory for BuiltinTypeFactory {
    fn name(&self) -> &str {
        "builtin"
    }

    fn create(&self, _registry: &TypeRegistry, uri: &str) -> Result<Option<TypeDefinition>> {
        let Some(name) = uri.strip_prefix(BUILTIN_PREFIX) else {
            return Ok(None);
        };
        Ok(Self::value_kind(name).map(|kind| TypeDefinition::primitive(uri, kind)))
    }
}

/// Definitions registered at runtime
#[derive(Debug, Default)]
pub struct AssembledTypeFactory {
    definitions: DashMap<String, TypeDefinition>,
}

impl AssembledTypeFactory {
    /// Empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `definition`; an existing definition for the URI is an error
    pub fn add(&self, definition: TypeDefinition) -> Result<()> {
        match self.definitions.entry(definition.uri.clone()) {
            dashmap::mapref::entry::Entry::Occupied(e) => Err(Error::definition(format!(
                "Type '{}' is already assembled",
                e.key()
            ))),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(definition);
                Ok(())
            }
        }
    }

    /// Number of registered definitions
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl TypeFactory for AssembledTypeFactory {
    fn name(&self) -> &str {
        "assembled"
    }

    fn create(&self, _registry: &TypeRegistry, uri: &str) -> Result<Option<TypeDefinition>> {
        Ok(self.definitions.get(uri).map(|d| d.clone()))
    }
}

/// Rust type that can describe itself as a record type
///
/// ```
/// use tuplestore::registry::DescribeType;
/// use tuplestore::types::TypeDefinition;
///
/// struct Point;
///
/// impl DescribeType for Point {
///     fn type_uri() -> &'static str {
///         "urn:demo:Point"
///     }
///
///     fn describe() -> TypeDefinition {
///         TypeDefinition::record(Self::type_uri())
///             .with_field("x", "urn:builtin:float")
///             .with_field("y", "urn:builtin:float")
///     }
/// }
/// ```
pub trait DescribeType {
    /// URI the type is registered under
    fn type_uri() -> &'static str;

    /// Definition of the type
    fn describe() -> TypeDefinition;
}

type Describer = fn() -> TypeDefinition;

/// Definitions produced by [`DescribeType`] implementations
#[derive(Default)]
pub struct DescribedTypeFactory {
    describers: DashMap<&'static str, Describer>,
}

impl DescribedTypeFactory {
    /// Empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`
    pub fn register<T: DescribeType>(&self) {
        self.describers.insert(T::type_uri(), T::describe);
    }
}

impl TypeFactory for DescribedTypeFactory {
    fn name(&self) -> &str {
        "described"
    }

    fn create(&self, _registry: &TypeRegistry, uri: &str) -> Result<Option<TypeDefinition>> {
        let Some(describe) = self.describers.get(uri).map(|d| *d.value()) else {
            return Ok(None);
        };
        let definition = describe();
        if definition.uri != uri {
            return Err(Error::definition(format!(
                "Described type registered as '{}' reports uri '{}'",
                uri, definition.uri
            )));
        }
        log_trace!("Described type {}", uri);
        Ok(Some(definition))
    }
}

/// Ordered factory list
pub type FactoryChain = Vec<Arc<dyn TypeFactory>>;
