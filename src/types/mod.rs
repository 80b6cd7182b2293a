//! Type definitions shared by every tuplestore module
//!
//! This module contains the value model, schema metadata and the error type.

/// System-wide error types
pub mod error;
/// Value-related types
pub mod value;
/// Hashable key tuples
pub mod key;
/// Fields and field sets
pub mod field;
/// Keys and projections
pub mod projection;
/// Serializable type definitions
pub mod definition;

// Re-export commonly used types for convenience
pub use error::{ConflictReport, Error, Result};
pub use value::{Value, ValueKind};
pub use key::KeyTuple;
pub use field::{Evaluator, Field, FieldKind, FieldSet, FieldSetBuilder, Scheme};
pub use projection::{same_projection, FnProjection, Key, Projection};
pub use definition::{FieldDefinition, KeyDefinition, TypeDefinition, TypeKind};
