//! Error types and handling for tuplestore
//!
//! This module defines the single error type used throughout the crate.
//! Lower-level failures (I/O, parsing) are wrapped in [`Error::Data`] and stay
//! reachable through [`std::error::Error::source`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::tuple::DeltaTuple;
use crate::types::KeyTuple;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed lower-level cause
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for tuplestore
#[derive(Error, Debug)]
pub enum Error {
    /// No factory or delegate produced a type for the URI
    #[error("Type not found: {uri}")]
    TypeNotFound {
        /// The URI that failed to resolve
        uri: String,
    },

    /// Lookup by field name failed
    #[error("Field '{name}' not found (valid fields: {})", .valid.join(", "))]
    FieldNotFound {
        /// Requested field name
        name: String,
        /// Names defined by the field set
        valid: Vec<String>,
    },

    /// Positional access outside the field set
    #[error("Field index {index} out of bounds (size {size})")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Number of fields
        size: usize,
    },

    /// Operation required type compatibility that is not present
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type identity
        expected: String,
        /// Actual type identity
        actual: String,
    },

    /// A commit would violate a declared-unique key
    #[error("Unique key '{key}' violated by {value}")]
    UniqueKeyViolation {
        /// Name of the violated key
        key: String,
        /// Duplicated key value
        value: KeyTuple,
        /// The offending delta
        delta: Arc<DeltaTuple>,
    },

    /// A rebased delta overlaps a concurrently committed delta
    #[error("Update conflict: {0}")]
    UpdateConflict(Box<ConflictReport>),

    /// The record was deleted before the update could land
    #[error("Record deleted at version {version}")]
    RecordDeleted {
        /// Version on which the delete was committed
        version: u64,
    },

    /// Waiting for a pending update exceeded the configured bound
    #[error("Timed out after {waited:?} waiting on version {version}")]
    WaitTimeout {
        /// Version whose pending slot stayed occupied
        version: u64,
        /// How long the caller waited
        waited: Duration,
    },

    /// Write attempted on something that cannot be written
    #[error("Read-only: {0}")]
    ReadOnly(String),

    /// Invalid schema or type definition
    #[error("Invalid definition: {0}")]
    Definition(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lower-level failure wrapped with context
    #[error("{context}: {source}")]
    Data {
        /// What was being done
        context: String,
        /// Root cause
        #[source]
        source: BoxedCause,
    },
}

/// Details of an update conflict
#[derive(Debug)]
pub struct ConflictReport {
    /// The delta that could not be applied
    pub attempted: Arc<DeltaTuple>,
    /// The concurrently committed delta it collided with
    pub committed: Arc<DeltaTuple>,
    /// Names of the fields changed by both
    pub fields: Vec<String>,
    /// Rendered `(committed, attempted)` values per conflicting field
    pub values: Vec<(String, String)>,
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fields [")?;
        for (i, (name, (old, new))) in self.fields.iter().zip(&self.values).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: committed {} vs attempted {}", name, old, new)?;
        }
        write!(f, "]")
    }
}

impl Error {
    /// Create a type not found error
    pub fn type_not_found(uri: impl Into<String>) -> Self {
        Self::TypeNotFound { uri: uri.into() }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a read-only error
    pub fn read_only(msg: impl Into<String>) -> Self {
        Self::ReadOnly(msg.into())
    }

    /// Create a definition error
    pub fn definition(msg: impl Into<String>) -> Self {
        Self::Definition(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap a lower-level error with context
    pub fn data(context: impl Into<String>, source: impl Into<BoxedCause>) -> Self {
        Self::Data {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Walk the source chain to the innermost cause
    pub fn root_cause(&self) -> &(dyn std::error::Error + 'static) {
        let mut current: &(dyn std::error::Error + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }

    /// Check if this error is a concurrency outcome the caller may retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::UpdateConflict(_) | Error::WaitTimeout { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::data("I/O error", e)
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::data("TOML parse error", e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::data("JSON error", e)
    }
}
