//! tuplestore - A typed, versioned tuple engine
//!
//! tuplestore keeps structured records behind a small set of contracts:
//! a scoped [`TypeRegistry`] resolving type URIs to canonical descriptors,
//! a [`Tuple`] hierarchy with sparse deltas and accumulating buffers,
//! versioned [`JournalTuple`]s with optimistic prepare/commit and
//! [`Aggregate`]s with lazily built key indices.
#![warn(missing_docs)]

// Ambient plumbing
pub mod constants;
pub mod core;

// Value model and records
pub mod types;
pub mod tuple;

// Type resolution, collections and storage
pub mod registry;
pub mod aggregate;
pub mod storage;

// Re-export commonly used items for convenience
pub use crate::core::{Config, JournalConfig, LoggingConfig, RegistryConfig};
pub use aggregate::{Aggregate, EditableAggregate, Index};
pub use registry::{Type, TypeRegistry};
pub use storage::JournalTable;
pub use tuple::{BufferTuple, DeltaTuple, EditableTuple, JournalTuple, MutableTuple, Tuple, ValueTuple};
pub use types::{Error, FieldSet, KeyTuple, Result, TypeDefinition, Value};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize logging from `config` and build the root type registry
pub fn init(config: &Config) -> Result<std::sync::Arc<TypeRegistry>> {
    crate::core::init_logging(&config.logging)?;
    TypeRegistry::root(&config.registry)
}
