//! Global constants used throughout the tuplestore codebase
//!
//! This module contains compile-time constants that are shared across
//! multiple modules to ensure consistency and avoid magic strings.

/// Suffix selecting a fixed-size homogeneous sequence of the base type
pub const ARRAY_SUFFIX: &str = ".array";

/// Suffix selecting a growable collection of the base type
pub const LIST_SUFFIX: &str = ".list";

/// Suffix selecting the editable front of the base type
pub const BUFFER_SUFFIX: &str = ".buffer";

/// Suffix selecting the change-tracking variant of the base type
pub const DELTA_SUFFIX: &str = ".delta";

/// Suffix selecting the meta-descriptor of the base type
pub const META_SUFFIX: &str = ".type";

/// URI prefix of the built-in primitive types
pub const BUILTIN_PREFIX: &str = "urn:builtin:";

/// URI schemes whose lookups try local factories before the parent scope
///
/// Relative, file-like identifiers must not be resolved against a parent
/// scope before the scope that owns the files had a chance.
pub const DEFAULT_POST_DELEGATED_SCHEMES: [&str; 2] = ["file", "local"];

/// File extension of prototype type definitions
pub const PROTOTYPE_EXTENSION: &str = "toml";

/// Transaction id stamped on versions created outside any transaction
pub const NO_TRANSACTION: u64 = 0;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "tuplestore.toml";
