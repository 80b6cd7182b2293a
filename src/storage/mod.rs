//! Storage layer for tuplestore
//!
//! Tables of journal chains and the conflict checks that sit on top of
//! the versioning primitives.

/// Journal tables
pub mod table;
/// Rebase conflict detection
pub mod conflict;

pub use conflict::detect_conflict;
pub use table::JournalTable;
