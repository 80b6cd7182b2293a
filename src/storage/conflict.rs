//! Conflict detection for rebased updates

use std::sync::Arc;

use crate::tuple::{DeltaTuple, JournalTuple, Tuple};
use crate::types::ConflictReport;

/// Check `attempted` against every delta committed between `base` and
/// `landed`
///
/// Returns the first overlap found, walking forward from `base`.
pub fn detect_conflict(
    base: &Arc<JournalTuple>,
    landed: &Arc<JournalTuple>,
    attempted: &Arc<DeltaTuple>,
) -> Option<ConflictReport> {
    let mut current = Arc::clone(base);
    while current.version() < landed.version() {
        let committed = current.committed_delta()?;
        let overlap = attempted.overlapping(&committed);
        if !overlap.is_empty() {
            let fields = attempted.field_set().fields();
            return Some(ConflictReport {
                attempted: Arc::clone(attempted),
                committed: Arc::clone(&committed),
                fields: overlap.iter().map(|&i| fields[i].name().to_string()).collect(),
                values: overlap
                    .iter()
                    .map(|&i| (committed.stored(i).to_string(), attempted.stored(i).to_string()))
                    .collect(),
            });
        }
        current = current.next_version()?;
    }
    None
}
