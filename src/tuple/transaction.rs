//! Thread-local transaction context
//!
//! Every committed version records the id of the transaction that was
//! ambient on the committing thread. Outside any scope the id is
//! [`NO_TRANSACTION`].

use std::cell::Cell;

use crate::constants::NO_TRANSACTION;

thread_local! {
    static CURRENT: Cell<u64> = const { Cell::new(NO_TRANSACTION) };
}

/// Access to the ambient transaction id
pub struct TransactionContext;

impl TransactionContext {
    /// Id ambient on this thread
    pub fn current_id() -> u64 {
        CURRENT.with(Cell::get)
    }

    /// Make `id` ambient until the guard is dropped
    pub fn enter(id: u64) -> TransactionGuard {
        let previous = CURRENT.with(|c| c.replace(id));
        TransactionGuard { previous }
    }

    /// Run `f` with `id` ambient
    pub fn scope<R>(id: u64, f: impl FnOnce() -> R) -> R {
        let _guard = Self::enter(id);
        f()
    }
}

/// Restores the previous transaction id on drop
#[must_use = "the transaction id is only ambient while the guard lives"]
pub struct TransactionGuard {
    previous: u64,
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        CURRENT.with(|c| c.set(self.previous));
    }
}
