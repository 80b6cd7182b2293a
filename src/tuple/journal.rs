//! Versioned records
//!
//! A [`JournalTuple`] is one immutable version of a record. Versions form a
//! forward-linked chain: each holds at most one pending update and, once
//! that update commits, a link to its successor. Updates always land on the
//! latest version, so a delta prepared against an old version is rebased
//! by walking the chain forward first.
//!
//! Preparing blocks while another update is pending on the target version;
//! committing or rolling back that update wakes every waiter. Waiting is
//! unbounded unless a timeout is given.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::tuple::{DeltaTuple, TransactionContext, Tuple, TupleRef, ValueTuple};
use crate::types::{Error, FieldSet, Result, Value};
use crate::{log_debug, log_trace, log_warn};

static NEXT_CHAIN: AtomicU64 = AtomicU64::new(1);
static NEXT_TICKET: AtomicU64 = AtomicU64::new(1);

struct Pending {
    ticket: u64,
    delta: Arc<DeltaTuple>,
    next: Option<Arc<JournalTuple>>,
}

#[derive(Default)]
struct JournalState {
    pending: Option<Pending>,
    next: Option<Arc<JournalTuple>>,
    committed: Option<Arc<DeltaTuple>>,
    deleted: bool,
}

/// One version of a versioned record
pub struct JournalTuple {
    data: ValueTuple,
    version: u64,
    transaction_id: u64,
    chain: u64,
    state: Mutex<JournalState>,
    changed: Condvar,
}

impl JournalTuple {
    /// First version of a new record chain
    pub fn new(data: ValueTuple) -> Arc<Self> {
        Arc::new(Self {
            data,
            version: 0,
            transaction_id: TransactionContext::current_id(),
            chain: NEXT_CHAIN.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(JournalState::default()),
            changed: Condvar::new(),
        })
    }

    /// First version holding a snapshot of `tuple`
    pub fn from_tuple(tuple: &dyn Tuple) -> Arc<Self> {
        Self::new(tuple.snapshot())
    }

    fn successor(&self, data: ValueTuple) -> Arc<Self> {
        Arc::new(Self {
            data,
            version: self.version + 1,
            transaction_id: TransactionContext::current_id(),
            chain: self.chain,
            state: Mutex::new(JournalState::default()),
            changed: Condvar::new(),
        })
    }

    /// Position in the chain, 0 for the first version
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Transaction that committed this version
    pub fn transaction_id(&self) -> u64 {
        self.transaction_id
    }

    /// Identity shared by every version of the same record
    pub fn chain_id(&self) -> u64 {
        self.chain
    }

    /// Values of this version
    pub fn data(&self) -> &ValueTuple {
        &self.data
    }

    /// Committed successor, if any
    pub fn next_version(&self) -> Option<Arc<JournalTuple>> {
        self.state.lock().next.clone()
    }

    /// Delta committed on top of this version, if any
    ///
    /// Unchanged fields read through to this version's values.
    pub fn committed_delta(&self) -> Option<Arc<DeltaTuple>> {
        self.state.lock().committed.clone()
    }

    /// Whether a delete was committed on this version
    pub fn is_deleted_version(&self) -> bool {
        self.state.lock().deleted
    }

    /// Whether an update is prepared but not yet resolved
    pub fn is_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// Whether this is the newest live version of its chain
    pub fn is_latest(&self) -> bool {
        let state = self.state.lock();
        state.next.is_none() && !state.deleted
    }

    /// Newest version of the chain, or `None` if the record was deleted
    pub fn latest_version(self: &Arc<Self>) -> Option<Arc<JournalTuple>> {
        let mut current = Arc::clone(self);
        loop {
            let next = {
                let state = current.state.lock();
                if state.deleted {
                    return None;
                }
                state.next.clone()
            };
            match next {
                Some(next) => current = next,
                None => return Some(current),
            }
        }
    }

    /// Empty delta over this version
    pub fn edit(self: &Arc<Self>) -> DeltaTuple {
        DeltaTuple::edit(Arc::clone(self) as TupleRef)
    }

    /// Prepare `delta` on the latest version, waiting without bound
    pub fn prepare_update(self: &Arc<Self>, delta: Arc<DeltaTuple>) -> Result<PreparedUpdate> {
        self.prepare_update_timeout(delta, None)
    }

    /// Prepare `delta` on the latest version
    ///
    /// Blocks while another update is pending on the target. With a
    /// `timeout` the wait fails with [`Error::WaitTimeout`]; without one it
    /// waits for as long as the other update stays pending.
    pub fn prepare_update_timeout(
        self: &Arc<Self>,
        delta: Arc<DeltaTuple>,
        timeout: Option<Duration>,
    ) -> Result<PreparedUpdate> {
        let started = Instant::now();
        let deadline = timeout.map(|t| started + t);
        let mut target = Arc::clone(self);

        loop {
            let mut state = target.state.lock();
            while state.pending.is_some() {
                match deadline {
                    Some(deadline) => {
                        if target.changed.wait_until(&mut state, deadline).timed_out()
                            && state.pending.is_some()
                        {
                            return Err(Error::WaitTimeout {
                                version: target.version,
                                waited: started.elapsed(),
                            });
                        }
                    }
                    None => target.changed.wait(&mut state),
                }
            }

            if state.deleted {
                return Err(Error::RecordDeleted { version: target.version });
            }

            if let Some(next) = state.next.clone() {
                drop(state);
                log_debug!(
                    "Rebasing update on chain {} from version {} to {}",
                    target.chain,
                    target.version,
                    next.version
                );
                target = next;
                continue;
            }

            let next = delta
                .apply_to(&target.data)?
                .map(|data| target.successor(data));
            let ticket = NEXT_TICKET.fetch_add(1, Ordering::Relaxed);
            state.pending = Some(Pending {
                ticket,
                delta: Arc::clone(&delta),
                next: next.clone(),
            });
            drop(state);

            return Ok(PreparedUpdate {
                target,
                ticket,
                delta,
                next,
                resolved: false,
            });
        }
    }

    /// Prepare and commit in one step
    ///
    /// Returns the new version, or `None` when `delta` deleted the record.
    pub fn update(self: &Arc<Self>, delta: Arc<DeltaTuple>) -> Result<Option<Arc<JournalTuple>>> {
        Ok(self.prepare_update(delta)?.commit())
    }

    /// Commit whatever update is pending on this version
    pub fn commit(&self) -> Option<Arc<JournalTuple>> {
        self.resolve(None, true)
    }

    /// Discard whatever update is pending on this version
    pub fn rollback(&self) {
        self.resolve(None, false);
    }

    fn resolve(&self, ticket: Option<u64>, commit: bool) -> Option<Arc<JournalTuple>> {
        let mut state = self.state.lock();
        let matches = match (&state.pending, ticket) {
            (Some(p), Some(t)) => p.ticket == t,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            log_warn!(
                "No matching pending update on chain {} version {} to {}",
                self.chain,
                self.version,
                if commit { "commit" } else { "roll back" }
            );
            return None;
        }

        let pending = state.pending.take()?;
        let result = if commit {
            if pending.delta.is_delete() {
                state.deleted = true;
                log_debug!("Deleted chain {} at version {}", self.chain, self.version);
            } else {
                log_debug!(
                    "Committed version {} on chain {} changing {:?}",
                    self.version + 1,
                    self.chain,
                    pending.delta.dirty_names()
                );
            }
            state.next = pending.next.clone();
            state.committed = Some(Arc::new(pending.delta.detached(&self.data)));
            pending.next
        } else {
            log_trace!("Rolled back update on chain {} version {}", self.chain, self.version);
            None
        };
        drop(state);
        self.changed.notify_all();
        result
    }
}

impl Tuple for JournalTuple {
    fn field_set(&self) -> &Arc<FieldSet> {
        self.data.field_set()
    }

    fn stored(&self, index: usize) -> Value {
        self.data.stored(index)
    }

    fn as_dyn(&self) -> &dyn Tuple {
        self
    }

    fn base_extent(&self) -> Option<&Arc<ValueTuple>> {
        self.data.base_extent()
    }

    fn snapshot(&self) -> ValueTuple {
        self.data.clone()
    }
}

impl fmt::Debug for JournalTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JournalTuple")
            .field("chain", &self.chain)
            .field("version", &self.version)
            .field("transaction_id", &self.transaction_id)
            .field("data", &self.data)
            .finish()
    }
}

/// Handle on an update that is prepared but not yet resolved
///
/// Dropping the handle without committing rolls the update back, so an
/// early return can never leave a version blocked.
#[must_use = "a prepared update is rolled back when dropped"]
pub struct PreparedUpdate {
    target: Arc<JournalTuple>,
    ticket: u64,
    delta: Arc<DeltaTuple>,
    next: Option<Arc<JournalTuple>>,
    resolved: bool,
}

impl PreparedUpdate {
    /// Version the update landed on, after any rebase
    pub fn target(&self) -> &Arc<JournalTuple> {
        &self.target
    }

    /// Version that commit will publish; `None` for a delete
    pub fn next_version(&self) -> Option<&Arc<JournalTuple>> {
        self.next.as_ref()
    }

    /// The delta being applied
    pub fn delta(&self) -> &Arc<DeltaTuple> {
        &self.delta
    }

    /// Whether the update landed on a later version than `base`
    pub fn is_rebased(&self, base: &JournalTuple) -> bool {
        self.target.version != base.version
    }

    /// Publish the update
    pub fn commit(mut self) -> Option<Arc<JournalTuple>> {
        self.resolved = true;
        self.target.resolve(Some(self.ticket), true)
    }

    /// Discard the update
    pub fn rollback(mut self) {
        self.resolved = true;
        self.target.resolve(Some(self.ticket), false);
    }
}

impl Drop for PreparedUpdate {
    fn drop(&mut self) {
        if !self.resolved {
            self.target.resolve(Some(self.ticket), false);
        }
    }
}

impl fmt::Debug for PreparedUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedUpdate")
            .field("chain", &self.target.chain)
            .field("version", &self.target.version)
            .field("delta", &self.delta)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::EditableTuple;

    fn scheme() -> Arc<FieldSet> {
        FieldSet::builder(Some("urn:x:Counter"))
            .field("name", "urn:builtin:string")
            .field("count", "urn:builtin:int")
            .build()
            .unwrap()
    }

    fn first() -> Arc<JournalTuple> {
        let data = ValueTuple::from_pairs(scheme(), &[("name", "a".into()), ("count", 0.into())]).unwrap();
        JournalTuple::new(data)
    }

    fn set(version: &Arc<JournalTuple>, index: usize, value: Value) -> Arc<DeltaTuple> {
        let mut delta = version.edit();
        delta.set(index, value).unwrap();
        Arc::new(delta)
    }

    #[test]
    fn commit_links_the_next_version() {
        let v0 = first();
        let v1 = v0.update(set(&v0, 1, Value::Int(1))).unwrap().unwrap();

        assert_eq!(v1.version(), 1);
        assert_eq!(v1.chain_id(), v0.chain_id());
        assert!(Arc::ptr_eq(&v0.next_version().unwrap(), &v1));
        assert!(Arc::ptr_eq(&v0.latest_version().unwrap(), &v1));
        assert_eq!(v1.get(1).unwrap(), Value::Int(1));
        assert_eq!(v0.committed_delta().unwrap().dirty_fields(), vec![1]);
    }

    #[test]
    fn stale_delta_is_rebased_onto_latest() {
        let v0 = first();
        let v1 = v0.update(set(&v0, 1, Value::Int(1))).unwrap().unwrap();

        let prepared = v0.prepare_update(set(&v0, 0, Value::text("b"))).unwrap();
        assert!(prepared.is_rebased(&v0));
        assert!(Arc::ptr_eq(prepared.target(), &v1));
        let v2 = prepared.commit().unwrap();

        assert_eq!(v2.version(), 2);
        assert_eq!(v2.get(0).unwrap(), Value::text("b"));
        assert_eq!(v2.get(1).unwrap(), Value::Int(1));
    }

    #[test]
    fn rollback_leaves_chain_untouched() {
        let v0 = first();
        let prepared = v0.prepare_update(set(&v0, 1, Value::Int(5))).unwrap();
        assert!(v0.is_pending());
        prepared.rollback();
        assert!(!v0.is_pending());
        assert!(v0.next_version().is_none());
        assert!(v0.is_latest());
    }

    #[test]
    fn dropped_handle_rolls_back() {
        let v0 = first();
        {
            let _prepared = v0.prepare_update(set(&v0, 1, Value::Int(5))).unwrap();
        }
        assert!(!v0.is_pending());
        assert!(v0.update(set(&v0, 1, Value::Int(6))).unwrap().is_some());
    }

    #[test]
    fn commit_without_pending_is_a_no_op() {
        let v0 = first();
        assert!(v0.commit().is_none());
        v0.rollback();
        assert!(v0.next_version().is_none());
    }

    #[test]
    fn deleted_chain_rejects_updates() {
        let v0 = first();
        let deleted = v0.update(Arc::new(DeltaTuple::delete(Arc::clone(&v0) as TupleRef))).unwrap();
        assert!(deleted.is_none());
        assert!(v0.is_deleted_version());
        assert!(v0.latest_version().is_none());
        assert!(matches!(
            v0.update(set(&v0, 1, Value::Int(1))),
            Err(Error::RecordDeleted { version: 0 })
        ));
    }

    #[test]
    fn bounded_wait_times_out() {
        let v0 = first();
        let _held = v0.prepare_update(set(&v0, 1, Value::Int(1))).unwrap();
        let result = v0.prepare_update_timeout(set(&v0, 0, Value::text("x")), Some(Duration::from_millis(20)));
        assert!(matches!(result, Err(Error::WaitTimeout { version: 0, .. })));
    }

    #[test]
    fn versions_carry_the_ambient_transaction() {
        let v0 = first();
        let v1 = TransactionContext::scope(11, || v0.update(set(&v0, 1, Value::Int(2))).unwrap().unwrap());
        assert_eq!(v0.transaction_id(), crate::constants::NO_TRANSACTION);
        assert_eq!(v1.transaction_id(), 11);
    }

    #[test]
    fn dropped_chains_are_released() {
        let v0 = first();
        let v1 = v0.update(set(&v0, 1, Value::Int(1))).unwrap().unwrap();
        let v2 = v0.update(set(&v0, 0, Value::text("b"))).unwrap().unwrap();
        assert_eq!(v0.committed_delta().unwrap().get(0).unwrap(), Value::text("a"));
        assert_eq!(v1.committed_delta().unwrap().get(1).unwrap(), Value::Int(1));

        let weak = [Arc::downgrade(&v0), Arc::downgrade(&v1), Arc::downgrade(&v2)];
        drop((v0, v1, v2));
        assert!(weak.iter().all(|w| w.upgrade().is_none()));
    }

    #[test]
    fn deleted_chains_are_released() {
        let v0 = first();
        v0.update(Arc::new(DeltaTuple::delete(Arc::clone(&v0) as TupleRef))).unwrap();
        let weak = Arc::downgrade(&v0);
        drop(v0);
        assert!(weak.upgrade().is_none());
    }
}
