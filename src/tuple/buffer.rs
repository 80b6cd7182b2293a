//! Accumulating edit surface over a record
//!
//! A [`BufferTuple`] collects local edits on top of the version it was
//! loaded from. Reads see the edits first and fall through to the loaded
//! record. `commit` turns the edits into a delta against the newest
//! upstream state; `refresh` pulls upstream changes in and keeps local
//! edits only where upstream left the field alone.

use std::fmt;
use std::sync::Arc;

use crate::tuple::{check_writable, DeltaTuple, EditableTuple, FieldMask, JournalTuple, Tuple, TupleRef, ValueTuple};
use crate::types::{Error, FieldSet, Result, Value};

/// Where a buffer's record lives
#[derive(Clone, Debug)]
pub enum Origin {
    /// A versioned record; commits go through its journal chain
    Journal(Arc<JournalTuple>),
    /// A free-standing record (or none yet); commits replace it in place
    Detached(Option<TupleRef>),
}

/// Editable front of a record
pub struct BufferTuple {
    field_set: Arc<FieldSet>,
    origin: Origin,
    edits: FieldMask,
    values: Vec<Value>,
    deleted: bool,
}

impl BufferTuple {
    /// Buffer over a version of a versioned record
    pub fn over_journal(version: Arc<JournalTuple>) -> Self {
        let field_set = Arc::clone(version.field_set());
        Self::with_origin(field_set, Origin::Journal(version))
    }

    /// Buffer over a free-standing record
    pub fn over(tuple: TupleRef) -> Self {
        let field_set = Arc::clone(tuple.field_set());
        Self::with_origin(field_set, Origin::Detached(Some(tuple)))
    }

    /// Buffer for a record that does not exist yet
    pub fn detached(field_set: Arc<FieldSet>) -> Self {
        Self::with_origin(field_set, Origin::Detached(None))
    }

    fn with_origin(field_set: Arc<FieldSet>, origin: Origin) -> Self {
        let len = field_set.len();
        Self {
            field_set,
            origin,
            edits: FieldMask::with_capacity(len),
            values: vec![Value::Null; len],
            deleted: false,
        }
    }

    /// Current origin
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Record reads fall through to
    fn loaded(&self) -> Option<TupleRef> {
        match &self.origin {
            Origin::Journal(v) => Some(Arc::clone(v) as TupleRef),
            Origin::Detached(t) => t.clone(),
        }
    }

    fn loaded_value(&self, index: usize) -> Value {
        match &self.origin {
            Origin::Journal(v) => v.stored(index),
            Origin::Detached(Some(t)) => t.stored(index),
            Origin::Detached(None) => Value::Null,
        }
    }

    /// Null the value at `index`
    pub fn clear(&mut self, index: usize) -> Result<()> {
        self.set(index, Value::Null)
    }

    /// Mark the record for deletion on the next commit
    pub fn delete(&mut self) {
        self.deleted = true;
    }

    /// Whether a delete is staged
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Whether the field at `index` was edited locally
    pub fn is_edited(&self, index: usize) -> bool {
        self.edits.contains(index)
    }

    /// Whether anything is staged
    pub fn has_changes(&self) -> bool {
        self.deleted || !self.edits.is_empty()
    }

    /// Staged changes as a delta against `base`
    fn delta_against(&self, base: Option<TupleRef>) -> Result<DeltaTuple> {
        if self.deleted {
            return match base {
                Some(base) => Ok(DeltaTuple::delete(base)),
                None => Err(Error::read_only("nothing to delete")),
            };
        }
        let mut delta = match base {
            Some(base) => DeltaTuple::edit(base),
            None => DeltaTuple::insert(Arc::clone(&self.field_set)),
        };
        for index in self.edits.iter() {
            delta.set(index, self.values[index].clone())?;
        }
        Ok(delta)
    }

    /// Staged changes as a delta against the newest upstream state
    pub fn delta(&self) -> Result<DeltaTuple> {
        self.delta_against(self.upstream()?)
    }

    fn upstream(&self) -> Result<Option<TupleRef>> {
        match &self.origin {
            Origin::Journal(v) => {
                let latest = v
                    .latest_version()
                    .ok_or(Error::RecordDeleted { version: v.version() })?;
                Ok(Some(latest as TupleRef))
            }
            Origin::Detached(t) => Ok(t.clone()),
        }
    }

    fn reset(&mut self, origin: Origin) {
        self.origin = origin;
        self.edits.clear();
        self.values.iter_mut().for_each(|v| *v = Value::Null);
        self.deleted = false;
    }

    /// Publish the staged changes
    ///
    /// Journal-backed buffers commit a delta on the latest version and move
    /// onto the resulting version. Returns the record now backing the
    /// buffer, or `None` when the commit deleted it.
    pub fn commit(&mut self) -> Result<Option<TupleRef>> {
        match self.origin.clone() {
            Origin::Journal(v) => {
                let latest = v
                    .latest_version()
                    .ok_or(Error::RecordDeleted { version: v.version() })?;
                let delta = self.delta_against(Some(Arc::clone(&latest) as TupleRef))?;
                if delta.is_empty() {
                    self.reset(Origin::Journal(Arc::clone(&latest)));
                    return Ok(Some(latest as TupleRef));
                }
                match latest.update(Arc::new(delta))? {
                    Some(next) => {
                        self.reset(Origin::Journal(Arc::clone(&next)));
                        Ok(Some(next as TupleRef))
                    }
                    None => {
                        self.reset(Origin::Detached(None));
                        Ok(None)
                    }
                }
            }
            Origin::Detached(_) => {
                if self.deleted {
                    self.reset(Origin::Detached(None));
                    return Ok(None);
                }
                let frozen: TupleRef = Arc::new(self.snapshot());
                self.reset(Origin::Detached(Some(Arc::clone(&frozen))));
                Ok(Some(frozen))
            }
        }
    }

    /// Drop every staged change and reload the newest upstream state
    pub fn revert(&mut self) -> Result<()> {
        let origin = match &self.origin {
            Origin::Journal(v) => Origin::Journal(
                v.latest_version()
                    .ok_or(Error::RecordDeleted { version: v.version() })?,
            ),
            detached => detached.clone(),
        };
        self.reset(origin);
        Ok(())
    }

    /// Merge upstream changes into the buffer
    ///
    /// Fields changed upstream since the buffer was loaded take the upstream
    /// value and lose their local edit. Other local edits are kept.
    pub fn refresh(&mut self) -> Result<()> {
        let Origin::Journal(loaded) = &self.origin else {
            return Ok(());
        };
        let latest = loaded
            .latest_version()
            .ok_or(Error::RecordDeleted { version: loaded.version() })?;
        if Arc::ptr_eq(&latest, loaded) {
            return Ok(());
        }

        let changed: Vec<usize> = self
            .edits
            .iter()
            .filter(|&i| loaded.stored(i) != latest.stored(i))
            .collect();
        for index in changed {
            self.edits.remove(index);
            self.values[index] = Value::Null;
        }
        self.origin = Origin::Journal(latest);
        Ok(())
    }

    /// Immutable copy of the buffer contents
    pub fn freeze(&self) -> Option<ValueTuple> {
        (!self.deleted).then(|| self.snapshot())
    }
}

impl Tuple for BufferTuple {
    fn field_set(&self) -> &Arc<FieldSet> {
        &self.field_set
    }

    fn stored(&self, index: usize) -> Value {
        if self.edits.contains(index) {
            self.values[index].clone()
        } else {
            self.loaded_value(index)
        }
    }

    fn as_dyn(&self) -> &dyn Tuple {
        self
    }

    fn is_mutable(&self) -> bool {
        true
    }

    fn base_extent(&self) -> Option<&Arc<ValueTuple>> {
        match &self.origin {
            Origin::Journal(v) => v.base_extent(),
            Origin::Detached(Some(t)) => t.base_extent(),
            Origin::Detached(None) => None,
        }
    }
}

impl EditableTuple for BufferTuple {
    fn set(&mut self, index: usize, value: Value) -> Result<()> {
        check_writable(&self.field_set, index)?;
        self.edits.insert(index);
        self.values[index] = value;
        Ok(())
    }
}

impl fmt::Debug for BufferTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferTuple")
            .field("owner", &self.field_set.owner())
            .field("edits", &self.edits.iter().collect::<Vec<_>>())
            .field("deleted", &self.deleted)
            .field("loaded", &self.loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> Arc<FieldSet> {
        FieldSet::builder(Some("urn:x:Doc"))
            .field("title", "urn:builtin:string")
            .field("body", "urn:builtin:string")
            .build()
            .unwrap()
    }

    fn doc() -> Arc<JournalTuple> {
        JournalTuple::new(ValueTuple::from_pairs(scheme(), &[("title", "t".into()), ("body", "b".into())]).unwrap())
    }

    #[test]
    fn reads_see_local_edits_first() {
        let mut buffer = BufferTuple::over_journal(doc());
        buffer.set_by_name("title", Value::text("new")).unwrap();
        assert_eq!(buffer.get(0).unwrap(), Value::text("new"));
        assert_eq!(buffer.get(1).unwrap(), Value::text("b"));
        assert!(buffer.is_edited(0));
    }

    #[test]
    fn commit_publishes_a_new_version() {
        let v0 = doc();
        let mut buffer = BufferTuple::over_journal(Arc::clone(&v0));
        buffer.set(1, Value::text("changed")).unwrap();
        let committed = buffer.commit().unwrap().unwrap();

        assert_eq!(committed.get(1).unwrap(), Value::text("changed"));
        assert_eq!(v0.next_version().unwrap().version(), 1);
        assert!(!buffer.has_changes());
    }

    #[test]
    fn commit_rebases_onto_concurrent_versions() {
        let v0 = doc();
        let mut buffer = BufferTuple::over_journal(Arc::clone(&v0));
        buffer.set(1, Value::text("mine")).unwrap();

        let mut other = v0.edit();
        other.set(0, Value::text("theirs")).unwrap();
        v0.update(Arc::new(other)).unwrap();

        let committed = buffer.commit().unwrap().unwrap();
        assert_eq!(committed.get(0).unwrap(), Value::text("theirs"));
        assert_eq!(committed.get(1).unwrap(), Value::text("mine"));
    }

    #[test]
    fn refresh_prefers_upstream_on_overlap() {
        let v0 = doc();
        let mut buffer = BufferTuple::over_journal(Arc::clone(&v0));
        buffer.set(0, Value::text("local title")).unwrap();
        buffer.set(1, Value::text("local body")).unwrap();

        let mut other = v0.edit();
        other.set(0, Value::text("upstream title")).unwrap();
        v0.update(Arc::new(other)).unwrap();

        buffer.refresh().unwrap();
        assert_eq!(buffer.get(0).unwrap(), Value::text("upstream title"));
        assert_eq!(buffer.get(1).unwrap(), Value::text("local body"));
        assert!(!buffer.is_edited(0));
    }

    #[test]
    fn revert_drops_edits() {
        let mut buffer = BufferTuple::over_journal(doc());
        buffer.set(0, Value::text("x")).unwrap();
        buffer.delete();
        buffer.revert().unwrap();
        assert!(!buffer.has_changes());
        assert_eq!(buffer.get(0).unwrap(), Value::text("t"));
    }

    #[test]
    fn delete_commits_a_delete_delta() {
        let v0 = doc();
        let mut buffer = BufferTuple::over_journal(Arc::clone(&v0));
        buffer.delete();
        assert!(buffer.commit().unwrap().is_none());
        assert!(v0.latest_version().is_none());
    }

    #[test]
    fn detached_buffers_freeze_in_place() {
        let mut buffer = BufferTuple::detached(scheme());
        buffer.set(0, Value::text("draft")).unwrap();
        assert!(buffer.delta().unwrap().is_insert());
        let committed = buffer.commit().unwrap().unwrap();
        assert_eq!(committed.get(0).unwrap(), Value::text("draft"));
        assert_eq!(buffer.get(0).unwrap(), Value::text("draft"));
    }
}
