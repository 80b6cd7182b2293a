//! In-memory table of journal chains
//!
//! A [`JournalTable`] holds the latest version of every record over one
//! scheme and is the layer that turns rebases into conflicts: an update
//! prepared on a stale version is rejected when a delta committed in
//! between touched the same fields with a different value. Unique keys are
//! checked against the other rows before anything commits.

use std::sync::Arc;
use std::time::Duration;

use crate::aggregate::{Aggregate, EditableAggregate};
use crate::core::JournalConfig;
use crate::registry::Type;
use crate::storage::conflict::detect_conflict;
use crate::tuple::{DeltaTuple, JournalTuple, Tuple, TupleRef};
use crate::types::{Error, FieldSet, Key, KeyTuple, Projection, Result};
use crate::{log_debug, log_trace};

/// Latest versions of a set of records sharing one scheme
#[derive(Debug)]
pub struct JournalTable {
    scheme: Arc<FieldSet>,
    rows: EditableAggregate<JournalTuple>,
    wait_timeout: Option<Duration>,
}

impl JournalTable {
    /// Empty table with unbounded waits
    pub fn new(scheme: Arc<FieldSet>) -> Self {
        Self::with_config(scheme, &JournalConfig::default())
    }

    /// Empty table using the journal settings from `config`
    pub fn with_config(scheme: Arc<FieldSet>, config: &JournalConfig) -> Self {
        Self {
            rows: EditableAggregate::new(Arc::clone(&scheme)),
            scheme,
            wait_timeout: config.wait_timeout(),
        }
    }

    /// Empty table over the scheme of a record type
    pub fn for_type(ty: &Type, config: &JournalConfig) -> Result<Self> {
        let scheme = ty
            .scheme()
            .ok_or_else(|| Error::type_mismatch("record type", ty.uri()))?;
        Ok(Self::with_config(Arc::clone(scheme), config))
    }

    /// Scheme of every row
    pub fn scheme(&self) -> &Arc<FieldSet> {
        &self.scheme
    }

    /// Number of live rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Latest version of every live row, in insertion order
    pub fn rows(&self) -> &[Arc<JournalTuple>] {
        self.rows.elements()
    }

    /// Latest version of the record with `chain_id`
    pub fn latest(&self, chain_id: u64) -> Option<&Arc<JournalTuple>> {
        self.rows.elements().iter().find(|row| row.chain_id() == chain_id)
    }

    fn position_of(&self, chain_id: u64) -> Option<usize> {
        self.rows.elements().iter().position(|row| row.chain_id() == chain_id)
    }

    fn check_unique(&mut self, candidate: &dyn Tuple, chain_id: Option<u64>, delta: &Arc<DeltaTuple>) -> Result<()> {
        let unique: Vec<Arc<Key>> = self.scheme.keys().iter().filter(|k| k.is_unique()).cloned().collect();
        for key in unique {
            let value = key.project(candidate)?;
            if value.is_all_null() {
                continue;
            }
            let projection: Arc<dyn Projection> = key.clone();
            let Some(index) = self.rows.get_index(&projection, true)? else {
                continue;
            };
            if index.get(&value).iter().any(|row| Some(row.chain_id()) != chain_id) {
                return Err(Error::UniqueKeyViolation {
                    key: key.key_name().to_string(),
                    value,
                    delta: Arc::clone(delta),
                });
            }
        }
        Ok(())
    }

    /// Add a new record as version 0 of a fresh chain
    pub fn insert(&mut self, tuple: &dyn Tuple) -> Result<Arc<JournalTuple>> {
        crate::aggregate::check_content(&self.scheme, tuple)?;
        let row = JournalTuple::from_tuple(tuple);
        let delta = Arc::new(DeltaTuple::between(None, Some(tuple))?);
        self.check_unique(row.as_dyn(), None, &delta)?;
        self.rows.push(Arc::clone(&row))?;
        log_trace!("Inserted chain {} into {:?}", row.chain_id(), self.scheme.owner());
        Ok(row)
    }

    /// Apply `delta` to the record `base` belongs to
    ///
    /// `base` may be stale. The update lands on the latest version; it is
    /// rolled back with [`Error::UpdateConflict`] if a delta committed since
    /// `base` changed one of the same fields to a different value, and with
    /// [`Error::UniqueKeyViolation`] if the new version duplicates a unique
    /// key. Returns the new version, or `None` for a delete.
    pub fn update(&mut self, base: &Arc<JournalTuple>, delta: DeltaTuple) -> Result<Option<Arc<JournalTuple>>> {
        let position = self
            .position_of(base.chain_id())
            .ok_or(Error::RecordDeleted { version: base.version() })?;
        let delta = Arc::new(delta);
        let prepared = base.prepare_update_timeout(Arc::clone(&delta), self.wait_timeout)?;

        if prepared.is_rebased(base) {
            if let Some(report) = detect_conflict(base, prepared.target(), &delta) {
                log_debug!(
                    "Conflict on chain {} between versions {} and {}",
                    base.chain_id(),
                    base.version(),
                    prepared.target().version()
                );
                prepared.rollback();
                return Err(Error::UpdateConflict(Box::new(report)));
            }
        }

        // Dropping `prepared` on error rolls the update back
        if let Some(next) = prepared.next_version().cloned() {
            self.check_unique(next.as_dyn(), Some(base.chain_id()), &delta)?;
        }

        let committed = prepared.commit();
        match &committed {
            Some(next) => {
                self.rows.replace(position, Arc::clone(next))?;
            }
            None => {
                self.rows.remove_at(position)?;
            }
        }
        Ok(committed)
    }

    /// Delete the record `base` belongs to
    pub fn delete(&mut self, base: &Arc<JournalTuple>) -> Result<()> {
        let delta = DeltaTuple::delete(Arc::clone(base) as TupleRef);
        self.update(base, delta).map(|_| ())
    }

    /// One row whose key `key_name` equals `key`
    pub fn get_one(&mut self, key_name: &str, key: &KeyTuple) -> Result<Option<Arc<JournalTuple>>> {
        let projection = self.rows.key(key_name)?;
        self.rows.get_one(&projection, key)
    }

    /// Rows whose key `key_name` equals `key`
    pub fn get(&mut self, key_name: &str, key: &KeyTuple) -> Result<Aggregate<JournalTuple>> {
        let projection = self.rows.key(key_name)?;
        self.rows.get(&projection, key)
    }
}
