//! In-memory repository
//!
//! Rows live in `BTreeMap`s keyed by identifier, so batch fetches come back
//! in ascending-id order regardless of the order identifiers were asked for.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tracing::trace;

use crate::error::{SyncError, SyncResult};
use crate::model::{Attributes, EntityId, Record};
use crate::relationships::PivotConfig;
use super::core::Repository;

/// Thread-safe in-memory storage implementing [`Repository`]
#[derive(Debug)]
pub struct InMemoryRepository {
    tables: DashMap<String, BTreeMap<EntityId, Attributes>>,
    pivots: DashMap<String, BTreeSet<(EntityId, EntityId)>>,
    next_id: AtomicI64,
    writes: AtomicUsize,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            pivots: DashMap::new(),
            next_id: AtomicI64::new(1),
            writes: AtomicUsize::new(0),
        }
    }

    /// Create and persist a record in one step
    pub fn insert(&self, entity_type: &str, attributes: Attributes) -> SyncResult<Record> {
        let mut record = self.create(entity_type, attributes);
        self.save(&mut record)?;
        Ok(record)
    }

    /// Number of rows stored for `entity_type`
    pub fn count(&self, entity_type: &str) -> usize {
        self.tables.get(entity_type).map(|table| table.len()).unwrap_or(0)
    }

    /// Number of write operations performed so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Deterministic serialization of every table and pivot row
    pub fn snapshot(&self) -> String {
        let tables: BTreeMap<String, BTreeMap<EntityId, Attributes>> = self
            .tables
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let pivots: BTreeMap<String, BTreeSet<(EntityId, EntityId)>> = self
            .pivots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut snapshot = serde_json::Map::new();
        snapshot.insert("tables".to_string(), serde_json::to_value(tables).unwrap_or(Value::Null));
        snapshot.insert("pivots".to_string(), serde_json::to_value(pivots).unwrap_or(Value::Null));
        Value::Object(snapshot).to_string()
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Pivot rows hold their two columns in name order, so both sides of a
/// many-to-many relation read and write the same rows
fn pivot_row(pivot: &PivotConfig, parent: EntityId, related: EntityId) -> (EntityId, EntityId) {
    if pivot.local_key <= pivot.foreign_key {
        (parent, related)
    } else {
        (related, parent)
    }
}

impl Repository for InMemoryRepository {
    fn find(&self, entity_type: &str, id: EntityId) -> SyncResult<Option<Record>> {
        Ok(self
            .tables
            .get(entity_type)
            .and_then(|table| table.get(&id).cloned())
            .map(|attributes| Record::from_persisted(entity_type, id, attributes)))
    }

    fn find_many(&self, entity_type: &str, ids: &[EntityId]) -> SyncResult<Vec<Record>> {
        let wanted: BTreeSet<EntityId> = ids.iter().copied().collect();
        let Some(table) = self.tables.get(entity_type) else {
            return Ok(Vec::new());
        };

        Ok(table
            .iter()
            .filter(|(id, _)| wanted.contains(*id))
            .map(|(id, attributes)| Record::from_persisted(entity_type, *id, attributes.clone()))
            .collect())
    }

    fn find_by_foreign_key(&self, entity_type: &str, column: &str, id: EntityId) -> SyncResult<Vec<Record>> {
        let Some(table) = self.tables.get(entity_type) else {
            return Ok(Vec::new());
        };

        Ok(table
            .iter()
            .filter(|(_, attributes)| attributes.get(column).and_then(EntityId::from_json) == Some(id))
            .map(|(row_id, attributes)| Record::from_persisted(entity_type, *row_id, attributes.clone()))
            .collect())
    }

    fn save(&self, record: &mut Record) -> SyncResult<()> {
        let mut table = self.tables.entry(record.entity_type().to_string()).or_default();

        let id = match record.id() {
            Some(id) => {
                if !table.contains_key(&id) {
                    return Err(SyncError::NotFound {
                        entity_type: record.entity_type().to_string(),
                        id: id.to_string(),
                    });
                }
                id
            }
            None => EntityId(self.next_id.fetch_add(1, Ordering::SeqCst)),
        };

        trace!("Saving {} {}", record.entity_type(), id);
        table.insert(id, record.attributes().clone());
        drop(table);

        record.mark_persisted(id);
        self.record_write();
        Ok(())
    }

    fn delete(&self, record: &Record) -> SyncResult<()> {
        let id = record.id().ok_or_else(|| SyncError::MissingPrimaryKey {
            entity_type: record.entity_type().to_string(),
        })?;

        trace!("Deleting {} {}", record.entity_type(), id);
        if let Some(mut table) = self.tables.get_mut(record.entity_type()) {
            table.remove(&id);
        }
        self.record_write();
        Ok(())
    }

    fn attach(&self, pivot: &PivotConfig, parent: EntityId, related: EntityId) -> SyncResult<()> {
        trace!("Attaching {} -> {} in {}", parent, related, pivot.table);
        self.pivots.entry(pivot.table.clone()).or_default().insert(pivot_row(pivot, parent, related));
        self.record_write();
        Ok(())
    }

    fn detach(&self, pivot: &PivotConfig, parent: EntityId, related: EntityId) -> SyncResult<()> {
        trace!("Detaching {} -> {} in {}", parent, related, pivot.table);
        if let Some(mut rows) = self.pivots.get_mut(&pivot.table) {
            rows.remove(&pivot_row(pivot, parent, related));
        }
        self.record_write();
        Ok(())
    }

    fn pivot_ids(&self, pivot: &PivotConfig, parent: EntityId) -> SyncResult<Vec<EntityId>> {
        Ok(self
            .pivots
            .get(&pivot.table)
            .map(|rows| {
                rows.iter()
                    .map(|&(first, second)| pivot_row(pivot, first, second))
                    .filter(|(local, _)| *local == parent)
                    .map(|(_, related)| related)
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_save_assigns_ids() {
        let repo = InMemoryRepository::new();
        let first = repo.insert("Wheel", attrs(json!({ "size": 1 }))).unwrap();
        let second = repo.insert("Wheel", attrs(json!({ "size": 2 }))).unwrap();

        assert_eq!(first.id(), Some(EntityId(1)));
        assert_eq!(second.id(), Some(EntityId(2)));
        assert!(!first.is_dirty());
        assert_eq!(repo.count("Wheel"), 2);
        assert_eq!(repo.write_count(), 2);
    }

    #[test]
    fn test_update_and_find() {
        let repo = InMemoryRepository::new();
        let mut wheel = repo.insert("Wheel", attrs(json!({ "size": 1 }))).unwrap();
        wheel.set("size", 4);
        repo.save(&mut wheel).unwrap();

        let found = repo.find_or_fail("Wheel", wheel.id().unwrap()).unwrap();
        assert_eq!(found.get("size"), Some(&json!(4)));
        assert!(repo.find("Wheel", EntityId(99)).unwrap().is_none());
        assert!(matches!(
            repo.find_or_fail("Wheel", EntityId(99)),
            Err(SyncError::NotFound { .. })
        ));
    }

    #[test]
    fn test_save_missing_row_fails() {
        let repo = InMemoryRepository::new();
        let mut ghost = Record::from_persisted("Wheel", EntityId(5), Attributes::new());
        assert!(matches!(repo.save(&mut ghost), Err(SyncError::NotFound { .. })));
    }

    #[test]
    fn test_find_many_uses_repository_order() {
        let repo = InMemoryRepository::new();
        for size in 1..=3 {
            repo.insert("Wheel", attrs(json!({ "size": size }))).unwrap();
        }

        let found = repo.find_many("Wheel", &[EntityId(3), EntityId(1)]).unwrap();
        let ids: Vec<EntityId> = found.iter().filter_map(Record::id).collect();
        assert_eq!(ids, vec![EntityId(1), EntityId(3)]);
    }

    #[test]
    fn test_pivot_rows() {
        let repo = InMemoryRepository::new();
        let pivot = PivotConfig::new("manufacturer_vehicle", "manufacturer_id", "vehicle_id");

        repo.attach(&pivot, EntityId(1), EntityId(10)).unwrap();
        repo.attach(&pivot, EntityId(1), EntityId(11)).unwrap();
        repo.attach(&pivot, EntityId(2), EntityId(10)).unwrap();
        assert_eq!(repo.pivot_ids(&pivot, EntityId(1)).unwrap(), vec![EntityId(10), EntityId(11)]);

        repo.detach(&pivot, EntityId(1), EntityId(10)).unwrap();
        assert_eq!(repo.pivot_ids(&pivot, EntityId(1)).unwrap(), vec![EntityId(11)]);

        let inverse = PivotConfig::new("manufacturer_vehicle", "vehicle_id", "manufacturer_id");
        assert_eq!(repo.pivot_ids(&inverse, EntityId(11)).unwrap(), vec![EntityId(1)]);
        assert_eq!(repo.pivot_ids(&inverse, EntityId(10)).unwrap(), vec![EntityId(2)]);
    }

    #[test]
    fn test_snapshot_is_stable() {
        let repo = InMemoryRepository::new();
        repo.insert("Wheel", attrs(json!({ "size": 1 }))).unwrap();
        let before = repo.snapshot();
        assert_eq!(before, repo.snapshot());

        repo.insert("Wheel", attrs(json!({ "size": 2 }))).unwrap();
        assert_ne!(before, repo.snapshot());
    }
}
