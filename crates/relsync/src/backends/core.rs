//! Core Repository Trait
//!
//! The sync engine never talks to storage directly. Everything it needs,
//! reads while staging and writes while committing, goes through this
//! trait. Implementations own their transactionality; the engine wraps
//! nothing in a transaction and retries nothing.

use crate::error::{SyncError, SyncResult};
use crate::model::{Attributes, EntityId, Record};
use crate::relationships::{PivotConfig, RelationDescriptor, RelationKind};

/// Storage capability consumed by the sync engine
pub trait Repository {
    /// Find a record by its identifier
    fn find(&self, entity_type: &str, id: EntityId) -> SyncResult<Option<Record>>;

    /// Find all records whose identifier is in `ids`, in repository order
    fn find_many(&self, entity_type: &str, ids: &[EntityId]) -> SyncResult<Vec<Record>>;

    /// Find all records whose `column` holds `id`
    fn find_by_foreign_key(&self, entity_type: &str, column: &str, id: EntityId) -> SyncResult<Vec<Record>>;

    /// Persist a record, assigning its identifier if it is new
    fn save(&self, record: &mut Record) -> SyncResult<()>;

    /// Delete a persisted record
    fn delete(&self, record: &Record) -> SyncResult<()>;

    /// Insert a pivot row linking `parent` and `related`
    fn attach(&self, pivot: &PivotConfig, parent: EntityId, related: EntityId) -> SyncResult<()>;

    /// Remove the pivot row linking `parent` and `related`
    fn detach(&self, pivot: &PivotConfig, parent: EntityId, related: EntityId) -> SyncResult<()>;

    /// Identifiers linked to `parent` through the pivot table
    fn pivot_ids(&self, pivot: &PivotConfig, parent: EntityId) -> SyncResult<Vec<EntityId>>;

    /// Build a new record; it stays unpersisted until `save`
    fn create(&self, entity_type: &str, attributes: Attributes) -> Record {
        Record::with_attributes(entity_type, attributes)
    }

    /// Find a record by its identifier or fail with `NotFound`
    fn find_or_fail(&self, entity_type: &str, id: EntityId) -> SyncResult<Record> {
        self.find(entity_type, id)?.ok_or_else(|| SyncError::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        })
    }

    /// Load the persisted state of `relation` for `parent`.
    ///
    /// Singular relations yield at most one record. An unpersisted parent has
    /// no dependents yet, so only its own foreign key is followed.
    fn load_related(&self, relation: &RelationDescriptor, parent: &Record) -> SyncResult<Vec<Record>> {
        match relation.kind {
            RelationKind::ManyToOne => match parent.foreign_key(&relation.foreign_key) {
                Some(id) => Ok(self.find(&relation.related_type, id)?.into_iter().collect()),
                None => Ok(Vec::new()),
            },
            RelationKind::OneToOne | RelationKind::OneToMany => {
                let Some(parent_id) = parent.id() else {
                    return Ok(Vec::new());
                };
                let mut related =
                    self.find_by_foreign_key(&relation.related_type, &relation.foreign_key, parent_id)?;
                if relation.kind == RelationKind::OneToOne {
                    related.truncate(1);
                }
                Ok(related)
            }
            RelationKind::ManyToMany => {
                let Some(parent_id) = parent.id() else {
                    return Ok(Vec::new());
                };
                let ids = self.pivot_ids(relation.pivot()?, parent_id)?;
                self.find_many(&relation.related_type, &ids)
            }
            kind => Err(SyncError::unsupported_kind(&relation.name, kind)),
        }
    }
}
