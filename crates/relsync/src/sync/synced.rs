//! Synced records - A parent record bundled with its relation staging
//!
//! `SyncedRecord::fill` is the attribute-map entry point: keys naming a
//! declared relation are staged, the rest are filled onto the parent.
//! Companion keys select the mode, using the configured prefixes:
//!
//! - `wheels`: reconcile the relation against the value
//! - `new_wheels`: same, but inline attributes always build new records
//! - `delete_wheels`: clear a singular relation, or remove the listed
//!   members of a plural one

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::backends::Repository;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::model::{Attributes, EntityId, Record};
use crate::payload::RelationPayload;
use crate::relationships::RelationTable;
use super::reconciler::{ensure_supported, Reconciler, StageOptions};
use super::staging::StagingContext;

/// A parent record with staged relation changes
#[derive(Debug, Clone)]
pub struct SyncedRecord {
    record: Record,
    relations: Arc<RelationTable>,
    config: Arc<SyncConfig>,
    staging: StagingContext,
}

impl SyncedRecord {
    /// Start a new, unpersisted parent of the table's model
    pub fn new(relations: Arc<RelationTable>) -> Self {
        let record = Record::new(relations.model());
        Self::from_record(record, relations)
    }

    /// Wrap an existing record
    pub fn from_record(record: Record, relations: Arc<RelationTable>) -> Self {
        Self {
            record,
            relations,
            config: Arc::new(SyncConfig::default()),
            staging: StagingContext::new(),
        }
    }

    pub fn with_config(mut self, config: Arc<SyncConfig>) -> Self {
        self.config = config;
        self
    }

    /// Load a persisted parent by identifier
    pub fn find<R: Repository + ?Sized>(
        repo: &R,
        relations: Arc<RelationTable>,
        id: EntityId,
    ) -> SyncResult<Self> {
        let record = repo.find_or_fail(relations.model(), id)?;
        Ok(Self::from_record(record, relations))
    }

    /// Build a parent from an attribute map and save it with its relations
    pub fn create<R: Repository + ?Sized>(
        repo: &R,
        relations: Arc<RelationTable>,
        attributes: Attributes,
    ) -> SyncResult<Self> {
        let mut synced = Self::new(relations);
        synced.fill(repo, attributes)?;
        synced.save(repo)?;
        Ok(synced)
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    pub fn relations(&self) -> &RelationTable {
        &self.relations
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn staging(&self) -> &StagingContext {
        &self.staging
    }

    /// Stage relation keys and fill the remaining attributes onto the parent.
    ///
    /// Relation keys are staged in declared order. The primary key is never
    /// filled. If staging fails, nothing is filled onto the parent.
    pub fn fill<R: Repository + ?Sized>(&mut self, repo: &R, mut attributes: Attributes) -> SyncResult<&mut Self> {
        let relations = Arc::clone(&self.relations);

        for relation in relations.iter() {
            let new_key = self.config.new_key(&relation.name);
            let delete_key = self.config.delete_key(&relation.name);

            let data = attributes.remove(&relation.name);
            let new_data = attributes.remove(&new_key);
            let delete_data = attributes.remove(&delete_key);

            let force_new = new_data.as_ref().is_some_and(is_truthy);
            let delete = delete_data.as_ref().is_some_and(is_truthy);

            let value = if delete {
                delete_data
            } else if force_new {
                new_data
            } else {
                data
            };

            let Some(value) = value else {
                continue;
            };

            ensure_supported(relation)?;
            let payload = RelationPayload::from_json(relation, &value)?;
            self.stage(repo, &relation.name, payload, StageOptions { delete, force_new })?;
        }

        attributes.remove(&self.config.primary_key);
        if !attributes.is_empty() {
            debug!("Filling {} attributes onto {}", attributes.len(), self.record.entity_type());
            self.record.fill(&attributes);
        }
        Ok(self)
    }

    /// Stage a payload for relation `name`
    pub fn stage<R: Repository + ?Sized>(
        &mut self,
        repo: &R,
        name: &str,
        payload: RelationPayload,
        options: StageOptions,
    ) -> SyncResult<()> {
        let reconciler = Reconciler::new(repo, &self.config);
        self.staging
            .stage(&reconciler, &self.relations, &self.record, name, payload, options)
    }

    /// Save the parent, then commit every staged relation
    pub fn save<R: Repository + ?Sized>(&mut self, repo: &R) -> SyncResult<()> {
        if !self.record.exists() || self.record.is_dirty() {
            repo.save(&mut self.record)?;
        }
        self.staging.commit(repo, &self.relations, &mut self.record)?;
        Ok(())
    }

    /// Reload the parent from storage, dropping staged state
    pub fn fresh<R: Repository + ?Sized>(&self, repo: &R) -> SyncResult<Self> {
        let id = self.record.id().ok_or_else(|| SyncError::MissingPrimaryKey {
            entity_type: self.record.entity_type().to_string(),
        })?;
        let record = repo.find_or_fail(self.record.entity_type(), id)?;
        Ok(Self::from_record(record, Arc::clone(&self.relations)).with_config(Arc::clone(&self.config)))
    }

    /// Members of relation `name`, staged view first
    pub fn relation<R: Repository + ?Sized>(&self, repo: &R, name: &str) -> SyncResult<Vec<Record>> {
        let relation = self.relations.get(name)?;
        self.staging.related(repo, relation, &self.record)
    }

    /// The single member of a singular relation, staged view first
    pub fn related_one<R: Repository + ?Sized>(&self, repo: &R, name: &str) -> SyncResult<Option<Record>> {
        Ok(self.relation(repo, name)?.into_iter().next())
    }

    /// Whether the parent's own attributes changed
    pub fn is_dirty(&self) -> bool {
        self.record.is_dirty()
    }

    pub fn is_relation_dirty<R: Repository + ?Sized>(&self, repo: &R, name: &str) -> SyncResult<bool> {
        self.staging
            .is_relation_dirty(repo, &self.relations, &self.record, name)
    }

    pub fn are_relations_dirty<R: Repository + ?Sized>(&self, repo: &R) -> SyncResult<bool> {
        self.staging
            .are_relations_dirty(repo, &self.relations, &self.record)
    }

    /// Snapshot the change state of the parent
    pub fn sync_changes(&mut self) {
        self.record.sync_changes();
    }

    /// Snapshot the change state of every staged related record
    pub fn sync_relation_changes(&mut self) {
        self.staging.sync_relation_changes();
    }
}

/// Loose truthiness of a companion key value
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty() && text != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
    }
}
