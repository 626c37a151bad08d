//! Record - Dynamic entity with attribute dirty tracking
//!
//! Related records of any type flow through the same staging machinery, so
//! entities are held as field-value maps (the same shape `Model::to_fields`
//! produced) rather than concrete structs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::primary_key::EntityId;

/// Field-value pairs of a record, excluding its primary key
pub type Attributes = serde_json::Map<String, Value>;

/// An in-memory entity, persisted or not.
///
/// Every record carries an instance key so that records can be told apart
/// before the repository assigns them an identifier. Clones share the key:
/// a clone is another handle on the same logical instance.
///
/// Equality compares type, identifier and current attributes. The instance
/// key only decides between unpersisted records, so the same row loaded
/// twice compares equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    entity_type: String,
    id: Option<EntityId>,
    attributes: Attributes,
    #[serde(skip)]
    original: Attributes,
    #[serde(skip)]
    changes: Attributes,
    #[serde(skip, default = "Uuid::new_v4")]
    instance: Uuid,
}

impl Record {
    /// Create an empty, unpersisted record
    pub fn new(entity_type: &str) -> Self {
        Self::with_attributes(entity_type, Attributes::new())
    }

    /// Create an unpersisted record; every given attribute counts as dirty
    pub fn with_attributes(entity_type: &str, attributes: Attributes) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            id: None,
            attributes,
            original: Attributes::new(),
            changes: Attributes::new(),
            instance: Uuid::new_v4(),
        }
    }

    /// Hydrate a record as loaded from storage (clean)
    pub fn from_persisted(entity_type: &str, id: EntityId, attributes: Attributes) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            id: Some(id),
            original: attributes.clone(),
            attributes,
            changes: Attributes::new(),
            instance: Uuid::new_v4(),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    /// Whether the record has been persisted
    pub fn exists(&self) -> bool {
        self.id.is_some()
    }

    /// Record the identifier assigned on save and mark the record clean
    pub fn mark_persisted(&mut self, id: EntityId) {
        self.id = Some(id);
        self.sync_changes();
        self.sync_original();
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    /// Merge the given attributes onto this record in place
    pub fn fill(&mut self, attributes: &Attributes) {
        for (key, value) in attributes {
            self.attributes.insert(key.clone(), value.clone());
        }
    }

    /// Read a foreign key column as an identifier
    pub fn foreign_key(&self, column: &str) -> Option<EntityId> {
        self.get(column).and_then(EntityId::from_json)
    }

    /// Point a foreign key column at `id`, or null it
    pub fn set_foreign_key(&mut self, column: &str, id: Option<EntityId>) {
        let value = id.map(EntityId::to_json).unwrap_or(Value::Null);
        self.attributes.insert(column.to_string(), value);
    }

    /// Attribute names whose value differs from the last synced state
    pub fn dirty_attributes(&self) -> Vec<&str> {
        let mut dirty: Vec<&str> = self
            .attributes
            .iter()
            .filter(|(key, value)| self.original.get(key.as_str()) != Some(*value))
            .map(|(key, _)| key.as_str())
            .collect();

        dirty.extend(
            self.original
                .keys()
                .filter(|key| !self.attributes.contains_key(key.as_str()))
                .map(String::as_str),
        );
        dirty
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty_attributes().is_empty()
    }

    pub fn is_attribute_dirty(&self, key: &str) -> bool {
        self.attributes.get(key) != self.original.get(key)
    }

    /// Remember the current dirty attributes as the last change set.
    ///
    /// Dirtiness is left untouched; use `sync_original` to accept the
    /// current attributes as clean.
    pub fn sync_changes(&mut self) {
        let changes: Attributes = self
            .dirty_attributes()
            .into_iter()
            .map(|key| (key.to_string(), self.attributes.get(key).cloned().unwrap_or(Value::Null)))
            .collect();
        self.changes = changes;
    }

    /// Attributes captured by the last `sync_changes`
    pub fn changes(&self) -> &Attributes {
        &self.changes
    }

    pub fn was_changed(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Accept the current attributes as the clean state
    pub fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }

    pub fn instance_key(&self) -> Uuid {
        self.instance
    }

    pub fn is_same_instance(&self, other: &Record) -> bool {
        self.instance == other.instance
    }

    /// Persisted records match by type and id; unpersisted ones only by instance
    pub fn is_same_entity(&self, other: &Record) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b && self.entity_type == other.entity_type,
            _ => self.is_same_instance(other),
        }
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.entity_type == other.entity_type
            && self.id == other.id
            && self.attributes == other.attributes
            && (self.id.is_some() || self.instance == other.instance)
    }
}
