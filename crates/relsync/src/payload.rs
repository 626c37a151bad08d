//! Relation payloads - What a caller asks a relation to become
//!
//! Payload shapes are closed variants resolved once, when the payload enters
//! the sync layer. Loose input (JSON or a list of `EntityRef`) is classified
//! by `from_json` / `from_refs`; inconsistent input is rejected with
//! `SyncError::AmbiguousPayloadShape` instead of being guessed at.

use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::model::{Attributes, EntityId, Record};
use crate::relationships::RelationDescriptor;

/// Reference to a single related entity
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRef {
    /// An existing persisted record, looked up through the repository
    Id(EntityId),
    /// Inline attributes, used to patch the current record or build a new one
    Attributes(Attributes),
    /// An already constructed record, persisted or not
    Entity(Record),
}

impl From<EntityId> for EntityRef {
    fn from(id: EntityId) -> Self {
        EntityRef::Id(id)
    }
}

impl From<Record> for EntityRef {
    fn from(record: Record) -> Self {
        EntityRef::Entity(record)
    }
}

impl From<Attributes> for EntityRef {
    fn from(attributes: Attributes) -> Self {
        EntityRef::Attributes(attributes)
    }
}

/// Key of an entry in a keyed plural payload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryKey {
    /// Identifier-shaped key; patches that record if it exists
    Id(EntityId),
    /// Opaque token; always builds a new record
    New(String),
}

impl EntryKey {
    /// Integer-looking keys are identifiers, anything else is a new-entity token
    pub fn parse(key: &str) -> Self {
        match EntityId::parse_key(key) {
            Some(id) => EntryKey::Id(id),
            None => EntryKey::New(key.to_string()),
        }
    }

    pub fn id(&self) -> Option<EntityId> {
        match self {
            EntryKey::Id(id) => Some(*id),
            EntryKey::New(_) => None,
        }
    }
}

/// Which closed shape a plural payload has
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Ids,
    Entities,
    Keyed,
}

/// Target state for a plural relation
#[derive(Debug, Clone, PartialEq)]
pub enum PluralPayload {
    /// Exactly these existing records
    Ids(Vec<EntityId>),
    /// Exactly these records, as given
    Entities(Vec<Record>),
    /// Records patched or built from inline attributes, in payload order
    Keyed(Vec<(EntryKey, Attributes)>),
}

impl PluralPayload {
    pub fn shape(&self) -> PayloadShape {
        match self {
            PluralPayload::Ids(_) => PayloadShape::Ids,
            PluralPayload::Entities(_) => PayloadShape::Entities,
            PluralPayload::Keyed(_) => PayloadShape::Keyed,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PluralPayload::Ids(ids) => ids.len(),
            PluralPayload::Entities(records) => records.len(),
            PluralPayload::Keyed(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Classify a homogeneous list of references.
    ///
    /// Inline attributes carry no key in a list, so they are only accepted
    /// through the keyed form.
    pub fn from_refs(relation: &str, refs: Vec<EntityRef>) -> SyncResult<Self> {
        let shape = match refs.first() {
            None => return Ok(PluralPayload::Ids(Vec::new())),
            Some(EntityRef::Id(_)) => PayloadShape::Ids,
            Some(EntityRef::Entity(_)) => PayloadShape::Entities,
            Some(EntityRef::Attributes(_)) => PayloadShape::Keyed,
        };

        match shape {
            PayloadShape::Ids => refs
                .into_iter()
                .map(|item| match item {
                    EntityRef::Id(id) => Ok(id),
                    _ => Err(SyncError::ambiguous(relation, "identifier list mixed with other references")),
                })
                .collect::<SyncResult<Vec<_>>>()
                .map(PluralPayload::Ids),
            PayloadShape::Entities => refs
                .into_iter()
                .map(|item| match item {
                    EntityRef::Entity(record) => Ok(record),
                    _ => Err(SyncError::ambiguous(relation, "record list mixed with other references")),
                })
                .collect::<SyncResult<Vec<_>>>()
                .map(PluralPayload::Entities),
            PayloadShape::Keyed => Err(SyncError::ambiguous(
                relation,
                "attribute maps need a key (record id or new-entity token)",
            )),
        }
    }

    /// Classify a JSON payload: an array of identifiers, or an object mapping
    /// keys to attribute objects.
    pub fn from_json(relation: &str, value: &Value) -> SyncResult<Self> {
        match value {
            Value::Array(items) => {
                let ids: Option<Vec<EntityId>> = items.iter().map(EntityId::from_json).collect();
                match ids {
                    Some(ids) => Ok(PluralPayload::Ids(ids)),
                    None if items.iter().all(Value::is_object) => Err(SyncError::ambiguous(
                        relation,
                        "attribute maps need a key (record id or new-entity token)",
                    )),
                    None => Err(SyncError::ambiguous(
                        relation,
                        "list mixes identifiers with other values",
                    )),
                }
            }
            Value::Object(entries) => entries
                .iter()
                .map(|(key, item)| match item {
                    Value::Object(attributes) => Ok((EntryKey::parse(key), attributes.clone())),
                    _ => Err(SyncError::ambiguous(
                        relation,
                        format!("entry '{}' is not an attribute map", key),
                    )),
                })
                .collect::<SyncResult<Vec<_>>>()
                .map(PluralPayload::Keyed),
            other => Err(SyncError::invalid_payload(
                relation,
                format!("expected a list or a map, got {}", json_kind(other)),
            )),
        }
    }
}

/// Payload passed to `stage`, matching the relation's arity
#[derive(Debug, Clone, PartialEq)]
pub enum RelationPayload {
    /// `None` clears the relation
    Singular(Option<EntityRef>),
    Plural(PluralPayload),
}

impl RelationPayload {
    /// Classify a JSON value for the given relation.
    ///
    /// A boolean is accepted for singular relations as a bare deletion
    /// marker and carries no entity.
    pub fn from_json(relation: &RelationDescriptor, value: &Value) -> SyncResult<Self> {
        if relation.is_plural() {
            return PluralPayload::from_json(&relation.name, value).map(RelationPayload::Plural);
        }

        let entity = match value {
            // `{"driver": false}` clears the relation just like `true` or null
            Value::Null | Value::Bool(_) => None,
            Value::Object(attributes) => Some(EntityRef::Attributes(attributes.clone())),
            other => match EntityId::from_json(other) {
                Some(id) => Some(EntityRef::Id(id)),
                None => {
                    return Err(SyncError::invalid_payload(
                        &relation.name,
                        format!("expected an identifier or attribute map, got {}", json_kind(other)),
                    ))
                }
            },
        };
        Ok(RelationPayload::Singular(entity))
    }
}

impl From<PluralPayload> for RelationPayload {
    fn from(payload: PluralPayload) -> Self {
        RelationPayload::Plural(payload)
    }
}

impl From<EntityRef> for RelationPayload {
    fn from(entity: EntityRef) -> Self {
        RelationPayload::Singular(Some(entity))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}
