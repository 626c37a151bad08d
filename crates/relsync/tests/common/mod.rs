//! Shared fixtures for the integration tests
//!
//! Models: a Vehicle has many Wheels, has one Driver and belongs to many
//! Manufacturers through `manufacturer_vehicle`. Wheels and Drivers belong
//! to their Vehicle through `vehicle_id`.

#![allow(dead_code)]

use std::sync::Arc;

use elif_relsync::{
    Attributes, EntityId, InMemoryRepository, Record, RelationRegistry, RelationTable, Repository,
    SyncedRecord,
};
use serde_json::{json, Value};

pub const MANIFEST: &str = r#"
models:
  Vehicle:
    - name: wheels
      kind: has_many
      related_type: Wheel
      foreign_key: vehicle_id
    - name: manufacturers
      kind: belongs_to_many
      related_type: Manufacturer
      pivot:
        table: manufacturer_vehicle
        local_key: vehicle_id
        foreign_key: manufacturer_id
    - name: driver
      kind: has_one
      related_type: Driver
      foreign_key: vehicle_id
  Wheel:
    - name: car
      kind: belongs_to
      related_type: Vehicle
      foreign_key: vehicle_id
  Driver:
    - name: car
      kind: belongs_to
      related_type: Vehicle
      foreign_key: vehicle_id
  Manufacturer:
    - name: vehicles
      kind: belongs_to_many
      related_type: Vehicle
      pivot:
        table: manufacturer_vehicle
        local_key: manufacturer_id
        foreign_key: vehicle_id
"#;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Fixture {
    pub repo: InMemoryRepository,
    pub registry: RelationRegistry,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        Self {
            repo: InMemoryRepository::new(),
            registry: RelationRegistry::from_yaml_str(MANIFEST).expect("fixture manifest"),
        }
    }

    pub fn table(&self, model: &str) -> Arc<RelationTable> {
        self.registry.table(model).expect("fixture model")
    }

    /// A fresh, unsaved parent of `model`
    pub fn build(&self, model: &str) -> SyncedRecord {
        SyncedRecord::new(self.table(model))
    }

    /// Create a parent from an attribute map, relations included
    pub fn create(&self, model: &str, attributes: Value) -> SyncedRecord {
        SyncedRecord::create(&self.repo, self.table(model), attrs(attributes)).expect("create parent")
    }

    /// Wrap a persisted record for syncing
    pub fn load(&self, record: &Record) -> SyncedRecord {
        SyncedRecord::find(&self.repo, self.table(record.entity_type()), record.id().expect("persisted"))
            .expect("load parent")
    }

    pub fn insert(&self, entity_type: &str, attributes: Value) -> Record {
        self.repo.insert(entity_type, attrs(attributes)).expect("insert")
    }

    /// Vehicle with wheels of the given sizes
    pub fn vehicle_with_wheels(&self, sizes: &[i64]) -> (Record, Vec<Record>) {
        let vehicle = self.insert("Vehicle", json!({ "name": "Car" }));
        let vehicle_id = id_value(&vehicle);
        let wheels = sizes
            .iter()
            .map(|size| self.insert("Wheel", json!({ "size": size, "vehicle_id": vehicle_id })))
            .collect();
        (vehicle, wheels)
    }

    pub fn link(&self, relation_owner: &Record, relation: &str, related: &Record) {
        let table = self.table(relation_owner.entity_type());
        let pivot = table.get(relation).expect("relation").pivot().expect("pivot").clone();
        self.repo
            .attach(&pivot, relation_owner.id().expect("persisted"), related.id().expect("persisted"))
            .expect("attach");
    }

    /// Persisted members of `relation`, reloading the parent first
    pub fn persisted(&self, parent: &SyncedRecord, relation: &str) -> Vec<Record> {
        parent
            .fresh(&self.repo)
            .expect("fresh parent")
            .relation(&self.repo, relation)
            .expect("load relation")
    }

    pub fn exists(&self, record: &Record) -> bool {
        self.repo
            .find(record.entity_type(), record.id().expect("persisted"))
            .expect("find")
            .is_some()
    }
}

pub fn attrs(value: Value) -> Attributes {
    value.as_object().cloned().expect("attribute map")
}

/// Object payload with keys in the given order
pub fn keyed(entries: Vec<(String, Value)>) -> Value {
    Value::Object(entries.into_iter().collect())
}

pub fn id_value(record: &Record) -> Value {
    json!(record.id().expect("persisted").as_i64())
}

pub fn key(record: &Record) -> String {
    record.id().expect("persisted").to_string()
}

pub fn ids(records: &[Record]) -> Vec<EntityId> {
    records.iter().filter_map(Record::id).collect()
}

pub fn values(records: &[Record], attribute: &str) -> Vec<Value> {
    records
        .iter()
        .map(|record| record.get(attribute).cloned().unwrap_or(Value::Null))
        .collect()
}
