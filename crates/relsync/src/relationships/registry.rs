//! Relation Registry - Declared synced relations per model
//!
//! A `RelationTable` is the ordered list of relations one parent model
//! syncs. Declaration order matters: `fill` and the dirtiness checks walk
//! relations in that order. The `RelationRegistry` keeps one table per
//! model and can be populated from a YAML manifest.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;

use crate::error::{SyncError, SyncResult};
use super::metadata::{PivotConfig, RelationDescriptor, RelationKind};

/// Ordered relation descriptors declared for one parent model
#[derive(Debug, Clone, PartialEq)]
pub struct RelationTable {
    model: String,
    relations: Vec<RelationDescriptor>,
}

impl RelationTable {
    /// Create an empty table for the given parent model
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            relations: Vec::new(),
        }
    }

    /// Builder-style `declare`
    pub fn with(mut self, descriptor: RelationDescriptor) -> SyncResult<Self> {
        self.declare(descriptor)?;
        Ok(self)
    }

    /// Declare a relation; names must be unique within the table
    pub fn declare(&mut self, descriptor: RelationDescriptor) -> SyncResult<()> {
        descriptor.validate()?;

        if self.contains(&descriptor.name) {
            return Err(SyncError::Configuration(format!(
                "Relation '{}' is declared twice on model '{}'",
                descriptor.name, self.model
            )));
        }

        self.relations.push(descriptor);
        Ok(())
    }

    /// The parent model these relations belong to
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Look up a relation by name
    pub fn get(&self, name: &str) -> SyncResult<&RelationDescriptor> {
        self.relations
            .iter()
            .find(|relation| relation.name == name)
            .ok_or_else(|| SyncError::UnknownRelation {
                model: self.model.clone(),
                relation: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.relations.iter().any(|relation| relation.name == name)
    }

    /// Iterate relations in declaration order
    pub fn iter(&self) -> std::slice::Iter<'_, RelationDescriptor> {
        self.relations.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.relations.iter().map(|relation| relation.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

impl<'a> IntoIterator for &'a RelationTable {
    type Item = &'a RelationDescriptor;
    type IntoIter = std::slice::Iter<'a, RelationDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.relations.iter()
    }
}

/// Thread-safe registry of relation tables keyed by model name
#[derive(Debug, Clone, Default)]
pub struct RelationRegistry {
    tables: Arc<DashMap<String, Arc<RelationTable>>>,
}

impl RelationRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the table for a model
    pub fn register(&self, table: RelationTable) -> Arc<RelationTable> {
        let table = Arc::new(table);
        self.tables.insert(table.model().to_string(), Arc::clone(&table));
        table
    }

    /// Get the table for a model
    pub fn table(&self, model: &str) -> Option<Arc<RelationTable>> {
        self.tables.get(model).map(|entry| Arc::clone(entry.value()))
    }

    /// Get the table for a model, or an empty one if nothing was declared
    pub fn table_or_empty(&self, model: &str) -> Arc<RelationTable> {
        self.table(model)
            .unwrap_or_else(|| Arc::new(RelationTable::new(model)))
    }

    /// Look up a single relation descriptor
    pub fn relation(&self, model: &str, name: &str) -> SyncResult<RelationDescriptor> {
        let table = self.table(model).ok_or_else(|| SyncError::UnknownRelation {
            model: model.to_string(),
            relation: name.to_string(),
        })?;
        table.get(name).cloned()
    }

    /// Names of all registered models, sorted
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn clear(&self) {
        self.tables.clear();
    }

    /// Build a registry from a YAML manifest:
    ///
    /// ```yaml
    /// models:
    ///   Vehicle:
    ///     - name: wheels
    ///       kind: has_many
    ///       related_type: Wheel
    ///       foreign_key: vehicle_id
    /// ```
    pub fn from_yaml_str(manifest: &str) -> SyncResult<Self> {
        let manifest: RelationManifest = serde_yaml::from_str(manifest)?;
        let registry = Self::new();

        for (model, relations) in manifest.models {
            let mut table = RelationTable::new(&model);
            for relation in relations {
                table.declare(relation.into_descriptor()?)?;
            }
            registry.register(table);
        }

        Ok(registry)
    }
}

#[derive(Debug, Deserialize)]
struct RelationManifest {
    #[serde(default)]
    models: BTreeMap<String, Vec<ManifestRelation>>,
}

#[derive(Debug, Deserialize)]
struct ManifestRelation {
    name: String,
    kind: String,
    related_type: String,
    #[serde(default)]
    foreign_key: String,
    #[serde(default)]
    pivot: Option<PivotConfig>,
}

impl ManifestRelation {
    fn into_descriptor(self) -> SyncResult<RelationDescriptor> {
        let kind: RelationKind = self.kind.parse().map_err(|_| SyncError::UnsupportedRelationKind {
            relation: self.name.clone(),
            kind: self.kind.clone(),
        })?;

        let mut descriptor = RelationDescriptor::new(kind, &self.name, &self.related_type, &self.foreign_key);
        descriptor.pivot = self.pivot;
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle_table() -> RelationTable {
        RelationTable::new("Vehicle")
            .with(RelationDescriptor::has_many("wheels", "Wheel", "vehicle_id")).unwrap()
            .with(RelationDescriptor::has_one("driver", "Driver", "vehicle_id")).unwrap()
    }

    #[test]
    fn test_table_lookup() {
        let table = vehicle_table();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("wheels").unwrap().kind, RelationKind::OneToMany);
        assert_eq!(table.names(), vec!["wheels", "driver"]);

        match table.get("engine") {
            Err(SyncError::UnknownRelation { model, relation }) => {
                assert_eq!(model, "Vehicle");
                assert_eq!(relation, "engine");
            }
            other => panic!("Expected UnknownRelation, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_declaration_rejected() {
        let result = vehicle_table().with(RelationDescriptor::has_many("wheels", "Wheel", "vehicle_id"));
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }

    #[test]
    fn test_registry_register_and_get() {
        let registry = RelationRegistry::new();
        registry.register(vehicle_table());

        assert!(registry.table("Vehicle").is_some());
        assert!(registry.table("Wheel").is_none());
        assert!(registry.table_or_empty("Wheel").is_empty());
        assert_eq!(registry.relation("Vehicle", "driver").unwrap().related_type, "Driver");
        assert!(registry.relation("Wheel", "car").is_err());

        registry.clear();
        assert!(registry.model_names().is_empty());
    }

    #[test]
    fn test_registry_from_yaml() {
        let manifest = r#"
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
  Wheel:
    - name: car
      kind: belongs_to
      related_type: Vehicle
      foreign_key: vehicle_id
"#;
        let registry = RelationRegistry::from_yaml_str(manifest).unwrap();
        assert_eq!(registry.model_names(), vec!["Vehicle", "Wheel"]);

        let vehicle = registry.table("Vehicle").unwrap();
        assert_eq!(vehicle.names(), vec!["wheels", "manufacturers"]);
        assert_eq!(
            vehicle.get("manufacturers").unwrap().pivot().unwrap().table,
            "manufacturer_vehicle"
        );
    }

    #[test]
    fn test_registry_from_yaml_unknown_kind() {
        let manifest = r#"
models:
  Post:
    - name: tags
      kind: has_many_through
      related_type: Tag
"#;
        match RelationRegistry::from_yaml_str(manifest) {
            Err(SyncError::UnsupportedRelationKind { relation, kind }) => {
                assert_eq!(relation, "tags");
                assert_eq!(kind, "has_many_through");
            }
            other => panic!("Expected UnsupportedRelationKind, got {:?}", other),
        }
    }
}
