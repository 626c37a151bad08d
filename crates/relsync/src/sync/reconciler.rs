//! Reconciler - Turns a relation payload into staged changes
//!
//! Reconciliation only reads from the repository. Records it builds or
//! patches stay in memory until the staging context commits them.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::backends::Repository;
use crate::config::{IdOrder, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::model::{Attributes, EntityId, Record};
use crate::payload::{EntityRef, PluralPayload};
use crate::relationships::RelationDescriptor;
use super::change_set::{ChangeKind, ChangeSet, PendingAssignment};

/// Flags accompanying a staged payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageOptions {
    /// Clear a singular relation, or remove the listed members of a plural one
    pub delete: bool,
    /// Build new records from inline attributes instead of patching
    pub force_new: bool,
}

impl StageOptions {
    pub fn delete() -> Self {
        Self { delete: true, force_new: false }
    }

    pub fn force_new() -> Self {
        Self { delete: false, force_new: true }
    }
}

/// Computes pending state for one relation of one parent
pub struct Reconciler<'a, R: Repository + ?Sized> {
    repo: &'a R,
    config: &'a SyncConfig,
}

impl<'a, R: Repository + ?Sized> Reconciler<'a, R> {
    pub fn new(repo: &'a R, config: &'a SyncConfig) -> Self {
        Self { repo, config }
    }

    pub fn repository(&self) -> &'a R {
        self.repo
    }

    pub fn config(&self) -> &'a SyncConfig {
        self.config
    }

    /// Resolve the target record of a singular relation.
    ///
    /// The current record is fetched only when inline attributes have to be
    /// patched onto it.
    pub fn reconcile_singular(
        &self,
        relation: &RelationDescriptor,
        parent: &Record,
        payload: Option<EntityRef>,
        options: StageOptions,
    ) -> SyncResult<PendingAssignment> {
        ensure_supported(relation)?;
        if relation.is_plural() {
            return Err(SyncError::invalid_payload(
                &relation.name,
                "plural relation given a single-entity payload",
            ));
        }

        if options.delete {
            debug!("Clearing singular relation '{}'", relation.name);
            return Ok(PendingAssignment::clear());
        }

        let entity = match payload {
            None => return Ok(PendingAssignment::clear()),
            Some(EntityRef::Attributes(attributes)) if options.force_new => self.build(relation, &attributes),
            Some(_) if options.force_new => {
                return Err(SyncError::invalid_payload(
                    &relation.name,
                    "a new record needs inline attributes",
                ))
            }
            Some(EntityRef::Id(id)) => self.repo.find_or_fail(&relation.related_type, id)?,
            Some(EntityRef::Entity(record)) => {
                check_type(relation, &record)?;
                record
            }
            Some(EntityRef::Attributes(attributes)) => {
                match self.repo.load_related(relation, parent)?.into_iter().next() {
                    Some(mut current) => {
                        self.patch(&mut current, &attributes);
                        current
                    }
                    None => {
                        debug!("No current '{}' to patch, building a new record", relation.name);
                        self.build(relation, &attributes)
                    }
                }
            }
        };

        Ok(PendingAssignment::assign(entity))
    }

    /// Diff the persisted members of a plural relation against the payload
    pub fn reconcile_plural(
        &self,
        relation: &RelationDescriptor,
        parent: &Record,
        payload: PluralPayload,
        options: StageOptions,
    ) -> SyncResult<ChangeSet> {
        ensure_supported(relation)?;
        if !relation.is_plural() {
            return Err(SyncError::invalid_payload(
                &relation.name,
                "singular relation given a collection payload",
            ));
        }

        let current = self.repo.load_related(relation, parent)?;
        if options.delete {
            return self.removal(relation, current, payload);
        }

        let target = self.resolve_target(relation, &current, payload, options.force_new)?;
        let changes = diff(current, target);

        let (attached, detached, updated) = changes.counts();
        debug!(
            "Reconciled '{}': {} attached, {} detached, {} updated",
            relation.name, attached, detached, updated
        );
        Ok(changes)
    }

    /// Records the relation should hold, in target order
    fn resolve_target(
        &self,
        relation: &RelationDescriptor,
        current: &[Record],
        payload: PluralPayload,
        force_new: bool,
    ) -> SyncResult<Vec<Record>> {
        match payload {
            PluralPayload::Ids(ids) => self.resolve_ids(relation, ids),
            PluralPayload::Entities(records) => {
                let mut target: Vec<Record> = Vec::with_capacity(records.len());
                for record in records {
                    check_type(relation, &record)?;
                    if target.iter().any(|kept| kept.is_same_entity(&record)) {
                        warn!("Duplicate record in '{}' payload ignored", relation.name);
                        continue;
                    }
                    target.push(record);
                }
                Ok(target)
            }
            PluralPayload::Keyed(entries) => {
                let mut target: Vec<Record> = Vec::with_capacity(entries.len());
                let mut seen = HashSet::new();
                for (key, attributes) in entries {
                    let record = match key.id() {
                        Some(id) if !force_new => {
                            if !seen.insert(id) {
                                warn!("Duplicate key {} in '{}' payload ignored", id, relation.name);
                                continue;
                            }
                            match self.existing(relation, current, id)? {
                                Some(mut record) => {
                                    self.patch(&mut record, &attributes);
                                    record
                                }
                                None => self.build(relation, &attributes),
                            }
                        }
                        _ => self.build(relation, &attributes),
                    };
                    target.push(record);
                }
                Ok(target)
            }
        }
    }

    fn resolve_ids(&self, relation: &RelationDescriptor, ids: Vec<EntityId>) -> SyncResult<Vec<Record>> {
        let mut seen = HashSet::new();
        let ids: Vec<EntityId> = ids.into_iter().filter(|id| seen.insert(*id)).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut records = self.repo.find_many(&relation.related_type, &ids)?;
        if records.len() < ids.len() {
            warn!(
                "'{}' payload names {} identifiers but only {} exist",
                relation.name,
                ids.len(),
                records.len()
            );
        }

        if self.config.id_order == IdOrder::Input {
            let positions: HashMap<EntityId, usize> =
                ids.iter().enumerate().map(|(index, id)| (*id, index)).collect();
            records.sort_by_key(|record| {
                record
                    .id()
                    .and_then(|id| positions.get(&id).copied())
                    .unwrap_or(usize::MAX)
            });
        }
        Ok(records)
    }

    /// Removal mode: listed members are detached, the rest stay
    fn removal(
        &self,
        relation: &RelationDescriptor,
        current: Vec<Record>,
        payload: PluralPayload,
    ) -> SyncResult<ChangeSet> {
        let removed: HashSet<EntityId> = match payload {
            PluralPayload::Ids(ids) => ids.into_iter().collect(),
            PluralPayload::Entities(records) => records.iter().filter_map(Record::id).collect(),
            PluralPayload::Keyed(_) => {
                return Err(SyncError::invalid_payload(
                    &relation.name,
                    "removal takes identifiers or records, not keyed attributes",
                ))
            }
        };

        let mut changes = ChangeSet::new();
        let mut detached = Vec::new();
        for record in current {
            if record.id().is_some_and(|id| removed.contains(&id)) {
                detached.push(record);
            } else {
                changes.push(ChangeKind::Updated, record);
            }
        }

        if detached.len() < removed.len() {
            warn!(
                "{} identifiers listed for removal from '{}' are not related",
                removed.len() - detached.len(),
                relation.name
            );
        }

        debug!("Removing {} records from '{}'", detached.len(), relation.name);
        for record in detached {
            changes.push(ChangeKind::Detached, record);
        }
        Ok(changes)
    }

    /// A currently related record, or any stored record with that id
    fn existing(&self, relation: &RelationDescriptor, current: &[Record], id: EntityId) -> SyncResult<Option<Record>> {
        if let Some(record) = current.iter().find(|record| record.id() == Some(id)) {
            return Ok(Some(record.clone()));
        }
        self.repo.find(&relation.related_type, id)
    }

    fn patch(&self, record: &mut Record, attributes: &Attributes) {
        for (key, value) in attributes {
            if *key != self.config.primary_key {
                record.set(key, value.clone());
            }
        }
    }

    fn build(&self, relation: &RelationDescriptor, attributes: &Attributes) -> Record {
        let attributes: Attributes = attributes
            .iter()
            .filter(|(key, _)| **key != self.config.primary_key)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        self.repo.create(&relation.related_type, attributes)
    }
}

/// Partition current and target members into a change set.
///
/// Records are matched by identifier. A target record without one is always
/// attached; a current record missing from the target is detached.
pub fn diff(current: Vec<Record>, target: Vec<Record>) -> ChangeSet {
    let current_ids: HashSet<EntityId> = current.iter().filter_map(Record::id).collect();
    let target_ids: HashSet<EntityId> = target.iter().filter_map(Record::id).collect();

    let mut changes = ChangeSet::new();
    for record in target {
        let kind = if record.id().is_some_and(|id| current_ids.contains(&id)) {
            ChangeKind::Updated
        } else {
            ChangeKind::Attached
        };
        changes.push(kind, record);
    }

    for record in current {
        if !record.id().is_some_and(|id| target_ids.contains(&id)) {
            changes.push(ChangeKind::Detached, record);
        }
    }
    changes
}

pub(crate) fn ensure_supported(relation: &RelationDescriptor) -> SyncResult<()> {
    if relation.kind.is_supported() {
        Ok(())
    } else {
        Err(SyncError::unsupported_kind(&relation.name, relation.kind))
    }
}

fn check_type(relation: &RelationDescriptor, record: &Record) -> SyncResult<()> {
    if record.entity_type() == relation.related_type {
        Ok(())
    } else {
        Err(SyncError::invalid_payload(
            &relation.name,
            format!(
                "expected a '{}' record, got '{}'",
                relation.related_type,
                record.entity_type()
            ),
        ))
    }
}
