//! Staging context - Per-parent pending relation state
//!
//! Staged relations are invisible to storage until `commit`. Commit walks
//! relations in declared order and stops at the first failure; relations
//! already applied stay applied, and the failing relation stays staged.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::backends::Repository;
use crate::error::{SyncError, SyncResult};
use crate::model::{EntityId, Record};
use crate::payload::RelationPayload;
use crate::relationships::{RelationDescriptor, RelationKind, RelationTable};
use super::change_set::{ChangeKind, ChangeSet, PendingAssignment};
use super::reconciler::{ensure_supported, Reconciler, StageOptions};

/// Pending relation changes of one parent record
#[derive(Debug, Clone, Default)]
pub struct StagingContext {
    singular: HashMap<String, PendingAssignment>,
    plural: HashMap<String, ChangeSet>,
}

impl StagingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile `payload` against relation `name` and keep the result.
    ///
    /// A relation staged twice keeps only the latest result.
    pub fn stage<R: Repository + ?Sized>(
        &mut self,
        reconciler: &Reconciler<'_, R>,
        relations: &RelationTable,
        parent: &Record,
        name: &str,
        payload: RelationPayload,
        options: StageOptions,
    ) -> SyncResult<()> {
        let relation = relations.get(name)?;
        ensure_supported(relation)?;

        match payload {
            RelationPayload::Plural(payload) => {
                let changes = reconciler.reconcile_plural(relation, parent, payload, options)?;
                if self.plural.insert(name.to_string(), changes).is_some() {
                    debug!("Replaced staged changes for '{}'", name);
                }
            }
            RelationPayload::Singular(entity) => {
                let pending = reconciler.reconcile_singular(relation, parent, entity, options)?;
                if self.singular.insert(name.to_string(), pending).is_some() {
                    debug!("Replaced staged assignment for '{}'", name);
                }
            }
        }
        Ok(())
    }

    pub fn pending_assignment(&self, name: &str) -> Option<&PendingAssignment> {
        self.singular.get(name)
    }

    pub fn change_set(&self, name: &str) -> Option<&ChangeSet> {
        self.plural.get(name)
    }

    pub fn is_staged(&self, name: &str) -> bool {
        self.singular.contains_key(name) || self.plural.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.singular.is_empty() && self.plural.is_empty()
    }

    /// Names of staged relations, sorted
    pub fn staged_relations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .singular
            .keys()
            .chain(self.plural.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }

    /// Drop the staged state of one relation
    pub fn discard(&mut self, name: &str) -> bool {
        self.singular.remove(name).is_some() | self.plural.remove(name).is_some()
    }

    pub fn clear(&mut self) {
        self.singular.clear();
        self.plural.clear();
    }

    /// Staged view of relation `name`, if it is staged
    pub fn visible(&self, name: &str) -> Option<Vec<&Record>> {
        if let Some(pending) = self.singular.get(name) {
            return Some(pending.entity.iter().collect());
        }
        self.plural.get(name).map(|changes| changes.visible().collect())
    }

    /// Members of `relation`: the staged view first, persisted state otherwise
    pub fn related<R: Repository + ?Sized>(
        &self,
        repo: &R,
        relation: &RelationDescriptor,
        parent: &Record,
    ) -> SyncResult<Vec<Record>> {
        match self.visible(&relation.name) {
            Some(records) => Ok(records.into_iter().cloned().collect()),
            None => repo.load_related(relation, parent),
        }
    }

    /// Apply every staged relation, in declared order.
    ///
    /// Returns the number of relations applied. Each relation is removed
    /// from the context once applied.
    pub fn commit<R: Repository + ?Sized>(
        &mut self,
        repo: &R,
        relations: &RelationTable,
        parent: &mut Record,
    ) -> SyncResult<usize> {
        let mut committed = 0;

        for relation in relations.iter() {
            if let Some(pending) = self.singular.get_mut(&relation.name) {
                apply_singular(repo, relation, parent, pending).map_err(|err| {
                    warn!("Commit of '{}' failed: {}", relation.name, err);
                    err
                })?;
                self.singular.remove(&relation.name);
                committed += 1;
            } else if let Some(changes) = self.plural.get_mut(&relation.name) {
                apply_plural(repo, relation, parent, changes).map_err(|err| {
                    warn!("Commit of '{}' failed: {}", relation.name, err);
                    err
                })?;
                self.plural.remove(&relation.name);
                committed += 1;
            }
        }

        if committed > 0 {
            debug!("Committed {} relations of {}", committed, relations.model());
        }
        Ok(committed)
    }

    /// Whether committing relation `name` would change anything
    pub fn is_relation_dirty<R: Repository + ?Sized>(
        &self,
        repo: &R,
        relations: &RelationTable,
        parent: &Record,
        name: &str,
    ) -> SyncResult<bool> {
        let relation = relations.get(name)?;
        ensure_supported(relation)?;

        if relation.is_plural() {
            return Ok(self.plural.get(name).is_some_and(|changes| {
                changes.has_membership_changes() || changes.visible().any(Record::is_dirty)
            }));
        }

        let Some(pending) = self.singular.get(name) else {
            return Ok(false);
        };
        let before = repo.load_related(relation, parent)?.into_iter().next();
        Ok(match (&pending.entity, before) {
            (None, before) => before.is_some(),
            (Some(_), None) => true,
            (Some(entity), Some(before)) => entity.is_dirty() || !entity.is_same_entity(&before),
        })
    }

    /// Whether any staged relation is dirty; checks run in declared order and
    /// stop at the first dirty relation
    pub fn are_relations_dirty<R: Repository + ?Sized>(
        &self,
        repo: &R,
        relations: &RelationTable,
        parent: &Record,
    ) -> SyncResult<bool> {
        for relation in relations.iter() {
            if self.is_staged(&relation.name)
                && self.is_relation_dirty(repo, relations, parent, &relation.name)?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Snapshot the change state of every staged record
    pub fn sync_relation_changes(&mut self) {
        for pending in self.singular.values_mut() {
            if let Some(entity) = pending.entity.as_mut() {
                entity.sync_changes();
            }
        }
        for changes in self.plural.values_mut() {
            for record in changes.visible_mut() {
                record.sync_changes();
            }
        }
    }
}

fn apply_singular<R: Repository + ?Sized>(
    repo: &R,
    relation: &RelationDescriptor,
    parent: &mut Record,
    pending: &mut PendingAssignment,
) -> SyncResult<()> {
    let delete = pending.delete;

    match relation.kind {
        RelationKind::ManyToOne => {
            let target = match pending.entity.as_mut() {
                Some(entity) if !delete => {
                    save_if_needed(repo, entity)?;
                    Some(require_id(entity)?)
                }
                _ => None,
            };
            debug!("Associating '{}' -> {:?}", relation.name, target);
            parent.set_foreign_key(&relation.foreign_key, target);
            save_if_needed(repo, parent)
        }
        RelationKind::OneToOne => {
            let parent_id = require_id(parent)?;
            let current = repo.load_related(relation, parent)?.into_iter().next();

            match pending.entity.as_mut() {
                Some(entity) if !delete => {
                    if let Some(mut previous) = current.filter(|record| !record.is_same_entity(&*entity)) {
                        debug!("Unlinking previous '{}' record", relation.name);
                        previous.set_foreign_key(&relation.foreign_key, None);
                        repo.save(&mut previous)?;
                    }
                    entity.set_foreign_key(&relation.foreign_key, Some(parent_id));
                    save_if_needed(repo, entity)
                }
                _ => match current {
                    Some(current) => {
                        debug!("Deleting '{}' record", relation.name);
                        repo.delete(&current)
                    }
                    None => Ok(()),
                },
            }
        }
        kind => Err(SyncError::unsupported_kind(&relation.name, kind)),
    }
}

fn apply_plural<R: Repository + ?Sized>(
    repo: &R,
    relation: &RelationDescriptor,
    parent: &Record,
    changes: &mut ChangeSet,
) -> SyncResult<()> {
    let parent_id = require_id(parent)?;

    match relation.kind {
        RelationKind::OneToMany => {
            for record in changes.of_kind_mut(ChangeKind::Detached) {
                if record.exists() {
                    repo.delete(record)?;
                }
            }
            for record in changes.of_kind_mut(ChangeKind::Attached) {
                record.set_foreign_key(&relation.foreign_key, Some(parent_id));
                save_if_needed(repo, record)?;
            }
        }
        RelationKind::ManyToMany => {
            let pivot = relation.pivot()?;
            for record in changes.of_kind_mut(ChangeKind::Detached) {
                if let Some(id) = record.id() {
                    repo.detach(pivot, parent_id, id)?;
                }
            }
            for record in changes.of_kind_mut(ChangeKind::Attached) {
                save_if_needed(repo, record)?;
                repo.attach(pivot, parent_id, require_id(record)?)?;
            }
        }
        kind => return Err(SyncError::unsupported_kind(&relation.name, kind)),
    }

    for record in changes.of_kind_mut(ChangeKind::Updated) {
        save_if_needed(repo, record)?;
    }

    let (attached, detached, updated) = changes.counts();
    debug!(
        "Applied '{}': {} attached, {} detached, {} updated",
        relation.name, attached, detached, updated
    );
    Ok(())
}

/// Save new or modified records; clean persisted ones are left alone
fn save_if_needed<R: Repository + ?Sized>(repo: &R, record: &mut Record) -> SyncResult<()> {
    if !record.exists() || record.is_dirty() {
        repo.save(record)?;
    }
    Ok(())
}

fn require_id(record: &Record) -> SyncResult<EntityId> {
    record.id().ok_or_else(|| SyncError::MissingPrimaryKey {
        entity_type: record.entity_type().to_string(),
    })
}
