//! Change sets - The staged outcome of reconciling one relation

use crate::model::{EntityId, Record};

/// How a related record moves when its relation is committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Newly linked to the parent
    Attached,
    /// Unlinked from the parent (pivot row removed, or record deleted)
    Detached,
    /// Stays linked; saved again with any patched attributes
    Updated,
}

/// A related record together with its commit action
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub kind: ChangeKind,
    pub record: Record,
}

impl Change {
    pub fn new(kind: ChangeKind, record: Record) -> Self {
        Self { kind, record }
    }
}

/// Staged diff between the current and target members of a plural relation.
///
/// Attached and updated records keep the order of the target; detached
/// records follow, in the order they were currently related. Each record
/// carries exactly one kind, so the three groups are disjoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, kind: ChangeKind, record: Record) {
        self.changes.push(Change::new(kind, record));
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Records with the given change kind, in change set order
    pub fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &Record> + '_ {
        self.changes
            .iter()
            .filter(move |change| change.kind == kind)
            .map(|change| &change.record)
    }

    pub(crate) fn of_kind_mut(&mut self, kind: ChangeKind) -> impl Iterator<Item = &mut Record> + '_ {
        self.changes
            .iter_mut()
            .filter(move |change| change.kind == kind)
            .map(|change| &mut change.record)
    }

    pub fn attached(&self) -> Vec<&Record> {
        self.of_kind(ChangeKind::Attached).collect()
    }

    pub fn detached(&self) -> Vec<&Record> {
        self.of_kind(ChangeKind::Detached).collect()
    }

    pub fn updated(&self) -> Vec<&Record> {
        self.of_kind(ChangeKind::Updated).collect()
    }

    /// Records the relation will hold once committed: attached and updated,
    /// in target order
    pub fn visible(&self) -> impl Iterator<Item = &Record> + '_ {
        self.changes
            .iter()
            .filter(|change| change.kind != ChangeKind::Detached)
            .map(|change| &change.record)
    }

    pub(crate) fn visible_mut(&mut self) -> impl Iterator<Item = &mut Record> + '_ {
        self.changes
            .iter_mut()
            .filter(|change| change.kind != ChangeKind::Detached)
            .map(|change| &mut change.record)
    }

    /// Whether committing would add or remove members
    pub fn has_membership_changes(&self) -> bool {
        self.changes.iter().any(|change| change.kind != ChangeKind::Updated)
    }

    /// Identifiers of persisted records with the given kind
    pub fn ids(&self, kind: ChangeKind) -> Vec<EntityId> {
        self.of_kind(kind).filter_map(Record::id).collect()
    }

    /// Number of records per kind as `(attached, detached, updated)`
    pub fn counts(&self) -> (usize, usize, usize) {
        self.changes.iter().fold((0, 0, 0), |(a, d, u), change| match change.kind {
            ChangeKind::Attached => (a + 1, d, u),
            ChangeKind::Detached => (a, d + 1, u),
            ChangeKind::Updated => (a, d, u + 1),
        })
    }
}

/// Staged target of a singular relation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingAssignment {
    /// The record the relation should point at; `None` clears it
    pub entity: Option<Record>,
    /// Remove the current record (dependent kinds) or the link (owner kinds)
    pub delete: bool,
}

impl PendingAssignment {
    pub fn assign(entity: Record) -> Self {
        Self { entity: Some(entity), delete: false }
    }

    pub fn clear() -> Self {
        Self { entity: None, delete: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attributes;

    fn wheel(id: i64) -> Record {
        Record::from_persisted("Wheel", EntityId(id), Attributes::new())
    }

    #[test]
    fn test_change_set_groups() {
        let mut changes = ChangeSet::new();
        changes.push(ChangeKind::Updated, wheel(2));
        changes.push(ChangeKind::Attached, Record::new("Wheel"));
        changes.push(ChangeKind::Attached, wheel(5));
        changes.push(ChangeKind::Detached, wheel(1));

        assert_eq!(changes.counts(), (2, 1, 1));
        assert_eq!(changes.ids(ChangeKind::Attached), vec![EntityId(5)]);
        assert_eq!(changes.ids(ChangeKind::Detached), vec![EntityId(1)]);
        assert_eq!(changes.visible().count(), 3);
        assert_eq!(changes.visible().next().and_then(Record::id), Some(EntityId(2)));
        assert!(changes.has_membership_changes());
    }

    #[test]
    fn test_updates_only_keep_membership() {
        let mut changes = ChangeSet::new();
        changes.push(ChangeKind::Updated, wheel(1));
        changes.push(ChangeKind::Updated, wheel(2));

        assert!(!changes.has_membership_changes());
        assert!(changes.attached().is_empty());
        assert_eq!(changes.updated().len(), 2);
    }

    #[test]
    fn test_pending_assignment_constructors() {
        let cleared = PendingAssignment::clear();
        assert!(cleared.delete);
        assert!(cleared.entity.is_none());

        let assigned = PendingAssignment::assign(wheel(3));
        assert!(!assigned.delete);
        assert_eq!(assigned.entity.and_then(|record| record.id()), Some(EntityId(3)));
    }
}
