//! Relation synchronization
//!
//! A [`Reconciler`] diffs a payload against a relation's persisted state,
//! a [`StagingContext`] holds the results per parent until commit, and
//! [`SyncedRecord`] ties both to a parent record and its relation table.

pub mod change_set;
pub mod reconciler;
pub mod staging;
pub mod synced;

pub use change_set::{Change, ChangeKind, ChangeSet, PendingAssignment};
pub use reconciler::{diff, Reconciler, StageOptions};
pub use staging::StagingContext;
pub use synced::SyncedRecord;
