//! # elif-relsync: Nested relation sync for elif.rs
//!
//! Stages nested relation payloads against a parent record and applies them
//! when the parent is saved. Payloads name related records by identifier,
//! by handle, or by inline attribute maps; reconciliation turns them into
//! attached, detached and updated sets without touching storage, and commit
//! writes those sets through a [`Repository`] in a fixed order.
//!
//! Supported relation kinds are one-to-one, many-to-one, one-to-many and
//! many-to-many. Polymorphic kinds are declared but rejected at staging.

pub mod backends;
pub mod config;
pub mod error;
pub mod model;
pub mod payload;
pub mod relationships;
pub mod sync;

pub use backends::{InMemoryRepository, Repository};
pub use config::{IdOrder, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use model::{Attributes, EntityId, Record};
pub use payload::{EntityRef, EntryKey, PayloadShape, PluralPayload, RelationPayload};
pub use relationships::{PivotConfig, RelationDescriptor, RelationKind, RelationRegistry, RelationTable};
pub use sync::{
    Change, ChangeKind, ChangeSet, PendingAssignment, Reconciler, StageOptions, StagingContext, SyncedRecord,
};
