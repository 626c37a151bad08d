//! Error types for relation synchronization
//!
//! Covers relation lookup, payload classification, and failures surfaced by
//! the underlying repository.

use thiserror::Error;

use crate::relationships::RelationKind;

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Error types for staging and committing relation changes
#[derive(Debug, Error)]
pub enum SyncError {
    /// The relation is not declared on the parent model
    #[error("Relation '{relation}' is not declared on model '{model}'")]
    UnknownRelation { model: String, relation: String },

    /// The relation kind cannot be reconciled (or could not be parsed)
    #[error("Relation '{relation}' has unsupported kind '{kind}'")]
    UnsupportedRelationKind { relation: String, kind: String },

    /// A plural payload mixes identifiers, handles and attribute maps
    #[error("Ambiguous payload shape for relation '{relation}': {detail}")]
    AmbiguousPayloadShape { relation: String, detail: String },

    /// The payload has a recognizable shape but cannot be used as given
    #[error("Invalid payload for relation '{relation}': {detail}")]
    InvalidPayload { relation: String, detail: String },

    /// Record not found in the repository
    #[error("Record {id} not found in '{entity_type}'")]
    NotFound { entity_type: String, id: String },

    /// The operation needs a persisted record
    #[error("Primary key is missing on '{entity_type}' record")]
    MissingPrimaryKey { entity_type: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Failure reported by a repository backend
    #[error("Repository error: {0}")]
    Repository(String),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    pub(crate) fn unsupported_kind(relation: &str, kind: RelationKind) -> Self {
        SyncError::UnsupportedRelationKind {
            relation: relation.to_string(),
            kind: kind.to_string(),
        }
    }

    pub(crate) fn ambiguous(relation: &str, detail: impl Into<String>) -> Self {
        SyncError::AmbiguousPayloadShape {
            relation: relation.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn invalid_payload(relation: &str, detail: impl Into<String>) -> Self {
        SyncError::InvalidPayload {
            relation: relation.to_string(),
            detail: detail.into(),
        }
    }

    /// Returns true if this error was raised while classifying a payload
    pub fn is_payload_error(&self) -> bool {
        matches!(
            self,
            SyncError::AmbiguousPayloadShape { .. } | SyncError::InvalidPayload { .. }
        )
    }
}
