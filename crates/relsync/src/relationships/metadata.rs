//! Relation Metadata - Static descriptors for the relations a model syncs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Defines the kind of relation between a parent model and its related type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Owns a single dependent; the dependent holds the foreign key (hasOne)
    OneToOne,
    /// References a single independent record; the parent holds the foreign key (belongsTo)
    ManyToOne,
    /// Owns a set of dependents, each holding a foreign key back to the parent (hasMany)
    OneToMany,
    /// Owns a set of independents through a pivot table (belongsToMany)
    ManyToMany,
    /// Polymorphic one-to-one relation
    MorphOne,
    /// Polymorphic one-to-many relation
    MorphMany,
    /// Inverse polymorphic relation
    MorphTo,
}

impl RelationKind {
    /// Returns true if this relation holds a collection of records
    pub fn is_plural(self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany | Self::MorphMany)
    }

    /// Returns true if this relation holds at most one record
    pub fn is_singular(self) -> bool {
        !self.is_plural()
    }

    /// Returns true if this relation type is polymorphic
    pub fn is_polymorphic(self) -> bool {
        matches!(self, Self::MorphOne | Self::MorphMany | Self::MorphTo)
    }

    /// Returns true if this relation requires a pivot table
    pub fn requires_pivot(self) -> bool {
        matches!(self, Self::ManyToMany)
    }

    /// Returns true if the reconciler knows how to sync this kind
    pub fn is_supported(self) -> bool {
        !self.is_polymorphic()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneToOne => "one_to_one",
            Self::ManyToOne => "many_to_one",
            Self::OneToMany => "one_to_many",
            Self::ManyToMany => "many_to_many",
            Self::MorphOne => "morph_one",
            Self::MorphMany => "morph_many",
            Self::MorphTo => "morph_to",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "onetoone" | "hasone" => Ok(Self::OneToOne),
            "manytoone" | "belongsto" => Ok(Self::ManyToOne),
            "onetomany" | "hasmany" => Ok(Self::OneToMany),
            "manytomany" | "belongstomany" => Ok(Self::ManyToMany),
            "morphone" => Ok(Self::MorphOne),
            "morphmany" => Ok(Self::MorphMany),
            "morphto" => Ok(Self::MorphTo),
            _ => Err(SyncError::UnsupportedRelationKind {
                relation: String::new(),
                kind: s.to_string(),
            }),
        }
    }
}

/// Pivot table configuration for many-to-many relations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotConfig {
    /// The pivot table name
    pub table: String,

    /// Column in the pivot table referencing the parent
    pub local_key: String,

    /// Column in the pivot table referencing the related record
    pub foreign_key: String,
}

impl PivotConfig {
    /// Create a new pivot configuration
    pub fn new(table: &str, local_key: &str, foreign_key: &str) -> Self {
        Self {
            table: table.to_string(),
            local_key: local_key.to_string(),
            foreign_key: foreign_key.to_string(),
        }
    }

    /// Validate the pivot configuration
    pub fn validate(&self) -> SyncResult<()> {
        if self.table.is_empty() {
            return Err(SyncError::Configuration(
                "Pivot table name cannot be empty".to_string(),
            ));
        }

        if self.local_key.is_empty() || self.foreign_key.is_empty() {
            return Err(SyncError::Configuration(format!(
                "Pivot table '{}' needs both a local and a foreign key",
                self.table
            )));
        }

        if self.local_key == self.foreign_key {
            return Err(SyncError::Configuration(format!(
                "Pivot table '{}': local key and foreign key must be different",
                self.table
            )));
        }

        Ok(())
    }
}

/// Static description of one synced relation on a parent model.
///
/// `foreign_key` names the column on the related model for `OneToOne` and
/// `OneToMany`, and the column on the parent for `ManyToOne`. Many-to-many
/// relations use `pivot` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    /// Relation name, also the payload key used by `fill`
    pub name: String,

    /// The kind of relation
    pub kind: RelationKind,

    /// Entity type of the related records
    pub related_type: String,

    /// Foreign key column (see type-level docs for which side holds it)
    #[serde(default)]
    pub foreign_key: String,

    /// Pivot table configuration for many-to-many relations
    #[serde(default)]
    pub pivot: Option<PivotConfig>,
}

impl RelationDescriptor {
    /// Create a new descriptor
    pub fn new(kind: RelationKind, name: &str, related_type: &str, foreign_key: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            related_type: related_type.to_string(),
            foreign_key: foreign_key.to_string(),
            pivot: None,
        }
    }

    /// A dependent record holding `foreign_key` back to the parent
    pub fn has_one(name: &str, related_type: &str, foreign_key: &str) -> Self {
        Self::new(RelationKind::OneToOne, name, related_type, foreign_key)
    }

    /// An independent record referenced by the parent's `foreign_key`
    pub fn belongs_to(name: &str, related_type: &str, foreign_key: &str) -> Self {
        Self::new(RelationKind::ManyToOne, name, related_type, foreign_key)
    }

    /// Dependent records each holding `foreign_key` back to the parent
    pub fn has_many(name: &str, related_type: &str, foreign_key: &str) -> Self {
        Self::new(RelationKind::OneToMany, name, related_type, foreign_key)
    }

    /// Independent records linked through a pivot table
    pub fn belongs_to_many(name: &str, related_type: &str, pivot: PivotConfig) -> Self {
        Self::new(RelationKind::ManyToMany, name, related_type, "").with_pivot(pivot)
    }

    /// Set pivot table configuration
    pub fn with_pivot(mut self, pivot: PivotConfig) -> Self {
        self.pivot = Some(pivot);
        self
    }

    pub fn is_plural(&self) -> bool {
        self.kind.is_plural()
    }

    /// The pivot configuration, required for many-to-many relations
    pub fn pivot(&self) -> SyncResult<&PivotConfig> {
        self.pivot.as_ref().ok_or_else(|| {
            SyncError::Configuration(format!(
                "Relation '{}' of kind {} requires pivot configuration",
                self.name, self.kind
            ))
        })
    }

    /// Validate the descriptor for consistency
    pub fn validate(&self) -> SyncResult<()> {
        if self.name.is_empty() {
            return Err(SyncError::Configuration(
                "Relation name cannot be empty".to_string(),
            ));
        }

        if self.related_type.is_empty() {
            return Err(SyncError::Configuration(format!(
                "Relation '{}' must name its related type",
                self.name
            )));
        }

        match self.kind {
            RelationKind::ManyToMany => self.pivot()?.validate()?,
            RelationKind::OneToOne | RelationKind::ManyToOne | RelationKind::OneToMany => {
                if self.foreign_key.is_empty() {
                    return Err(SyncError::Configuration(format!(
                        "Relation '{}' of kind {} requires a foreign key",
                        self.name, self.kind
                    )));
                }
            }
            // Polymorphic kinds are described but never reconciled
            RelationKind::MorphOne | RelationKind::MorphMany | RelationKind::MorphTo => {}
        }

        Ok(())
    }
}
