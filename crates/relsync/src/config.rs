//! Sync configuration
//!
//! Naming conventions of the fill surface and ordering policy for
//! identifier-list payloads.

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Ordering of records resolved from an identifier-list payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdOrder {
    /// Reorder fetched records to match the order of the given identifiers
    #[default]
    Input,
    /// Keep whatever order the repository's batch fetch returned
    Repository,
}

/// Configuration for staging and committing relation payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Attribute name of record identifiers
    pub primary_key: String,
    /// Fill key prefix whose value always builds a new related record
    pub new_prefix: String,
    /// Fill key prefix carrying the deletion signal
    pub delete_prefix: String,
    /// Ordering of identifier-list targets
    pub id_order: IdOrder,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            primary_key: "id".to_string(),
            new_prefix: "new_".to_string(),
            delete_prefix: "delete_".to_string(),
            id_order: IdOrder::Input,
        }
    }
}

impl SyncConfig {
    /// Load configuration from YAML; missing keys take their defaults
    pub fn from_yaml_str(yaml: &str) -> SyncResult<Self> {
        let config: SyncConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_primary_key(mut self, primary_key: &str) -> Self {
        self.primary_key = primary_key.to_string();
        self
    }

    pub fn with_prefixes(mut self, new_prefix: &str, delete_prefix: &str) -> Self {
        self.new_prefix = new_prefix.to_string();
        self.delete_prefix = delete_prefix.to_string();
        self
    }

    pub fn with_id_order(mut self, id_order: IdOrder) -> Self {
        self.id_order = id_order;
        self
    }

    /// Fill key carrying the force-new payload for `relation`
    pub fn new_key(&self, relation: &str) -> String {
        format!("{}{}", self.new_prefix, relation)
    }

    /// Fill key carrying the deletion signal for `relation`
    pub fn delete_key(&self, relation: &str) -> String {
        format!("{}{}", self.delete_prefix, relation)
    }

    /// Validate the configuration
    pub fn validate(&self) -> SyncResult<()> {
        if self.primary_key.is_empty() {
            return Err(SyncError::Configuration(
                "Primary key name cannot be empty".to_string(),
            ));
        }

        if self.new_prefix.is_empty() || self.delete_prefix.is_empty() {
            return Err(SyncError::Configuration(
                "Fill key prefixes cannot be empty".to_string(),
            ));
        }

        if self.new_prefix == self.delete_prefix {
            return Err(SyncError::Configuration(format!(
                "New and delete prefixes must differ (both are '{}')",
                self.new_prefix
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.new_key("car"), "new_car");
        assert_eq!(config.delete_key("wheels"), "delete_wheels");
        assert_eq!(config.id_order, IdOrder::Input);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let same_prefix = SyncConfig::default().with_prefixes("x_", "x_");
        assert!(matches!(same_prefix.validate(), Err(SyncError::Configuration(_))));

        let no_pk = SyncConfig::default().with_primary_key("");
        assert!(no_pk.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let config = SyncConfig::from_yaml_str("id_order: repository\nnew_prefix: create_\n").unwrap();
        assert_eq!(config.id_order, IdOrder::Repository);
        assert_eq!(config.new_prefix, "create_");
        assert_eq!(config.delete_prefix, "delete_");

        assert!(SyncConfig::from_yaml_str("new_prefix: ''\n").is_err());
    }
}
