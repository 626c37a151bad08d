//! Primary Key - Identifier type for persisted records
//!
//! Identifiers are integers assigned by the repository on first save. Payload
//! keys and JSON values are parsed leniently: `7` and `"7"` both name record 7.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a persisted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub i64);

impl EntityId {
    pub fn new(id: i64) -> Self {
        EntityId(id)
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }

    /// Parse a payload key; any key that is not an integer is not an identifier
    pub fn parse_key(key: &str) -> Option<Self> {
        key.trim().parse::<i64>().ok().map(EntityId)
    }

    /// Read an identifier from a JSON integer or integer-looking string
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(EntityId),
            Value::String(s) => Self::parse_key(s),
            _ => None,
        }
    }

    pub fn to_json(self) -> Value {
        Value::from(self.0)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_id_display() {
        assert_eq!(format!("{}", EntityId(123)), "123");
    }

    #[test]
    fn test_entity_id_parsing() {
        assert_eq!(EntityId::parse_key("42"), Some(EntityId(42)));
        assert_eq!(EntityId::parse_key(" 7 "), Some(EntityId(7)));
        assert_eq!(EntityId::parse_key("new1"), None);

        assert_eq!(EntityId::from_json(&json!(3)), Some(EntityId(3)));
        assert_eq!(EntityId::from_json(&json!("3")), Some(EntityId(3)));
        assert_eq!(EntityId::from_json(&json!(3.5)), None);
        assert_eq!(EntityId::from_json(&json!({ "size": 3 })), None);
    }
}
