//! Canonical entity records and their dialect-specific wire shapes.
//!
//! Every page the engine fetches is turned into [`Entity`] values through
//! [`DialectRecord::into_entity`], so the copy/remove loop never touches
//! dialect-specific fields directly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dialect::Dialect;
use crate::error::{MigrationError, MigrationResult};

/// One broker resource: an insertion-ordered attribute map that always holds
/// a string `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Entity(Map<String, Value>);

impl Entity {
    pub fn from_map(map: Map<String, Value>) -> MigrationResult<Self> {
        match map.get("id") {
            Some(Value::String(_)) => Ok(Self(map)),
            Some(_) => Err(MigrationError::decode("entity", "`id` is not a string")),
            None => Err(MigrationError::decode("entity", "entity has no `id`")),
        }
    }

    pub fn id(&self) -> &str {
        self.0.get("id").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn entity_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Attach a linked-data `@context`, replacing any existing one.
    pub fn with_context(mut self, context: &str) -> Self {
        self.0
            .insert("@context".to_string(), Value::String(context.to_string()));
        self
    }

    /// Bare legacy element addressing the whole entity. A legacy `DELETE`
    /// carrying attributes removes only those attributes.
    pub fn legacy_delete_projection(&self) -> Self {
        let mut map = Map::new();
        map.insert(
            "type".to_string(),
            self.0.get("type").cloned().unwrap_or(Value::String(String::new())),
        );
        map.insert("id".to_string(), Value::String(self.id().to_string()));
        map.insert("isPattern".to_string(), Value::String("false".to_string()));
        Self(map)
    }
}

/// A decoded item still in the shape of the dialect it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum DialectRecord {
    Legacy(ContextElement),
    FlatJson(Map<String, Value>),
    LinkedData(Map<String, Value>),
}

impl DialectRecord {
    pub fn from_value(dialect: Dialect, value: Value) -> MigrationResult<Self> {
        match (dialect, value) {
            (Dialect::Legacy, value) => serde_json::from_value(value)
                .map(Self::Legacy)
                .map_err(|error| MigrationError::decode("legacy context element", error)),
            (Dialect::FlatJson, Value::Object(map)) => Ok(Self::FlatJson(map)),
            (Dialect::LinkedData, Value::Object(map)) => Ok(Self::LinkedData(map)),
            (dialect, other) => Err(MigrationError::decode(
                format!("{dialect} entity"),
                format!("expected a JSON object, found {}", json_kind(&other)),
            )),
        }
    }

    pub fn into_entity(self) -> MigrationResult<Entity> {
        match self {
            Self::Legacy(element) => Ok(element.into()),
            Self::FlatJson(map) | Self::LinkedData(map) => Entity::from_map(map),
        }
    }
}

/// Legacy `contextElement`: type, id, pattern flag and an attribute array.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContextElement {
    #[serde(rename = "type", default)]
    pub entity_type: String,
    #[serde(rename = "isPattern", default = "not_a_pattern")]
    pub is_pattern: Value,
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<ContextAttribute>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContextAttribute {
    pub name: String,
    #[serde(rename = "type", default)]
    pub attr_type: String,
    #[serde(default)]
    pub value: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContextAttribute {
    fn into_value(self) -> Value {
        let mut map = Map::new();
        map.insert("name".to_string(), Value::String(self.name));
        map.insert("type".to_string(), Value::String(self.attr_type));
        map.insert("value".to_string(), self.value);
        map.extend(self.extra);
        Value::Object(map)
    }
}

impl From<ContextElement> for Entity {
    fn from(element: ContextElement) -> Self {
        let mut map = Map::new();
        map.insert("type".to_string(), Value::String(element.entity_type));
        map.insert("id".to_string(), Value::String(element.id));
        map.insert("isPattern".to_string(), element.is_pattern);
        map.insert(
            "attributes".to_string(),
            Value::Array(
                element
                    .attributes
                    .into_iter()
                    .map(ContextAttribute::into_value)
                    .collect(),
            ),
        );
        Self(map)
    }
}

impl TryFrom<Entity> for ContextElement {
    type Error = MigrationError;

    fn try_from(entity: Entity) -> Result<Self, Self::Error> {
        serde_json::from_value(Value::Object(entity.0))
            .map_err(|error| MigrationError::decode("legacy context element", error))
    }
}

fn not_a_pattern() -> Value {
    Value::String("false".to_string())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn entity_requires_string_id() {
        assert!(Entity::from_map(object(json!({"id": "urn:Room:1", "type": "Room"}))).is_ok());
        let missing = Entity::from_map(object(json!({"type": "Room"}))).expect_err("no id");
        assert_eq!(missing.kind(), crate::ErrorKind::Decode);
        let numeric = Entity::from_map(object(json!({"id": 7}))).expect_err("numeric id");
        assert_eq!(numeric.kind(), crate::ErrorKind::Decode);
    }

    #[test]
    fn entity_keeps_attribute_order() {
        let entity = Entity::from_map(object(json!({
            "id": "r1",
            "type": "Room",
            "zeta": {"value": 1},
            "alpha": {"value": 2}
        })))
        .expect("entity");
        let keys: Vec<&str> = entity.keys().collect();
        assert_eq!(keys, vec!["id", "type", "zeta", "alpha"]);
    }

    #[test]
    fn legacy_element_flattens_to_canonical_order() {
        let element: ContextElement = serde_json::from_value(json!({
            "attributes": [
                {"name": "temperature", "type": "float", "value": "23"},
                {"name": "pressure", "type": "integer", "value": "720"}
            ],
            "id": "Room1",
            "isPattern": "false",
            "type": "Room"
        }))
        .expect("element");

        let entity: Entity = element.into();
        let keys: Vec<&str> = entity.keys().collect();
        assert_eq!(keys, vec!["type", "id", "isPattern", "attributes"]);
        assert_eq!(entity.id(), "Room1");
        assert_eq!(entity.entity_type(), Some("Room"));
        assert_eq!(
            entity.get("attributes"),
            Some(&json!([
                {"name": "temperature", "type": "float", "value": "23"},
                {"name": "pressure", "type": "integer", "value": "720"}
            ]))
        );
    }

    #[test]
    fn legacy_attribute_metadata_survives_round_trip() {
        let element: ContextElement = serde_json::from_value(json!({
            "type": "Room",
            "id": "Room1",
            "isPattern": "false",
            "attributes": [{
                "name": "temperature",
                "type": "float",
                "value": "23",
                "metadatas": [{"name": "unit", "type": "string", "value": "C"}]
            }]
        }))
        .expect("element");
        let back = ContextElement::try_from(Entity::from(element.clone())).expect("back");
        assert_eq!(back, element);
    }

    #[test]
    fn delete_projection_drops_attributes() {
        let entity = Entity::from_map(object(json!({
            "id": "Room1",
            "type": "Room",
            "temperature": {"type": "Number", "value": 23}
        })))
        .expect("entity");
        let projected = entity.legacy_delete_projection();
        assert_eq!(
            Value::Object(projected.into_map()),
            json!({"type": "Room", "id": "Room1", "isPattern": "false"})
        );
    }

    #[test]
    fn with_context_inserts_at_context() {
        let entity = Entity::from_map(object(json!({"id": "urn:ngsi-ld:Room:1", "type": "Room"})))
            .expect("entity")
            .with_context("https://example.org/context.jsonld");
        assert_eq!(
            entity.get("@context"),
            Some(&json!("https://example.org/context.jsonld"))
        );
    }

    #[test]
    fn record_rejects_non_object_items() {
        let error = DialectRecord::from_value(Dialect::FlatJson, json!("Room1"))
            .expect_err("string item");
        assert!(error.to_string().contains("expected a JSON object, found a string"));
    }
}
