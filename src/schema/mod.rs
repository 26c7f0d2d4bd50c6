//! Optional structural schemas attached to (project, collection) pairs.

pub mod registry;
pub mod validator;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::database::DatabaseError;

pub use registry::SchemaRegistry;
pub use validator::{validate, SchemaViolation};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Invalid schema: {0}")]
    Invalid(String),

    #[error(transparent)]
    Persistence(#[from] DatabaseError),
}

/// Declared field types, named the way the schema builder sends them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    String,
    #[serde(alias = "number")]
    Double,
    #[serde(alias = "long", alias = "integer")]
    Int,
    #[serde(alias = "boolean")]
    Bool,
    ObjectId,
    Date,
    Array,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "bsonType", alias = "type")]
    pub field_type: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSchema {
    pub project_id: String,
    pub collection_name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, FieldSpec>,
    #[serde(default)]
    pub required: BTreeSet<String>,
}

/// Incoming schema body: `{"bsonType": "object", "properties": {...}, "required": [...]}`
#[derive(Debug, Deserialize)]
struct SchemaDefinition {
    #[serde(default, rename = "bsonType", alias = "type")]
    root_type: Option<String>,
    #[serde(default)]
    properties: BTreeMap<String, FieldSpec>,
    #[serde(default)]
    required: Vec<String>,
}

impl CollectionSchema {
    pub fn empty(project_id: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            collection_name: collection_name.into(),
            properties: BTreeMap::new(),
            required: BTreeSet::new(),
        }
    }

    /// Parse a schema definition. `None`, `null` and `{}` all mean "no validation".
    pub fn from_definition(
        project_id: &str,
        collection_name: &str,
        definition: Option<&Value>,
    ) -> Result<Self, SchemaError> {
        let mut schema = Self::empty(project_id, collection_name);

        let definition = match definition {
            None | Some(Value::Null) => return Ok(schema),
            Some(Value::Object(map)) if map.is_empty() => return Ok(schema),
            Some(value @ Value::Object(_)) => value,
            Some(_) => return Err(SchemaError::Invalid("schema must be a JSON object".to_string())),
        };

        let parsed: SchemaDefinition = serde_json::from_value(definition.clone())
            .map_err(|e| SchemaError::Invalid(e.to_string()))?;

        if let Some(root) = parsed.root_type.as_deref() {
            if root != "object" {
                return Err(SchemaError::Invalid(format!(
                    "root bsonType must be 'object', got '{}'",
                    root
                )));
            }
        }

        for name in parsed.properties.keys().chain(parsed.required.iter()) {
            if name.trim().is_empty() {
                return Err(SchemaError::Invalid("field names cannot be empty".to_string()));
            }
        }

        schema.properties = parsed.properties;
        schema.required = parsed.required.into_iter().collect();
        Ok(schema)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.required.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_schema_builder_shape() {
        let definition = json!({
            "bsonType": "object",
            "properties": {
                "title": { "bsonType": "string" },
                "views": { "bsonType": "int" },
                "tags": { "type": "array" }
            },
            "required": ["title"]
        });

        let schema = CollectionSchema::from_definition("p1", "posts", Some(&definition)).unwrap();
        assert_eq!(schema.properties.len(), 3);
        assert_eq!(schema.properties["views"].field_type, FieldType::Int);
        assert_eq!(schema.properties["tags"].field_type, FieldType::Array);
        assert!(schema.required.contains("title"));
    }

    #[test]
    fn empty_definitions_mean_no_validation() {
        for definition in [None, Some(json!(null)), Some(json!({}))] {
            let schema = CollectionSchema::from_definition("p1", "posts", definition.as_ref()).unwrap();
            assert!(schema.is_empty());
        }
    }

    #[test]
    fn rejects_unknown_types_and_bad_roots() {
        let unknown = json!({ "properties": { "x": { "bsonType": "decimal128" } } });
        assert!(matches!(
            CollectionSchema::from_definition("p1", "c", Some(&unknown)),
            Err(SchemaError::Invalid(_))
        ));

        let array_root = json!({ "bsonType": "array" });
        assert!(CollectionSchema::from_definition("p1", "c", Some(&array_root)).is_err());

        let not_object = json!(["title"]);
        assert!(CollectionSchema::from_definition("p1", "c", Some(&not_object)).is_err());

        let blank_required = json!({ "required": [" "] });
        assert!(CollectionSchema::from_definition("p1", "c", Some(&blank_required)).is_err());
    }

    #[test]
    fn serializes_with_builder_field_names() {
        let definition = json!({ "properties": { "n": { "type": "objectId" } } });
        let schema = CollectionSchema::from_definition("p1", "c", Some(&definition)).unwrap();
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["collectionName"], "c");
        assert_eq!(value["properties"]["n"]["bsonType"], "objectId");
    }
}
