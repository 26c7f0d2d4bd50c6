use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};
use thiserror::Error;

use super::{CollectionSchema, FieldType};

/// First rule a document broke
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field '{field}' {reason}")]
pub struct SchemaViolation {
    pub field: String,
    pub reason: String,
}

impl SchemaViolation {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Check a document against a schema.
///
/// Required fields must be present and non-null. Declared fields that are
/// present must match their type; `null` is accepted for optional fields.
/// Undeclared fields pass through untouched.
pub fn validate(schema: &CollectionSchema, document: &Map<String, Value>) -> Result<(), SchemaViolation> {
    for field in &schema.required {
        match document.get(field) {
            None | Some(Value::Null) => {
                return Err(SchemaViolation::new(field, "is required"));
            }
            Some(_) => {}
        }
    }

    for (field, spec) in &schema.properties {
        let Some(value) = document.get(field) else { continue };
        if value.is_null() {
            continue;
        }
        if !matches_type(spec.field_type, value) {
            return Err(SchemaViolation::new(
                field,
                format!("must be of type {}", type_name(spec.field_type)),
            ));
        }
    }

    Ok(())
}

fn matches_type(field_type: FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::String => value.is_string(),
        FieldType::Double => value.is_number(),
        FieldType::Int => value.is_i64() || value.is_u64(),
        FieldType::Bool => value.is_boolean(),
        FieldType::Array => value.is_array(),
        FieldType::Date => value.as_str().is_some_and(is_date),
        FieldType::ObjectId => is_object_id(value),
    }
}

fn is_date(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok() || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

// Opaque identifier: a plain string or extended JSON {"$oid": "..."}
fn is_object_id(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        Value::Object(map) => map.len() == 1 && map.get("$oid").and_then(Value::as_str).is_some_and(|s| !s.is_empty()),
        _ => false,
    }
}

fn type_name(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "string",
        FieldType::Double => "double",
        FieldType::Int => "int",
        FieldType::Bool => "bool",
        FieldType::ObjectId => "objectId",
        FieldType::Date => "date",
        FieldType::Array => "array",
    }
}
