use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;

use crate::database::DatabaseError;
use crate::schema::CollectionSchema;

#[derive(Debug, Clone, FromRow)]
pub struct SchemaRow {
    pub project_id: String,
    pub collection_name: String,
    pub properties: Json<Value>,
    pub required: Vec<String>,
}

impl TryFrom<SchemaRow> for CollectionSchema {
    type Error = DatabaseError;

    fn try_from(row: SchemaRow) -> Result<Self, Self::Error> {
        let properties = serde_json::from_value(row.properties.0).map_err(|e| {
            DatabaseError::CorruptRow(format!(
                "schema {}/{}: {}",
                row.project_id, row.collection_name, e
            ))
        })?;

        Ok(CollectionSchema {
            project_id: row.project_id,
            collection_name: row.collection_name,
            properties,
            required: row.required.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use serde_json::json;

    #[test]
    fn converts_rows_into_schemas() {
        let row = SchemaRow {
            project_id: "p1".into(),
            collection_name: "posts".into(),
            properties: Json(json!({ "title": { "bsonType": "string" } })),
            required: vec!["title".into()],
        };
        let schema = CollectionSchema::try_from(row).unwrap();
        assert_eq!(schema.properties["title"].field_type, FieldType::String);
        assert!(schema.required.contains("title"));
    }

    #[test]
    fn rejects_corrupt_property_maps() {
        let row = SchemaRow {
            project_id: "p1".into(),
            collection_name: "posts".into(),
            properties: Json(json!(["title"])),
            required: vec![],
        };
        assert!(matches!(
            CollectionSchema::try_from(row),
            Err(DatabaseError::CorruptRow(_))
        ));
    }
}
