//! MongoDB-backed document store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document as BsonDocument};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use serde_json::Value;
use tracing::debug;

use super::{ConnectionParams, Connector, Document, DocumentStore, StoreError, ID_FIELD};

const APP_NAME: &str = "docbase-gateway";

// Server error codes
const NAMESPACE_EXISTS: i32 = 48;
const NAMESPACE_NOT_FOUND: i32 = 26;

impl From<MongoError> for StoreError {
    fn from(err: MongoError) -> Self {
        match err.kind.as_ref() {
            ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. } => {
                StoreError::Connection(err.to_string())
            }
            ErrorKind::Command(command) if command.code == NAMESPACE_EXISTS => {
                StoreError::CollectionExists(command.message.clone())
            }
            ErrorKind::Command(command) if command.code == NAMESPACE_NOT_FOUND => {
                StoreError::CollectionNotFound(command.message.clone())
            }
            ErrorKind::BsonSerialization(e) => StoreError::InvalidDocument(e.to_string()),
            _ => StoreError::Driver(err.to_string()),
        }
    }
}

pub struct MongoConnector {
    connect_timeout: Duration,
}

impl MongoConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn DocumentStore>, StoreError> {
        let mut options = ClientOptions::parse(params.uri())
            .await
            .map_err(|e| StoreError::Connection(format!("invalid connection parameters: {}", e)))?;
        options.app_name = Some(APP_NAME.to_string());
        options.connect_timeout = Some(self.connect_timeout);
        options.server_selection_timeout = Some(self.connect_timeout);

        let client = Client::with_options(options)?;
        let database = client.database(&params.db_name);

        // The driver connects lazily; ping so failures surface here
        database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        debug!("Connected to MongoDB at {}", params.address());
        Ok(Arc::new(MongoStore { client, database }))
    }
}

pub struct MongoStore {
    // Kept so the driver's connection pool lives as long as the handle
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoStore {
    fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.database.collection::<BsonDocument>(name)
    }
}

/// Match an ObjectId `_id` when the path id looks like one, a string `_id` otherwise
fn id_filter(id: &str) -> BsonDocument {
    match ObjectId::parse_str(id) {
        Ok(oid) => doc! { ID_FIELD: oid },
        Err(_) => doc! { ID_FIELD: id },
    }
}

/// Extended JSON in, so `{"$oid": ...}` and `{"$date": ...}` become native BSON values
fn to_bson(document: Document) -> Result<BsonDocument, StoreError> {
    match Bson::try_from(Value::Object(document)) {
        Ok(Bson::Document(converted)) => Ok(converted),
        Ok(_) => Err(StoreError::InvalidDocument("expected a JSON object".to_string())),
        Err(e) => Err(StoreError::InvalidDocument(e.to_string())),
    }
}

/// Relaxed extended JSON with `_id` flattened to a plain string
fn to_json(document: BsonDocument) -> Document {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(mut map) => {
            if let Some(id) = map.remove(ID_FIELD) {
                map.insert(ID_FIELD.to_string(), normalize_id(id));
            }
            map
        }
        _ => Document::new(),
    }
}

fn normalize_id(id: Value) -> Value {
    match id {
        Value::Object(ref map) => match map.get("$oid").and_then(Value::as_str) {
            Some(hex) => Value::String(hex.to_string()),
            None => id,
        },
        other => other,
    }
}

fn bson_id_to_json(id: Bson) -> Value {
    match id {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        other => normalize_id(other.into_relaxed_extjson()),
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.database.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let mut names = self.database.list_collection_names(None).await?;
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, name: &str) -> Result<(), StoreError> {
        self.database.create_collection(name, None).await?;
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), StoreError> {
        self.collection(name).drop(None).await?;
        Ok(())
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let cursor = self.collection(collection).find(None, None).await?;
        let documents: Vec<BsonDocument> = cursor.try_collect().await?;
        Ok(documents.into_iter().map(to_json).collect())
    }

    async fn find_one(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let found = self.collection(collection).find_one(id_filter(id), None).await?;
        Ok(found.map(to_json))
    }

    async fn insert(&self, collection: &str, mut document: Document) -> Result<Document, StoreError> {
        document.remove(ID_FIELD);
        let result = self
            .collection(collection)
            .insert_one(to_bson(document.clone())?, None)
            .await?;
        document.insert(ID_FIELD.to_string(), bson_id_to_json(result.inserted_id));
        Ok(document)
    }

    async fn replace(&self, collection: &str, id: &str, mut document: Document) -> Result<Option<Document>, StoreError> {
        document.remove(ID_FIELD);
        let result = self
            .collection(collection)
            .replace_one(id_filter(id), to_bson(document.clone())?, None)
            .await?;
        if result.matched_count == 0 {
            return Ok(None);
        }
        document.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        Ok(Some(document))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let result = self.collection(collection).delete_one(id_filter(id), None).await?;
        Ok(result.deleted_count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_id_paths_filter_by_object_id() {
        let filter = id_filter("65f1c0ffee0000000000abcd");
        assert!(matches!(filter.get(ID_FIELD), Some(Bson::ObjectId(_))));

        let filter = id_filter("custom-id");
        assert_eq!(filter.get_str(ID_FIELD).unwrap(), "custom-id");
    }

    #[test]
    fn flattens_object_ids_in_output() {
        let oid = ObjectId::parse_str("65f1c0ffee0000000000abcd").unwrap();
        let json = to_json(doc! { "_id": oid, "title": "a", "n": 3_i64 });
        assert_eq!(json[ID_FIELD], "65f1c0ffee0000000000abcd");
        assert_eq!(json["title"], "a");
        assert_eq!(json["n"], 3);
    }

    #[test]
    fn inserted_ids_become_strings() {
        let oid = ObjectId::new();
        assert_eq!(bson_id_to_json(Bson::ObjectId(oid)), json!(oid.to_hex()));
        assert_eq!(bson_id_to_json(Bson::String("k".into())), json!("k"));
    }

    #[test]
    fn converts_json_documents_to_bson() {
        let document = json!({ "title": "a", "tags": ["x"], "meta": { "n": 1.5 } });
        let bson = to_bson(document.as_object().cloned().unwrap()).unwrap();
        assert_eq!(bson.get_str("title").unwrap(), "a");
        assert!(bson.get_array("tags").is_ok());

        let document = json!({ "owner": { "$oid": "65f1c0ffee0000000000abcd" } });
        let bson = to_bson(document.as_object().cloned().unwrap()).unwrap();
        assert!(bson.get_object_id("owner").is_ok());
    }
}
