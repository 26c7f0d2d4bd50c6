#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use docbase_gateway::config::AppConfig;
use docbase_gateway::state::AppState;
use docbase_gateway::store::memory::MemoryConnector;

pub const DB_HOST: &str = "mongo.test";

/// The full router in-process over the memory document store
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub connector: Arc<MemoryConnector>,
}

pub struct Registered {
    pub id: String,
    pub api_key: String,
    pub api_secret: String,
    pub body: Value,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.pool.connect_timeout_ms = 500;
    config.pool.operation_timeout_ms = 300;
    config
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(MemoryConnector::new(), test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self::build(MemoryConnector::new(), config)
    }

    pub fn with_connector(connector: MemoryConnector) -> Self {
        Self::build(connector, test_config())
    }

    pub fn build(connector: MemoryConnector, config: AppConfig) -> Self {
        let connector = Arc::new(connector);
        let state = AppState::in_memory(connector.clone(), &config);
        Self::from_state(state, connector, &config)
    }

    pub fn from_state(state: AppState, connector: Arc<MemoryConnector>, config: &AppConfig) -> Self {
        let router = docbase_gateway::app(state.clone(), config);
        Self { router, state, connector }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Result<TestResponse> {
        self.send(method, uri, body, &[]).await
    }

    /// Send with extra headers, e.g. `("x-api-key", key)`
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Result<TestResponse> {
        let body = match body {
            Some(value) => Body::from(serde_json::to_vec(&value)?),
            None => Body::empty(),
        };
        self.send_raw(method, uri, body, headers).await
    }

    pub async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        body: Body,
        headers: &[(&str, &str)],
    ) -> Result<TestResponse> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body)?)
            .await
            .context("router failed")?;

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        Ok(TestResponse { status, body })
    }

    /// Data-plane request authenticated with `key`
    pub async fn data(&self, method: Method, uri: &str, key: &str, body: Option<Value>) -> Result<TestResponse> {
        self.send(method, uri, body, &[("x-api-key", key)]).await
    }

    pub async fn register(&self, db_name: &str) -> Result<Registered> {
        let response = self
            .request(
                Method::POST,
                "/api/v1/projects",
                Some(json!({ "dbHost": DB_HOST, "dbName": db_name })),
            )
            .await?;
        anyhow::ensure!(
            response.status == StatusCode::CREATED,
            "project create returned {}: {}",
            response.status,
            response.body
        );

        Ok(Registered {
            id: text(&response.body, "id")?,
            api_key: text(&response.body, "apiKey")?,
            api_secret: text(&response.body, "apiSecret")?,
            body: response.body,
        })
    }

    pub async fn create_collection(&self, project_id: &str, name: &str, schema: Value) -> Result<TestResponse> {
        self.request(
            Method::POST,
            &format!("/api/v1/projects/{}/collections", project_id),
            Some(json!({ "collectionName": name, "schema": schema })),
        )
        .await
    }

    pub async fn activate(&self, project_id: &str, collections: &[&str]) -> Result<TestResponse> {
        self.request(
            Method::PUT,
            &format!("/api/v1/projects/{}", project_id),
            Some(json!({ "activeCollections": collections })),
        )
        .await
    }

    /// Register a project with one created and activated collection
    pub async fn project_with_collection(&self, db_name: &str, collection: &str, schema: Value) -> Result<Registered> {
        let project = self.register(db_name).await?;
        let created = self.create_collection(&project.id, collection, schema).await?;
        anyhow::ensure!(created.status == StatusCode::CREATED, "collection create returned {}", created.status);
        let activated = self.activate(&project.id, &[collection]).await?;
        anyhow::ensure!(activated.status == StatusCode::OK, "activate returned {}", activated.status);
        Ok(project)
    }
}

pub fn text(body: &Value, field: &str) -> Result<String> {
    body[field]
        .as_str()
        .map(str::to_string)
        .with_context(|| format!("missing string field '{}' in {}", field, body))
}

pub fn short_delay() -> Duration {
    Duration::from_millis(50)
}
