pub mod api;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod pool;
pub mod registry;
pub mod schema;
pub mod services;
pub mod state;
pub mod store;
pub mod types;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::state::AppState;

/// The full HTTP surface: public, admin and data planes
pub fn app(state: AppState, config: &AppConfig) -> Router {
    let router = Router::new()
        // Public
        .route("/", get(handlers::public::root))
        .route("/health", get(handlers::public::health))
        .route("/api/v1/generate-key", post(handlers::public::generate_key))
        // Admin
        .merge(admin_routes())
        // Data plane (X-API-Key)
        .merge(data_routes())
        .with_state(state)
        // Global middleware
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.api.max_request_size_bytes));

    let router = if config.api.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };

    match cors_layer(config) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn admin_routes() -> Router<AppState> {
    use handlers::admin;

    Router::new()
        .route(
            "/api/v1/projects",
            get(admin::project_list).post(admin::project_create),
        )
        .route(
            "/api/v1/projects/:id",
            get(admin::project_get)
                .put(admin::project_update)
                .delete(admin::project_delete),
        )
        .route(
            "/api/v1/projects/:id/collections",
            get(admin::collection_list).post(admin::collection_create),
        )
        .route(
            "/api/v1/projects/:id/collections/:name",
            axum::routing::delete(admin::collection_delete),
        )
        .route(
            "/api/v1/projects/:id/collections/:name/schema",
            get(admin::schema_get).put(admin::schema_put),
        )
}

fn data_routes() -> Router<AppState> {
    use handlers::data;

    Router::new()
        .route(
            "/api/v1/data/:project_id/:collection",
            get(data::collection_get).post(data::collection_post),
        )
        .route(
            "/api/v1/data/:project_id/:collection/:id",
            get(data::document_get)
                .put(data::document_put)
                .delete(data::document_delete),
        )
        .route_layer(axum::middleware::from_fn(middleware::api_key_middleware))
}

fn cors_layer(config: &AppConfig) -> Option<CorsLayer> {
    if !config.security.enable_cors {
        return None;
    }
    if config.security.cors_origins.iter().any(|o| o == "*") {
        return Some(CorsLayer::permissive());
    }

    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}
