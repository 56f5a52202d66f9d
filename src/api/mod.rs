//! Virtindex REST API
//!
//! HTTP API layer for Virtindex, built with Axum.
//!
//! # Endpoints
//!
//! ## Ingest
//! - `POST /api/v1/ingest/metrics` - Metrics owned by a join value
//! - `POST /api/v1/ingest/tags` - Tags describing a join value
//! - `POST /api/v1/ingest/custom` - Tags attached directly to metrics
//! - `POST /api/v1/ingest/batch` - Mixed batch of messages
//!
//! ## Query
//! - `GET /api/v1/query?q=virt.v1.<tag>.<tag>` - Resolve tags to metric names
//! - `GET /api/v1/autocomplete?q=<partial>` - Complete a partial tag
//!
//! ## Admin
//! - `GET /api/v1/catalog` - Table of Contents
//! - `GET /api/v1/stats` - Index statistics
//! - `POST /api/v1/materialize` - Publish buffered writes
//!
//! ## Health
//! - `GET /health/live` - Liveness check
//! - `GET /health/ready` - Readiness check
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use virtindex::api::{serve, AppState};
//! use virtindex::config::Config;
//! use virtindex::database::Database;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let db = Arc::new(Database::new(config.index.clone())?);
//!
//!     let state = AppState::new(db, config.api.clone());
//!     serve(state, &config.api).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use crate::config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Ingest routes
        .route("/ingest/metrics", post(routes::ingest::ingest_metrics))
        .route("/ingest/tags", post(routes::ingest::ingest_tags))
        .route("/ingest/custom", post(routes::ingest::ingest_custom))
        .route("/ingest/batch", post(routes::ingest::ingest_batch))
        // Query routes
        .route("/query", get(routes::query::execute_query))
        .route("/autocomplete", get(routes::query::autocomplete))
        // Admin routes
        .route("/catalog", get(routes::catalog::get_catalog))
        .route("/stats", get(routes::catalog::get_stats))
        .route("/materialize", post(routes::catalog::materialize));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let cors = cors_layer(&state.config.cors_origins);

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Virtindex API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Virtindex API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dto::{AutocompleteResponse, BatchIngestResponse, QueryResponse};
    use crate::config::IndexSettings;
    use crate::database::Database;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use tower::util::ServiceExt;

    fn create_test_app() -> (Router, Arc<Database>) {
        let db = Arc::new(Database::new(IndexSettings::default()).unwrap());
        let state = AppState::new(Arc::clone(&db), ApiConfig::default());
        (build_router(state), db)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let (app, _db) = create_test_app();
        let response = app.oneshot(get("/health/live")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready_after_materialize() {
        let (app, db) = create_test_app();

        let response = app.clone().oneshot(get("/health/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        db.materialize_indexes().unwrap();
        let response = app.oneshot(get("/health/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_reports_integrity_failure() {
        let (app, db) = create_test_app();
        db.materialize_indexes().unwrap();
        db.record_fatal(&crate::index::IndexError::Integrity(
            "text replay diverged".to_string(),
        ));

        let response = app.clone().oneshot(get("/health/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app.oneshot(get("/health")).await.unwrap();
        let body: crate::api::dto::HealthResponse = json(response).await;
        assert_eq!(body.status, "failed");
        assert!(body.error.unwrap().contains("text replay diverged"));
    }

    #[tokio::test]
    async fn test_health_full() {
        let (app, _db) = create_test_app();
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ingest_materialize_query() {
        let (app, _db) = create_test_app();

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/ingest/tags",
                r#"{"Key": "fqdn", "Value": "host1", "Tags": ["servers-dc:us_west"]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/ingest/metrics",
                r#"{"Key": "fqdn", "Value": "host1", "Metrics": ["host1.cpu.loadavg"]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = app
            .clone()
            .oneshot(post_json("/api/v1/materialize", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(get("/api/v1/query?q=virt.v1.servers-dc:us_west"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: QueryResponse = json(response).await;
        assert_eq!(body.metrics, vec!["host1.cpu.loadavg"]);
        assert_eq!(body.meta.count, 1);
    }

    #[tokio::test]
    async fn test_ingest_conflicting_tags() {
        let (app, _db) = create_test_app();
        let response = app
            .oneshot(post_json(
                "/api/v1/ingest/tags",
                r#"{"Key": "fqdn", "Value": "host1",
                    "Tags": ["servers-status:live", "servers-status:down"]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ingest_invalid_json() {
        let (app, _db) = create_test_app();
        let response = app
            .oneshot(post_json("/api/v1/ingest/custom", "not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ingest_batch_partial() {
        let (app, _db) = create_test_app();
        let response = app
            .oneshot(post_json(
                "/api/v1/ingest/batch",
                r#"{"messages": [
                    {"Tags": ["custom-a:1"], "Metrics": ["m1"]},
                    {"Key": "fqdn"}
                ]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::MULTI_STATUS);

        let body: BatchIngestResponse = json(response).await;
        assert_eq!(body.accepted, 1);
        assert_eq!(body.rejected, 1);
        assert_eq!(body.errors[0].index, 1);
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let (app, _db) = create_test_app();
        let response = app
            .oneshot(post_json("/api/v1/ingest/batch", r#"{"messages": []}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_requires_prefix() {
        let (app, _db) = create_test_app();
        let response = app
            .oneshot(get("/api/v1/query?q=servers-dc:us_west"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_autocomplete_services() {
        let (app, _db) = create_test_app();
        let response = app
            .oneshot(get("/api/v1/autocomplete?q=*"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: AutocompleteResponse = json(response).await;
        assert_eq!(body.completions, vec!["custom-", "re-"]);
    }

    #[tokio::test]
    async fn test_catalog_and_stats() {
        let (app, db) = create_test_app();
        db.insert_custom(&crate::database::CustomMessage {
            tags: vec!["custom-team:db".to_string()],
            metrics: vec!["db1.qps".to_string()],
        })
        .unwrap();

        let response = app.clone().oneshot(get("/api/v1/catalog")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let catalog: crate::index::Catalog = json(response).await;
        assert_eq!(catalog["full"]["custom"]["team"]["db"], 1);

        let response = app.oneshot(get("/api/v1/stats")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let stats: serde_json::Value = json(response).await;
        assert_eq!(stats["pending_writes"], 1);
    }
}
