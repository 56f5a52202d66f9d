//! Catalog and Admin Routes
//!
//! - GET /api/v1/catalog - Table of Contents snapshot
//! - GET /api/v1/stats - Per-index statistics
//! - POST /api/v1/materialize - Publish buffered writes now

use axum::{extract::State, Json};
use std::sync::Arc;
use std::time::Instant;

use crate::api::dto::MaterializeResponse;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::database::DatabaseStats;
use crate::index::Catalog;

/// GET /api/v1/catalog
pub async fn get_catalog(State(state): State<Arc<AppState>>) -> Json<Catalog> {
    Json(state.db.catalog())
}

/// GET /api/v1/stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<DatabaseStats> {
    Json(state.db.stats())
}

/// POST /api/v1/materialize
///
/// Runs on the blocking pool; queries keep being served meanwhile.
pub async fn materialize(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<MaterializeResponse>> {
    let start = Instant::now();
    let db = Arc::clone(&state.db);

    let indexes = tokio::task::spawn_blocking(move || db.materialize_indexes())
        .await
        .map_err(|e| ApiError::Internal(format!("Materialization task failed: {}", e)))??;

    Ok(Json(MaterializeResponse {
        status: "ok".to_string(),
        indexes,
        execution_time_ms: start.elapsed().as_millis() as u64,
    }))
}
