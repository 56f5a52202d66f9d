//! Query Routes
//!
//! - GET /api/v1/query?q=virt.v1.servers-dc:us_west - Resolve tags to metrics
//! - GET /api/v1/autocomplete?q=servers-st - Complete a partial tag

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;
use std::time::Instant;

use crate::api::dto::{
    AutocompleteParams, AutocompleteResponse, QueryMeta, QueryParams, QueryResponse,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

/// GET /api/v1/query
pub async fn execute_query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> ApiResult<Json<QueryResponse>> {
    if params.q.trim().is_empty() {
        return Err(ApiError::Validation("q cannot be empty".to_string()));
    }

    let start = Instant::now();
    let metrics = state.db.query_str(&params.q)?;
    let execution_time_ms = start.elapsed().as_millis() as u64;

    tracing::debug!(query = %params.q, count = metrics.len(), execution_time_ms, "Query resolved");

    Ok(Json(QueryResponse {
        query: params.q,
        meta: QueryMeta {
            count: metrics.len(),
            execution_time_ms,
        },
        metrics,
    }))
}

/// GET /api/v1/autocomplete
pub async fn autocomplete(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AutocompleteParams>,
) -> ApiResult<Json<AutocompleteResponse>> {
    let completions = state.db.autocomplete(&params.q)?;
    Ok(Json(AutocompleteResponse {
        input: params.q,
        completions,
    }))
}
