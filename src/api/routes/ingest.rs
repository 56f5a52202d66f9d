//! Ingest Routes
//!
//! Endpoints for the three ingestion message shapes.
//!
//! - POST /api/v1/ingest/metrics - `{Key, Value, Metrics[]}`
//! - POST /api/v1/ingest/tags - `{Key, Value, Tags[]}`
//! - POST /api/v1/ingest/custom - `{Tags[], Metrics[]}`
//! - POST /api/v1/ingest/batch - Any mix of the above

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::{BatchIngestRequest, BatchIngestResponse, IngestResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::database::{CustomMessage, IngestOutcome, MetricsMessage, TagsMessage};

/// POST /api/v1/ingest/metrics
pub async fn ingest_metrics(
    State(state): State<Arc<AppState>>,
    Json(msg): Json<MetricsMessage>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    let accepted = state.db.insert_metrics(&msg)?;
    tracing::debug!(key = %msg.key, value = %msg.value, accepted, "Ingested metrics");

    Ok(accepted_response(IngestOutcome {
        accepted,
        dropped: Vec::new(),
    }))
}

/// POST /api/v1/ingest/tags
pub async fn ingest_tags(
    State(state): State<Arc<AppState>>,
    Json(msg): Json<TagsMessage>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    let outcome = state.db.insert_tags(&msg)?;
    Ok(accepted_response(outcome))
}

/// POST /api/v1/ingest/custom
pub async fn ingest_custom(
    State(state): State<Arc<AppState>>,
    Json(msg): Json<CustomMessage>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    let outcome = state.db.insert_custom(&msg)?;
    Ok(accepted_response(outcome))
}

/// POST /api/v1/ingest/batch
///
/// Each message is decoded and inserted on its own; failures are reported
/// by position without affecting the rest.
pub async fn ingest_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchIngestRequest>,
) -> ApiResult<(StatusCode, Json<BatchIngestResponse>)> {
    if req.messages.is_empty() {
        return Err(ApiError::Validation("Empty batch".to_string()));
    }

    let max = state.db.settings().max_batch_messages;
    if req.messages.len() > max {
        return Err(ApiError::Validation(format!(
            "Batch size exceeds maximum of {} messages",
            max
        )));
    }

    let report = state.db.insert_batch(req.messages)?;

    let status = if report.errors.is_empty() {
        StatusCode::ACCEPTED
    } else if report.accepted > 0 {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::BAD_REQUEST
    };

    let status_str = if report.errors.is_empty() { "ok" } else { "partial" };

    Ok((
        status,
        Json(BatchIngestResponse {
            status: status_str.to_string(),
            accepted: report.accepted,
            rejected: report.rejected,
            dropped_tags: report.dropped_tags,
            errors: report.errors,
        }),
    ))
}

fn accepted_response(outcome: IngestOutcome) -> (StatusCode, Json<IngestResponse>) {
    (StatusCode::ACCEPTED, Json(IngestResponse::from(outcome)))
}
