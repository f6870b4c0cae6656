//! HTTP handlers for the two in-scope endpoints (§6): bulk submit and
//! batch create. Both return the same aggregate-result shape; the status
//! code is derived from the aggregate's SUCCESS/PARTIAL/FAILURE mix.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::{AggregateResult, AggregateStatus, OrderDraft};
use crate::orchestrator::batch_create::CreateError;
use crate::orchestrator::bulk_submit::SubmitError;

use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BulkSubmitRequest {
    #[serde(rename = "orderIds")]
    pub order_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
struct TooLargeBody {
    code: &'static str,
    message: String,
    results: Vec<()>,
}

fn aggregate_status_code(result: &AggregateResult) -> StatusCode {
    match result.status {
        AggregateStatus::Success => StatusCode::OK,
        AggregateStatus::Partial | AggregateStatus::Failure => StatusCode::MULTI_STATUS,
    }
}

pub async fn bulk_submit(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BulkSubmitRequest>,
) -> Response {
    match state.bulk_submit.submit(request.order_ids).await {
        Ok(result) => (aggregate_status_code(&result), Json(result)).into_response(),
        Err(SubmitError::TooLarge { max }) => (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(TooLargeBody {
                code: "VALIDATION_ERROR",
                message: format!("orderIds must contain at most {max} entries"),
                results: Vec::new(),
            }),
        )
            .into_response(),
        Err(SubmitError::Service(err)) => err.into_response(),
    }
}

pub async fn batch_create(
    State(state): State<Arc<AppState>>,
    Json(drafts): Json<Vec<OrderDraft>>,
) -> Response {
    match state.batch_create.create_batch(drafts).await {
        Ok(result) => (aggregate_status_code(&result), Json(result)).into_response(),
        Err(CreateError::TooLarge { max }) => (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(TooLargeBody {
                code: "VALIDATION_ERROR",
                message: format!("batch must contain at most {max} drafts"),
                results: Vec::new(),
            }),
        )
            .into_response(),
        Err(CreateError::Service(err)) => err.into_response(),
    }
}

/// Rate-limits the actual database ping to once per interval; between
/// pings the last known result is assumed to still hold.
static LAST_CHECK_MS: AtomicU64 = AtomicU64::new(0);
const CHECK_INTERVAL_MS: u64 = 5_000;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(rename = "timestampMs")]
    timestamp_ms: u64,
    version: &'static str,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let last_check = LAST_CHECK_MS.load(Ordering::Relaxed);
    let healthy = if now_ms.saturating_sub(last_check) > CHECK_INTERVAL_MS {
        LAST_CHECK_MS.store(now_ms, Ordering::Relaxed);
        match state.db.health_check().await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(%err, "health check: database ping failed");
                false
            }
        }
    } else {
        true
    };

    let body = HealthResponse {
        status: if healthy { "ok" } else { "unavailable" },
        timestamp_ms: now_ms,
        version: env!("CARGO_PKG_VERSION"),
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}
