//! Handlers for the minimal, out-of-scope-but-present CRUD surface over
//! orders and the three reference tables (§4.9). No gate or breaker
//! participation: these run straight against the pool.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use crate::error::ServiceError;
use crate::models::{
    BlotterDraft, BlotterUpdate, CodeDraft, CodeUpdate, MutationOutcome, OrderUpdate,
    VersionedDelete,
};

use super::state::AppState;

fn outcome_response<T: serde::Serialize>(
    outcome: Result<MutationOutcome<T>, sqlx::Error>,
    not_found_message: &str,
) -> Response {
    match outcome {
        Ok(MutationOutcome::Ok(value)) => (StatusCode::OK, Json(value)).into_response(),
        Ok(MutationOutcome::NotFound) => ServiceError::not_found(not_found_message).into_response(),
        Ok(MutationOutcome::Conflict) => {
            ServiceError::conflict("version mismatch or referential constraint").into_response()
        }
        Err(err) => ServiceError::from(err).into_response(),
    }
}

fn delete_response(outcome: Result<MutationOutcome<()>, sqlx::Error>, not_found_message: &str) -> Response {
    match outcome {
        Ok(MutationOutcome::Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(MutationOutcome::NotFound) => ServiceError::not_found(not_found_message).into_response(),
        Ok(MutationOutcome::Conflict) => {
            ServiceError::conflict("version mismatch or referential constraint").into_response()
        }
        Err(err) => ServiceError::from(err).into_response(),
    }
}

pub async fn get_order(State(state): State<Arc<AppState>>, Path(order_id): Path<i64>) -> Response {
    match state.orders.get_one(order_id).await {
        Ok(Some(order)) => (StatusCode::OK, Json(order)).into_response(),
        Ok(None) => ServiceError::not_found(format!("order {order_id} not found")).into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

pub async fn list_orders(State(state): State<Arc<AppState>>) -> Response {
    match state.orders.list_all().await {
        Ok(orders) => (StatusCode::OK, Json(orders)).into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

pub async fn update_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<i64>,
    Json(update): Json<OrderUpdate>,
) -> Response {
    outcome_response(
        state.orders.update(order_id, &update).await,
        &format!("order {order_id} not found"),
    )
}

pub async fn delete_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<i64>,
    Json(body): Json<VersionedDelete>,
) -> Response {
    delete_response(
        state.orders.delete(order_id, body.version).await,
        &format!("order {order_id} not found"),
    )
}

pub async fn list_statuses(State(state): State<Arc<AppState>>) -> Response {
    match state.reference_admin.list_statuses().await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

pub async fn get_status(State(state): State<Arc<AppState>>, Path(status_id): Path<i32>) -> Response {
    match state.reference_admin.get_status(status_id).await {
        Ok(Some(row)) => (StatusCode::OK, Json(row)).into_response(),
        Ok(None) => ServiceError::not_found(format!("status {status_id} not found")).into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

pub async fn create_status(State(state): State<Arc<AppState>>, Json(draft): Json<CodeDraft>) -> Response {
    match state.reference_admin.create_status(&draft).await {
        Ok(row) => (StatusCode::CREATED, Json(row)).into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(status_id): Path<i32>,
    Json(update): Json<CodeUpdate>,
) -> Response {
    outcome_response(
        state.reference_admin.update_status(status_id, &update).await,
        &format!("status {status_id} not found"),
    )
}

pub async fn delete_status(
    State(state): State<Arc<AppState>>,
    Path(status_id): Path<i32>,
    Json(body): Json<VersionedDelete>,
) -> Response {
    delete_response(
        state.reference_admin.delete_status(status_id, body.version).await,
        &format!("status {status_id} not found"),
    )
}

pub async fn list_order_types(State(state): State<Arc<AppState>>) -> Response {
    match state.reference_admin.list_order_types().await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

pub async fn get_order_type(State(state): State<Arc<AppState>>, Path(order_type_id): Path<i32>) -> Response {
    match state.reference_admin.get_order_type(order_type_id).await {
        Ok(Some(row)) => (StatusCode::OK, Json(row)).into_response(),
        Ok(None) => {
            ServiceError::not_found(format!("order type {order_type_id} not found")).into_response()
        }
        Err(err) => ServiceError::from(err).into_response(),
    }
}

pub async fn create_order_type(State(state): State<Arc<AppState>>, Json(draft): Json<CodeDraft>) -> Response {
    match state.reference_admin.create_order_type(&draft).await {
        Ok(row) => (StatusCode::CREATED, Json(row)).into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

pub async fn update_order_type(
    State(state): State<Arc<AppState>>,
    Path(order_type_id): Path<i32>,
    Json(update): Json<CodeUpdate>,
) -> Response {
    outcome_response(
        state
            .reference_admin
            .update_order_type(order_type_id, &update)
            .await,
        &format!("order type {order_type_id} not found"),
    )
}

pub async fn delete_order_type(
    State(state): State<Arc<AppState>>,
    Path(order_type_id): Path<i32>,
    Json(body): Json<VersionedDelete>,
) -> Response {
    delete_response(
        state
            .reference_admin
            .delete_order_type(order_type_id, body.version)
            .await,
        &format!("order type {order_type_id} not found"),
    )
}

pub async fn list_blotters(State(state): State<Arc<AppState>>) -> Response {
    match state.reference_admin.list_blotters().await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

pub async fn get_blotter(State(state): State<Arc<AppState>>, Path(blotter_id): Path<i32>) -> Response {
    match state.reference_admin.get_blotter(blotter_id).await {
        Ok(Some(row)) => (StatusCode::OK, Json(row)).into_response(),
        Ok(None) => ServiceError::not_found(format!("blotter {blotter_id} not found")).into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

pub async fn create_blotter(State(state): State<Arc<AppState>>, Json(draft): Json<BlotterDraft>) -> Response {
    match state.reference_admin.create_blotter(&draft).await {
        Ok(row) => (StatusCode::CREATED, Json(row)).into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

pub async fn update_blotter(
    State(state): State<Arc<AppState>>,
    Path(blotter_id): Path<i32>,
    Json(update): Json<BlotterUpdate>,
) -> Response {
    outcome_response(
        state.reference_admin.update_blotter(blotter_id, &update).await,
        &format!("blotter {blotter_id} not found"),
    )
}

pub async fn delete_blotter(
    State(state): State<Arc<AppState>>,
    Path(blotter_id): Path<i32>,
    Json(body): Json<VersionedDelete>,
) -> Response {
    delete_response(
        state.reference_admin.delete_blotter(blotter_id, body.version).await,
        &format!("blotter {blotter_id} not found"),
    )
}
