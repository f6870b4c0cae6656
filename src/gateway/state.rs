//! Shared application state handed to every HTTP handler via axum's
//! `State` extractor.

use std::sync::Arc;

use crate::circuit_breaker::CircuitBreaker;
use crate::db::Database;
use crate::orchestrator::{BatchCreateOrchestrator, BulkSubmitOrchestrator};
use crate::persistence::{OrderRepository, ReferenceRepository};
use crate::pool_monitor::PoolMonitor;

#[derive(Clone)]
pub struct AppState {
    pub bulk_submit: Arc<BulkSubmitOrchestrator>,
    pub batch_create: Arc<BatchCreateOrchestrator>,
    pub breaker: Arc<CircuitBreaker>,
    pub pool_monitor: Arc<PoolMonitor>,
    /// Minimal reference/order CRUD (§4.9): runs straight against the
    /// pool, outside the gate/breaker since it is not on the
    /// bulk-submission hot path.
    pub orders: Arc<OrderRepository>,
    pub reference_admin: Arc<ReferenceRepository>,
    pub db: Arc<Database>,
}
