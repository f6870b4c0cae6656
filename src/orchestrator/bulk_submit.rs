//! Bulk submission orchestrator (§4.6): validate, reserve, call the
//! downstream trade service, reconcile, persist — sequential inside a
//! single request and never holding a gate permit across the network call
//! (§5's structural invariant).

use std::collections::HashMap;
use std::sync::Arc;

use crate::circuit_breaker::{Admission, CircuitBreaker};
use crate::config::{ReconcileSettings, RetryAfterSettings, SubmitSettings};
use crate::error::ServiceError;
use crate::gate::ConcurrencyGate;
use crate::models::{AggregateResult, ItemOutcome, ItemResult, Order};
use crate::persistence::{OrderRepository, ReservationRepository};
use crate::pool_monitor::PoolMonitor;
use crate::trade_client::{Submission, TradeClientError, TradeService};

/// Carries the distinction §6 needs at the HTTP boundary: oversize batches
/// map to 413, everything else to the uniform error body.
pub enum SubmitError {
    TooLarge { max: usize },
    Service(ServiceError),
}

impl From<ServiceError> for SubmitError {
    fn from(err: ServiceError) -> Self {
        Self::Service(err)
    }
}

impl From<sqlx::Error> for SubmitError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::from(err).into()
    }
}

pub struct BulkSubmitOrchestrator {
    gate: Arc<ConcurrencyGate>,
    breaker: Arc<CircuitBreaker>,
    pool_monitor: Arc<PoolMonitor>,
    orders: Arc<OrderRepository>,
    reservations: Arc<ReservationRepository>,
    trade_client: Arc<dyn TradeService>,
    submit: SubmitSettings,
    reconcile: ReconcileSettings,
    retry_after: RetryAfterSettings,
}

impl BulkSubmitOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gate: Arc<ConcurrencyGate>,
        breaker: Arc<CircuitBreaker>,
        pool_monitor: Arc<PoolMonitor>,
        orders: Arc<OrderRepository>,
        reservations: Arc<ReservationRepository>,
        trade_client: Arc<dyn TradeService>,
        submit: SubmitSettings,
        reconcile: ReconcileSettings,
        retry_after: RetryAfterSettings,
    ) -> Self {
        Self {
            gate,
            breaker,
            pool_monitor,
            orders,
            reservations,
            trade_client,
            submit,
            reconcile,
            retry_after,
        }
    }

    fn retry_after_secs(&self) -> u64 {
        let utilization = self.pool_monitor.latest().utilization;
        crate::circuit_breaker::retry_after_seconds(
            utilization,
            self.retry_after.base_seconds,
            self.retry_after.max_seconds,
        )
    }

    pub async fn submit(&self, order_ids: Vec<i64>) -> Result<AggregateResult, SubmitError> {
        if order_ids.is_empty() {
            return Err(ServiceError::validation("orderIds must not be empty").into());
        }
        if order_ids.len() > self.submit.batch.max {
            return Err(SubmitError::TooLarge {
                max: self.submit.batch.max,
            });
        }

        // Step 1: admission.
        match self.breaker.admit(self.pool_monitor.latest()) {
            Admission::Reject { retry_after_secs } => {
                return Err(ServiceError::overloaded(
                    "circuit breaker is open",
                    retry_after_secs,
                )
                .with_tag("reason", "breaker_open")
                .into());
            }
            Admission::Admit => {}
        }

        // From here on the breaker has admitted this batch — in Half-Open
        // that means a probe is in flight, and it must be resolved with
        // exactly one of record_success/record_failure on every exit path
        // below, or the breaker wedges rejecting all traffic forever. A
        // clean completion with no downstream call (nothing eligible,
        // nothing reserved) still counts as a healthy probe; only a
        // retryable outcome (gate/pool saturation, downstream transient
        // failure) counts as a probe failure.
        let result = self.process(order_ids).await;
        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(SubmitError::TooLarge { .. }) => {}
            Err(SubmitError::Service(err)) => {
                if err.code.retryable() {
                    self.breaker.record_failure();
                } else {
                    self.breaker.record_success();
                }
            }
        }
        result
    }

    async fn process(&self, order_ids: Vec<i64>) -> Result<AggregateResult, SubmitError> {
        // Step 2: load & validate, permit held only across the query.
        let unique_ids: Vec<i64> = {
            let mut ids = order_ids.clone();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        let loaded = {
            let _permit = self.acquire_permit().await?;
            self.orders.load_many(&unique_ids).await?
        };
        let by_id: HashMap<i64, Order> =
            loaded.into_iter().map(|o| (o.order_id, o)).collect();

        let mut item_results: Vec<Option<ItemResult>> = vec![None; order_ids.len()];
        let mut eligible_indices = Vec::new();
        for (idx, &order_id) in order_ids.iter().enumerate() {
            match by_id.get(&order_id) {
                None => {
                    item_results[idx] = Some(failure(Some(order_id), idx, "Order not found"));
                }
                Some(order) if !order.is_eligible_for_submission() => {
                    item_results[idx] = Some(failure(
                        Some(order_id),
                        idx,
                        format!("order is not eligible for submission (status {})", order.status_code),
                    ));
                }
                Some(_) => eligible_indices.push(idx),
            }
        }

        if eligible_indices.is_empty() {
            return Ok(finish(item_results));
        }

        // Step 3: reserve, permit held only across the updates.
        let mut reserved_indices = Vec::new();
        {
            let _permit = self.acquire_permit().await?;
            for &idx in &eligible_indices {
                let order_id = order_ids[idx];
                match self.reservations.reserve(order_id).await {
                    Ok(true) => reserved_indices.push(idx),
                    Ok(false) => {
                        item_results[idx] = Some(failure(
                            Some(order_id),
                            idx,
                            "order already has a submission in progress or is terminal",
                        ));
                    }
                    Err(err) => {
                        item_results[idx] =
                            Some(failure(Some(order_id), idx, format!("storage error: {err}")));
                    }
                }
            }
        }

        if reserved_indices.is_empty() {
            return Ok(finish(item_results));
        }

        // Step 4: build the downstream request in original-index order.
        let submissions: Vec<Submission> = reserved_indices
            .iter()
            .map(|&idx| {
                let order = &by_id[&order_ids[idx]];
                Submission {
                    order_id: order.order_id,
                    quantity: order.quantity,
                    limit_price: order.limit_price,
                    security_id: order.security_id.clone(),
                    portfolio_id: order.portfolio_id.clone(),
                    order_type_code: order.order_type_code.clone(),
                }
            })
            .collect();

        // Step 5: the bulk call itself holds no permit.
        let bulk_response = self.trade_client.bulk_submit(&submissions).await;

        let response = match bulk_response {
            Ok(response) => response,
            Err(TradeClientError::Transient(msg)) => {
                self.release_all(&reserved_indices, &order_ids).await;
                return Err(ServiceError::dependency_failure(
                    format!("downstream call failed: {msg}"),
                    self.retry_after_secs(),
                )
                .with_tag("reason", "downstream_transient")
                .into());
            }
            Err(TradeClientError::ClientMapping(msg)) => {
                self.release_all(&reserved_indices, &order_ids).await;
                return Err(ServiceError::runtime(format!(
                    "trade service rejected our bulk request: {msg}"
                ))
                .into());
            }
        };

        // Step 6: reconcile, permit held only across the writes.
        let results_by_order: HashMap<i64, crate::trade_client::SubmissionResult> = response
            .results
            .into_iter()
            .map(|r| (r.order_id, r))
            .collect();

        {
            let _permit = self.acquire_permit().await?;
            for chunk in reserved_indices.chunks(self.reconcile.chunk.size.max(1)) {
                for &idx in chunk {
                    let order_id = order_ids[idx];
                    item_results[idx] = Some(
                        self.reconcile_one(order_id, idx, results_by_order.get(&order_id))
                            .await,
                    );
                }
            }
        }

        Ok(finish(item_results))
    }

    async fn reconcile_one(
        &self,
        order_id: i64,
        idx: usize,
        result: Option<&crate::trade_client::SubmissionResult>,
    ) -> ItemResult {
        match result.and_then(|r| r.trade_order_id) {
            Some(trade_order_id) => match self.reservations.commit(order_id, trade_order_id).await
            {
                Ok(true) => ItemResult {
                    order_id: Some(order_id),
                    status: ItemOutcome::Success,
                    message: "submitted".to_string(),
                    trade_order_id: Some(trade_order_id),
                    request_index: idx,
                },
                Ok(false) => {
                    tracing::error!(
                        order_id,
                        trade_order_id,
                        "commit-after-success inconsistency: reservation sentinel missing"
                    );
                    failure(
                        Some(order_id),
                        idx,
                        "order was submitted downstream but could not be committed locally; requires reconciliation",
                    )
                }
                Err(err) => failure(Some(order_id), idx, format!("storage error: {err}")),
            },
            None => {
                let message = result
                    .and_then(|r| r.message.clone())
                    .unwrap_or_else(|| "rejected by trade service".to_string());
                if let Ok(false) = self.reservations.release(order_id).await {
                    tracing::info!(order_id, "release found reservation already repaired");
                }
                failure(Some(order_id), idx, message)
            }
        }
    }

    async fn release_all(&self, reserved_indices: &[usize], order_ids: &[i64]) {
        let _permit = match self.acquire_permit().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::error!("failed to acquire gate permit to release reservations after downstream failure");
                return;
            }
        };
        for chunk in reserved_indices.chunks(self.reconcile.chunk.size.max(1)) {
            for &idx in chunk {
                let order_id = order_ids[idx];
                match self.reservations.release(order_id).await {
                    Ok(false) => tracing::info!(
                        order_id,
                        "release after downstream failure found reservation already repaired"
                    ),
                    Err(err) => {
                        tracing::error!(order_id, %err, "failed to release reservation after downstream failure")
                    }
                    Ok(true) => {}
                }
            }
        }
    }

    async fn acquire_permit(&self) -> Result<crate::gate::GatePermit<'_>, ServiceError> {
        self.gate.acquire().await.map_err(|_| {
            ServiceError::overloaded("concurrency gate exhausted", self.retry_after_secs())
                .with_tag("reason", "gate_timeout")
        })
    }
}

fn failure(order_id: Option<i64>, idx: usize, message: impl Into<String>) -> ItemResult {
    ItemResult {
        order_id,
        status: ItemOutcome::Failure,
        message: message.into(),
        trade_order_id: None,
        request_index: idx,
    }
}

fn finish(item_results: Vec<Option<ItemResult>>) -> AggregateResult {
    let results: Vec<ItemResult> = item_results
        .into_iter()
        .enumerate()
        .map(|(idx, result)| {
            result.unwrap_or_else(|| failure(None, idx, "order was not processed"))
        })
        .collect();
    AggregateResult::from_results(results, "bulk submission processed")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(idx: usize, order_id: i64) -> ItemResult {
        ItemResult {
            order_id: Some(order_id),
            status: ItemOutcome::Success,
            message: "submitted".to_string(),
            trade_order_id: Some(order_id + 1000),
            request_index: idx,
        }
    }

    /// Testable property 2: successful + failed counts sum to the request
    /// length, regardless of the mix of outcomes.
    #[test]
    fn finish_counts_sum_to_total_requested() {
        let results = vec![Some(success(0, 1)), None, Some(failure(Some(3), 2, "no"))];
        let aggregate = finish(results);
        assert_eq!(aggregate.total_requested, 3);
        assert_eq!(aggregate.successful + aggregate.failed, 3);
        assert_eq!(aggregate.successful, 1);
    }

    /// Testable property 3: request_index values are a permutation of
    /// 0..n-1, regardless of which slots were filled during processing.
    #[test]
    fn finish_preserves_input_order_as_index_permutation() {
        let results = vec![
            Some(success(0, 10)),
            None,
            Some(success(2, 12)),
            Some(failure(Some(13), 3, "nope")),
        ];
        let aggregate = finish(results);
        let indices: Vec<usize> = aggregate.results.iter().map(|r| r.request_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    /// An unfilled slot (an index the orchestrator never reached) still
    /// surfaces as a failure rather than being silently dropped.
    #[test]
    fn finish_fills_unprocessed_slots_as_failures() {
        let aggregate = finish(vec![None]);
        assert_eq!(aggregate.results.len(), 1);
        assert_eq!(aggregate.results[0].status, ItemOutcome::Failure);
    }
}
