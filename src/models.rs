//! Core domain types: orders, reference rows, and the shapes shared between
//! the orchestrators and the HTTP gateway.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle position of an order. Only `New` is eligible for submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderLifecycle {
    New,
    Sent,
    Filled,
    Partial,
    Cancelled,
}

impl OrderLifecycle {
    pub fn code(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Sent => "SENT",
            Self::Filled => "FILLED",
            Self::Partial => "PARTIAL",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "NEW" => Some(Self::New),
            "SENT" => Some(Self::Sent),
            "FILLED" => Some(Self::Filled),
            "PARTIAL" => Some(Self::Partial),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A reference-data row: status, order-type, or blotter.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub status_id: i32,
    pub code: String,
    pub description: String,
    pub version: i32,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderType {
    pub order_type_id: i32,
    pub code: String,
    pub description: String,
    pub version: i32,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Blotter {
    pub blotter_id: i32,
    pub name: String,
    pub version: i32,
}

/// A persisted order row, eagerly joined with its status/type/blotter codes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: i64,
    pub blotter_id: Option<i32>,
    pub status_id: i32,
    pub status_code: String,
    pub portfolio_id: String,
    pub order_type_id: i32,
    pub order_type_code: String,
    pub security_id: String,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub trade_order_id: Option<i64>,
    pub order_timestamp: DateTime<Utc>,
    pub version: i32,
}

impl Order {
    /// Only `NEW` orders with no trade-order id attached may be reserved.
    pub fn is_eligible_for_submission(&self) -> bool {
        self.status_code == OrderLifecycle::New.code() && self.trade_order_id.is_none()
    }
}

/// Caller-supplied draft used by the batch-create orchestrator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub blotter_id: Option<i32>,
    pub portfolio_id: String,
    pub order_type_id: i32,
    pub security_id: String,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
}

/// Body of `PUT /orders/{id}` (§4.9): the same mutable fields as a draft,
/// plus the `version` the caller last observed, for optimistic concurrency.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub blotter_id: Option<i32>,
    pub portfolio_id: String,
    pub order_type_id: i32,
    pub security_id: String,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub version: i32,
}

/// Body of `DELETE /orders/{id}` and the reference-row delete endpoints:
/// version-checked so a stale delete reports conflict instead of silently
/// removing a row the caller no longer believes exists in that form.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionedDelete {
    pub version: i32,
}

/// Create/update body for `Status` and `OrderType` rows, which share the
/// same code/description/version shape.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeDraft {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeUpdate {
    pub code: String,
    pub description: String,
    pub version: i32,
}

/// Create/update body for `Blotter` rows (name only, no code/description).
#[derive(Debug, Clone, Deserialize)]
pub struct BlotterDraft {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlotterUpdate {
    pub name: String,
    pub version: i32,
}

/// Outcome of a version-checked mutation against a single row.
pub enum MutationOutcome<T> {
    Ok(T),
    NotFound,
    Conflict,
}

/// Outcome of persisting a single draft or submitting a single order id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemOutcome {
    Success,
    Failure,
}

/// One row of a bulk response, carrying the caller's original request index.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub order_id: Option<i64>,
    pub status: ItemOutcome,
    pub message: String,
    pub trade_order_id: Option<i64>,
    pub request_index: usize,
}

/// Aggregate status mixed from the per-item outcomes of a batch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateStatus {
    Success,
    Partial,
    Failure,
}

impl AggregateStatus {
    /// Derives the aggregate from success/failure counts, per the
    /// SUCCESS/PARTIAL/FAILURE mixing rule used by both orchestrators.
    pub fn from_counts(successful: usize, failed: usize) -> Self {
        if failed == 0 {
            Self::Success
        } else if successful == 0 {
            Self::Failure
        } else {
            Self::Partial
        }
    }
}

/// Response body shared by bulk submit and batch create.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub status: AggregateStatus,
    pub message: String,
    pub total_requested: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<ItemResult>,
}

impl AggregateResult {
    pub fn from_results(results: Vec<ItemResult>, message: impl Into<String>) -> Self {
        let successful = results
            .iter()
            .filter(|r| r.status == ItemOutcome::Success)
            .count();
        let failed = results.len() - successful;
        Self {
            status: AggregateStatus::from_counts(successful, failed),
            message: message.into(),
            total_requested: results.len(),
            successful,
            failed,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_round_trips_through_code() {
        for stage in [
            OrderLifecycle::New,
            OrderLifecycle::Sent,
            OrderLifecycle::Filled,
            OrderLifecycle::Partial,
            OrderLifecycle::Cancelled,
        ] {
            assert_eq!(OrderLifecycle::from_code(stage.code()), Some(stage));
        }
    }

    #[test]
    fn aggregate_status_all_success() {
        assert_eq!(AggregateStatus::from_counts(3, 0), AggregateStatus::Success);
    }

    #[test]
    fn aggregate_status_mixed_is_partial() {
        assert_eq!(AggregateStatus::from_counts(2, 1), AggregateStatus::Partial);
    }

    #[test]
    fn aggregate_status_all_failed() {
        assert_eq!(AggregateStatus::from_counts(0, 3), AggregateStatus::Failure);
    }

    #[test]
    fn eligible_order_requires_new_status_and_no_trade_order_id() {
        let order = Order {
            order_id: 1,
            blotter_id: None,
            status_id: 1,
            status_code: "NEW".to_string(),
            portfolio_id: "PORT-1".to_string(),
            order_type_id: 1,
            order_type_code: "MARKET".to_string(),
            security_id: "AAPL".to_string(),
            quantity: Decimal::new(100, 0),
            limit_price: None,
            trade_order_id: None,
            order_timestamp: Utc::now(),
            version: 1,
        };
        assert!(order.is_eligible_for_submission());

        let mut sent = order.clone();
        sent.status_code = "SENT".to_string();
        sent.trade_order_id = Some(555);
        assert!(!sent.is_eligible_for_submission());
    }
}
