//! Batch create orchestrator (§4.7): each draft is persisted in its own
//! short transaction. One draft's failure never rolls back another, unlike
//! the bulk-submit path's all-or-nothing reservation rollback.

use std::sync::Arc;

use crate::config::CreateSettings;
use crate::error::ServiceError;
use crate::gate::ConcurrencyGate;
use crate::models::{AggregateResult, ItemOutcome, ItemResult, OrderDraft};
use crate::persistence::OrderRepository;

pub struct BatchCreateOrchestrator {
    gate: Arc<ConcurrencyGate>,
    orders: Arc<OrderRepository>,
    create: CreateSettings,
}

impl BatchCreateOrchestrator {
    pub fn new(gate: Arc<ConcurrencyGate>, orders: Arc<OrderRepository>, create: CreateSettings) -> Self {
        Self {
            gate,
            orders,
            create,
        }
    }

    pub async fn create_batch(
        &self,
        drafts: Vec<OrderDraft>,
    ) -> Result<AggregateResult, CreateError> {
        if drafts.is_empty() {
            return Err(ServiceError::validation("drafts must not be empty").into());
        }
        if drafts.len() > self.create.batch.max {
            return Err(CreateError::TooLarge {
                max: self.create.batch.max,
            });
        }

        let mut results = Vec::with_capacity(drafts.len());
        for (idx, draft) in drafts.into_iter().enumerate() {
            if let Err(msg) = validate_draft(&draft) {
                results.push(failure(idx, msg));
                continue;
            }

            let permit = self.gate.acquire().await;
            let permit = match permit {
                Ok(permit) => permit,
                Err(_) => {
                    results.push(failure(idx, "concurrency gate exhausted"));
                    continue;
                }
            };
            let created = self.orders.create(&draft).await;
            drop(permit);

            match created {
                Ok(order_id) => results.push(ItemResult {
                    order_id: Some(order_id),
                    status: ItemOutcome::Success,
                    message: "created".to_string(),
                    trade_order_id: None,
                    request_index: idx,
                }),
                Err(err) => results.push(failure(idx, format!("storage error: {err}"))),
            }
        }

        Ok(AggregateResult::from_results(
            results,
            "batch create processed",
        ))
    }
}

fn validate_draft(draft: &OrderDraft) -> Result<(), String> {
    if draft.portfolio_id.is_empty() || draft.portfolio_id.len() > 24 {
        return Err("portfolioId must be 1-24 characters".to_string());
    }
    if draft.security_id.is_empty() {
        return Err("securityId is required".to_string());
    }
    if draft.quantity.is_sign_negative() || draft.quantity.is_zero() {
        return Err("quantity must be strictly positive".to_string());
    }
    if let Some(limit_price) = draft.limit_price {
        if limit_price.is_sign_negative() || limit_price.is_zero() {
            return Err("limitPrice must be strictly positive when present".to_string());
        }
    }
    Ok(())
}

fn failure(idx: usize, message: impl Into<String>) -> ItemResult {
    ItemResult {
        order_id: None,
        status: ItemOutcome::Failure,
        message: message.into(),
        trade_order_id: None,
        request_index: idx,
    }
}

pub enum CreateError {
    TooLarge { max: usize },
    Service(ServiceError),
}

impl From<ServiceError> for CreateError {
    fn from(err: ServiceError) -> Self {
        Self::Service(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn draft() -> OrderDraft {
        OrderDraft {
            blotter_id: None,
            portfolio_id: "PORT-1".to_string(),
            order_type_id: 1,
            security_id: "AAPL".to_string(),
            quantity: Decimal::new(100, 0),
            limit_price: None,
        }
    }

    #[test]
    fn valid_draft_passes() {
        assert!(validate_draft(&draft()).is_ok());
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let mut d = draft();
        d.quantity = Decimal::ZERO;
        assert!(validate_draft(&d).is_err());
    }

    #[test]
    fn oversize_portfolio_id_is_rejected() {
        let mut d = draft();
        d.portfolio_id = "X".repeat(25);
        assert!(validate_draft(&d).is_err());
    }

    #[test]
    fn negative_limit_price_is_rejected() {
        let mut d = draft();
        d.limit_price = Some(Decimal::new(-100, 0));
        assert!(validate_draft(&d).is_err());
    }
}
