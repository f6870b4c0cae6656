//! HTTP client to the downstream trade service's bulk endpoint (§4.5). A
//! pooled transport with bounded connection reuse, per-call timeouts, and
//! structured error mapping. No retries: the orchestrator is the sole
//! retry decision point, and the default bulk-submission policy is zero
//! retries to avoid duplicating a partially succeeded batch.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::TradeServiceSettings;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub order_id: i64,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub security_id: String,
    pub portfolio_id: String,
    pub order_type_code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub order_id: i64,
    pub trade_order_id: Option<i64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkStatus {
    AllOk,
    Partial,
    AllFailed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkSubmitResponse {
    pub status: BulkStatus,
    pub results: Vec<SubmissionResult>,
}

#[derive(Debug, Serialize)]
struct BulkSubmitRequest<'a> {
    submissions: &'a [Submission],
}

/// Whether a failure should be retried by the orchestrator and count
/// toward the circuit breaker's failure budget (§4.5's status mapping).
#[derive(Debug)]
pub enum TradeClientError {
    /// 400 from downstream: our request was malformed. Non-retryable.
    ClientMapping(String),
    /// 5xx or a network-level failure. Retryable, counts toward the breaker.
    Transient(String),
}

impl std::fmt::Display for TradeClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientMapping(msg) => write!(f, "trade service rejected request: {msg}"),
            Self::Transient(msg) => write!(f, "trade service transient failure: {msg}"),
        }
    }
}

impl std::error::Error for TradeClientError {}

/// Behind a trait, per the chain-adapter convention this codebase already
/// uses for its own out-of-process collaborators (§4.5, §4.13): the
/// orchestrator depends on this trait rather than on `TradeServiceClient`
/// directly, so a deterministic in-memory stub can stand in for the real
/// downstream service in unit tests.
#[async_trait]
pub trait TradeService: Send + Sync {
    async fn bulk_submit(
        &self,
        submissions: &[Submission],
    ) -> Result<BulkSubmitResponse, TradeClientError>;
}

pub struct TradeServiceClient {
    http: reqwest::Client,
    base_url: String,
    total_timeout: Duration,
}

impl TradeServiceClient {
    pub fn new(settings: &TradeServiceSettings) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(settings.timeout_connect_ms))
            .timeout(Duration::from_millis(settings.timeout_total_ms))
            .pool_max_idle_per_host(settings.max_connections)
            .build()?;
        Ok(Self {
            http,
            base_url: settings.url.clone(),
            total_timeout: Duration::from_millis(settings.timeout_total_ms),
        })
    }
}

#[async_trait]
impl TradeService for TradeServiceClient {
    /// `submissions` is request-ordered; the response preserves that order.
    /// Maps downstream HTTP status to a result per §4.5: 201 success parse,
    /// 200/207 partial parse, 400 non-retryable client mapping error, 5xx
    /// and network errors a retryable transient error.
    async fn bulk_submit(
        &self,
        submissions: &[Submission],
    ) -> Result<BulkSubmitResponse, TradeClientError> {
        let url = format!("{}/tradeOrders/bulk", self.base_url);
        let body = BulkSubmitRequest { submissions };

        let response = tokio::time::timeout(
            self.total_timeout,
            self.http.post(&url).json(&body).send(),
        )
        .await
        .map_err(|_| TradeClientError::Transient("bulk call exceeded total deadline".into()))?
        .map_err(|err| TradeClientError::Transient(err.to_string()))?;

        let status = response.status();
        if status.as_u16() == 400 {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(downstream_status = 400, body = %body, "trade service rejected bulk request");
            return Err(TradeClientError::ClientMapping(body));
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(downstream_status = %status, body = %body, "trade service returned server error");
            return Err(TradeClientError::Transient(format!(
                "downstream status {status}"
            )));
        }
        if !(status.as_u16() == 201 || status.as_u16() == 200 || status.as_u16() == 207) {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(downstream_status = %status, body = %body, "trade service returned unexpected status");
            return Err(TradeClientError::Transient(format!(
                "unexpected downstream status {status}"
            )));
        }

        response
            .json::<BulkSubmitResponse>()
            .await
            .map_err(|err| TradeClientError::Transient(format!("malformed response body: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(url: String) -> TradeServiceSettings {
        TradeServiceSettings {
            url,
            timeout_connect_ms: 2_000,
            timeout_total_ms: 5_000,
            max_connections: 4,
        }
    }

    fn submission(order_id: i64) -> Submission {
        Submission {
            order_id,
            quantity: Decimal::new(100, 0),
            limit_price: None,
            security_id: "AAPL".to_string(),
            portfolio_id: "PORT-1".to_string(),
            order_type_code: "MARKET".to_string(),
        }
    }

    #[tokio::test]
    async fn success_response_parses_as_all_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tradeOrders/bulk"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "status": "ALL_OK",
                "results": [{"orderId": 1, "tradeOrderId": 9001, "message": null}]
            })))
            .mount(&server)
            .await;

        let client = TradeServiceClient::new(&settings(server.uri())).unwrap();
        let response = client.bulk_submit(&[submission(1)]).await.unwrap();
        assert_eq!(response.status, BulkStatus::AllOk);
        assert_eq!(response.results[0].trade_order_id, Some(9001));
    }

    #[tokio::test]
    async fn client_error_maps_to_non_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tradeOrders/bulk"))
            .respond_with(ResponseTemplate::new(400).set_body_string("malformed submission"))
            .mount(&server)
            .await;

        let client = TradeServiceClient::new(&settings(server.uri())).unwrap();
        let err = client.bulk_submit(&[submission(1)]).await.unwrap_err();
        assert!(matches!(err, TradeClientError::ClientMapping(_)));
    }

    #[tokio::test]
    async fn server_error_maps_to_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tradeOrders/bulk"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = TradeServiceClient::new(&settings(server.uri())).unwrap();
        let err = client.bulk_submit(&[submission(1)]).await.unwrap_err();
        assert!(matches!(err, TradeClientError::Transient(_)));
    }

    #[tokio::test]
    async fn partial_status_parses_successfully() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tradeOrders/bulk"))
            .respond_with(ResponseTemplate::new(207).set_body_json(serde_json::json!({
                "status": "PARTIAL",
                "results": [
                    {"orderId": 1, "tradeOrderId": 9001, "message": null},
                    {"orderId": 2, "tradeOrderId": null, "message": "rejected"}
                ]
            })))
            .mount(&server)
            .await;

        let client = TradeServiceClient::new(&settings(server.uri())).unwrap();
        let response = client
            .bulk_submit(&[submission(1), submission(2)])
            .await
            .unwrap();
        assert_eq!(response.status, BulkStatus::Partial);
        assert_eq!(response.results.len(), 2);
    }
}
