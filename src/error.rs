//! Stable error taxonomy and the uniform JSON error body.
//!
//! Generalizes the auth module's code/name/http-status pattern
//! (see `api_auth::error`) from a single domain to the whole service.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// The six stable codes every caller-facing failure maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    Conflict,
    ServiceOverloaded,
    DependencyFailure,
    RuntimeError,
}

impl ErrorCode {
    pub fn name(self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::ServiceOverloaded => "SERVICE_OVERLOADED",
            Self::DependencyFailure => "DEPENDENCY_FAILURE",
            Self::RuntimeError => "RUNTIME_ERROR",
        }
    }

    pub fn http_status(self) -> StatusCode {
        match self {
            Self::ValidationError => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::ServiceOverloaded => StatusCode::SERVICE_UNAVAILABLE,
            Self::DependencyFailure => StatusCode::SERVICE_UNAVAILABLE,
            Self::RuntimeError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn retryable(self) -> bool {
        matches!(self, Self::ServiceOverloaded | Self::DependencyFailure)
    }

    pub fn severity(self) -> &'static str {
        match self {
            Self::ValidationError | Self::NotFound | Self::Conflict => "client",
            _ => "server",
        }
    }
}

/// Domain error carrying everything the classifier (§4.8) requires:
/// a stable code, a human message, an optional retry-after, and
/// contextual tags for the response body and log line.
#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
    pub retry_after_secs: Option<u64>,
    pub tags: Map<String, Value>,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after_secs: None,
            tags: Map::new(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn overloaded(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self {
            retry_after_secs: Some(retry_after_secs),
            ..Self::new(ErrorCode::ServiceOverloaded, message)
        }
    }

    pub fn dependency_failure(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self {
            retry_after_secs: Some(retry_after_secs),
            ..Self::new(ErrorCode::DependencyFailure, message)
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RuntimeError, message)
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => {
                Self::overloaded("database pool exhausted", 60).with_tag("reason", "pool_timeout")
            }
            _ => Self::runtime(format!("storage error: {err}")),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(rename = "retryAfter")]
    retry_after: Option<u64>,
    timestamp: String,
    details: Map<String, Value>,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.code.http_status();
        let mut details = self.tags;
        if status.is_server_error() {
            let correlation_id = Uuid::new_v4().to_string();
            tracing::error!(
                correlation_id = %correlation_id,
                code = self.code.name(),
                "{}",
                self.message
            );
            details.insert(
                "correlationId".to_string(),
                Value::String(correlation_id),
            );
        }
        let retry_after_secs = self.retry_after_secs;
        let body = ErrorBody {
            code: self.code.name(),
            message: self.message,
            retry_after: retry_after_secs,
            timestamp: Utc::now().to_rfc3339(),
            details,
        };
        let mut response = (status, Json(body)).into_response();
        // §4.4: overload responses carry retryAfter in both body and header.
        if let Some(secs) = retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overload_is_retryable_and_carries_retry_after() {
        let err = ServiceError::overloaded("breaker open", 90);
        assert!(err.code.retryable());
        assert_eq!(err.retry_after_secs, Some(90));
        assert_eq!(err.code.http_status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn validation_is_client_non_retryable() {
        let err = ServiceError::validation("bad input");
        assert_eq!(err.code.severity(), "client");
        assert!(!err.code.retryable());
        assert_eq!(err.code.http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn pool_timeout_classifies_as_overload() {
        let err: ServiceError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.code, ErrorCode::ServiceOverloaded);
    }

    #[test]
    fn dependency_failure_is_retryable_and_carries_retry_after() {
        let err = ServiceError::dependency_failure("downstream call failed", 120);
        assert_eq!(err.code, ErrorCode::DependencyFailure);
        assert!(err.code.retryable());
        assert_eq!(err.retry_after_secs, Some(120));
        assert_eq!(err.code.http_status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn overload_response_sets_retry_after_header() {
        let response = ServiceError::overloaded("breaker open", 90).into_response();
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "90");
    }

    #[test]
    fn validation_response_has_no_retry_after_header() {
        let response = ServiceError::validation("bad input").into_response();
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }
}
