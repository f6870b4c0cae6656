//! Order ingestion and bulk-submission service.
//!
//! Clients post batches of draft orders; the service persists them with a
//! durable lifecycle status, later bulk-submits them to a downstream trade
//! service, and reconciles per-order success/failure back to local state.
//!
//! # Modules
//!
//! - [`config`] - layered configuration (defaults, file, environment)
//! - [`models`] - order, reference-row, and aggregate-result types
//! - [`error`] - the stable error taxonomy and uniform error body
//! - [`db`] - the PostgreSQL connection pool and schema migrations
//! - [`persistence`] - order/reservation/reference-data repositories
//! - [`gate`] - the bounded concurrency gate
//! - [`pool_monitor`] - periodic database pool health sampling
//! - [`circuit_breaker`] - the saturation-aware admission gate
//! - [`trade_client`] - the downstream trade-service HTTP client
//! - [`orchestrator`] - bulk submission and batch creation
//! - [`gateway`] - the axum HTTP surface
//! - [`logging`] - structured logging setup

pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod pool_monitor;
pub mod trade_client;
