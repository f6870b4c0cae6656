//! Layered configuration: built-in defaults, an optional config file, then
//! environment variables (`APP__SECTION__KEY`), resolved once at startup
//! into a typed [`Settings`]. Mirrors every dotted-path option this service
//! recognizes.

use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceSettings {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolSettings {
    pub size: PoolSizeSettings,
    pub timeout: PoolTimeoutSettings,
    #[serde(rename = "leak-detect-ms")]
    pub leak_detect_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolSizeSettings {
    pub max: u32,
    #[serde(rename = "min-idle")]
    pub min_idle: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolTimeoutSettings {
    #[serde(rename = "connection-ms")]
    pub connection_ms: u64,
    #[serde(rename = "idle-ms")]
    pub idle_ms: u64,
    #[serde(rename = "max-lifetime-ms")]
    pub max_lifetime_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateSettings {
    pub permits: usize,
    #[serde(rename = "acquire-timeout-ms")]
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakerSettings {
    pub enabled: bool,
    #[serde(rename = "util-threshold")]
    pub util_threshold: f64,
    #[serde(rename = "consecutive-samples")]
    pub consecutive_samples: u32,
    #[serde(rename = "failure-threshold")]
    pub failure_threshold: u32,
    #[serde(rename = "open-duration-ms")]
    pub open_duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeServiceSettings {
    pub url: String,
    #[serde(rename = "timeout-connect-ms")]
    pub timeout_connect_ms: u64,
    #[serde(rename = "timeout-total-ms")]
    pub timeout_total_ms: u64,
    #[serde(rename = "max-connections")]
    pub max_connections: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitSettings {
    pub batch: BatchMaxSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSettings {
    pub batch: BatchMaxSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchMaxSettings {
    pub max: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileSettings {
    pub chunk: ChunkSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkSettings {
    pub size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryAfterSettings {
    #[serde(rename = "base-seconds")]
    pub base_seconds: u64,
    #[serde(rename = "max-seconds")]
    pub max_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub level: String,
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_log_file")]
    pub file: String,
    #[serde(default)]
    pub json: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_file() -> String {
    "order-submission-service.log".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

/// Everything §6's enumerated configuration list names, resolved once at
/// startup. Reservation/gate/breaker parameters are fixed for the process's
/// lifetime (§5) and are not subject to hot reload.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub datasource: DataSourceSettings,
    pub pool: PoolSettings,
    pub gate: GateSettings,
    pub breaker: BreakerSettings,
    #[serde(rename = "tradeService")]
    pub trade_service: TradeServiceSettings,
    pub submit: SubmitSettings,
    pub create: CreateSettings,
    pub reconcile: ReconcileSettings,
    #[serde(rename = "retryAfter")]
    pub retry_after: RetryAfterSettings,
    pub server: ServerSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Loads defaults, then `config/{file}.yaml` if present, then `APP__`
    /// prefixed environment overrides (double underscore = nesting) — the
    /// same precedence order this codebase's configuration tooling already
    /// applies elsewhere.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_file =
            std::env::var("APP_CONFIG_FILE").unwrap_or_else(|_| "config/default".to_string());

        let resolved = Config::builder()
            .add_source(File::with_name(&config_file).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        resolved.try_deserialize()
    }

    /// The concurrency gate defaults to ~0.4x the pool's max size, never
    /// exceeding pool - headroom, unless overridden explicitly.
    pub fn default_gate_permits(pool_max: u32) -> usize {
        let headroom = 2u32;
        let suggested = ((pool_max as f64) * 0.4).round() as u32;
        suggested.min(pool_max.saturating_sub(headroom)).max(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gate_permits_stays_below_pool_minus_headroom() {
        assert_eq!(Settings::default_gate_permits(20), 8);
        assert_eq!(Settings::default_gate_permits(3), 1);
    }
}
