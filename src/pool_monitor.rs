//! Periodic sampler of the database pool's active/idle/waiting counters
//! (§4.3). Publishes a snapshot the circuit breaker consults on demand;
//! never mutates state itself.

use crate::db::Database;
use crate::gate::ConcurrencyGate;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const WARN_UTILIZATION: f64 = 0.75;
const CRITICAL_UTILIZATION: f64 = 0.90;

#[derive(Debug, Clone, Copy)]
pub struct PoolSnapshot {
    pub active: u32,
    pub idle: u32,
    pub waiting: usize,
    pub total: u32,
    pub utilization: f64,
}

impl PoolSnapshot {
    pub fn is_critical(&self) -> bool {
        self.utilization >= CRITICAL_UTILIZATION || self.waiting >= 1
    }

    pub fn is_warning(&self) -> bool {
        self.utilization >= WARN_UTILIZATION
    }
}

/// Stores the most recent sample as bits so the breaker can read it without
/// awaiting a fresh sample on every admission check.
pub struct PoolMonitor {
    db: Arc<Database>,
    gate: Arc<ConcurrencyGate>,
    latest_bits: AtomicU64,
}

fn encode(snapshot: PoolSnapshot) -> u64 {
    let active = snapshot.active as u64;
    let idle = snapshot.idle as u64;
    let waiting = (snapshot.waiting.min(0xFFFF)) as u64;
    (active << 48) | (idle << 32) | (waiting << 16) | (snapshot.total as u64)
}

fn decode(bits: u64) -> PoolSnapshot {
    let active = (bits >> 48) as u32;
    let idle = ((bits >> 32) & 0xFFFF) as u32;
    let waiting = ((bits >> 16) & 0xFFFF) as usize;
    let total = (bits & 0xFFFF) as u32;
    let utilization = if total == 0 {
        0.0
    } else {
        active as f64 / total as f64
    };
    PoolSnapshot {
        active,
        idle,
        waiting,
        total,
        utilization,
    }
}

impl PoolMonitor {
    pub fn new(db: Arc<Database>, gate: Arc<ConcurrencyGate>) -> Arc<Self> {
        let monitor = Arc::new(Self {
            db,
            gate,
            latest_bits: AtomicU64::new(0),
        });
        monitor.refresh();
        monitor
    }

    fn refresh(&self) -> PoolSnapshot {
        let total = self.db.size();
        let idle = self.db.num_idle() as u32;
        let active = total.saturating_sub(idle);
        let waiting = self.gate.waiting();
        let utilization = if total == 0 {
            0.0
        } else {
            active as f64 / total as f64
        };
        let snapshot = PoolSnapshot {
            active,
            idle,
            waiting,
            total,
            utilization,
        };
        self.latest_bits.store(encode(snapshot), Ordering::Relaxed);
        snapshot
    }

    pub fn latest(&self) -> PoolSnapshot {
        decode(self.latest_bits.load(Ordering::Relaxed))
    }

    /// Samples on a fixed 5s cadence and logs warning/critical events.
    /// Spawned once at startup; runs for the lifetime of the process.
    pub async fn run(self: Arc<Self>, cadence: Duration) {
        let mut ticker = tokio::time::interval(cadence);
        loop {
            ticker.tick().await;
            let snapshot = self.refresh();
            if snapshot.is_critical() {
                tracing::error!(
                    active = snapshot.active,
                    total = snapshot.total,
                    waiting = snapshot.waiting,
                    utilization = snapshot.utilization,
                    "database pool at critical utilization"
                );
            } else if snapshot.is_warning() {
                tracing::warn!(
                    active = snapshot.active,
                    total = snapshot.total,
                    utilization = snapshot.utilization,
                    "database pool approaching saturation"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_critical_at_ninety_percent() {
        let snapshot = PoolSnapshot {
            active: 18,
            idle: 2,
            waiting: 0,
            total: 20,
            utilization: 0.9,
        };
        assert!(snapshot.is_critical());
    }

    #[test]
    fn snapshot_critical_when_any_waiting() {
        let snapshot = PoolSnapshot {
            active: 5,
            idle: 15,
            waiting: 1,
            total: 20,
            utilization: 0.25,
        };
        assert!(snapshot.is_critical());
    }

    #[test]
    fn snapshot_warning_below_critical() {
        let snapshot = PoolSnapshot {
            active: 16,
            idle: 4,
            waiting: 0,
            total: 20,
            utilization: 0.8,
        };
        assert!(snapshot.is_warning());
        assert!(!snapshot.is_critical());
    }

    #[test]
    fn encode_decode_round_trip() {
        let snapshot = PoolSnapshot {
            active: 7,
            idle: 13,
            waiting: 3,
            total: 20,
            utilization: 0.35,
        };
        let decoded = decode(encode(snapshot));
        assert_eq!(decoded.active, 7);
        assert_eq!(decoded.idle, 13);
        assert_eq!(decoded.waiting, 3);
        assert_eq!(decoded.total, 20);
    }
}
