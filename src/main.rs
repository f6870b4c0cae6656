use std::sync::Arc;
use std::time::Duration;

use order_submission_service::circuit_breaker::CircuitBreaker;
use order_submission_service::config::Settings;
use order_submission_service::db::Database;
use order_submission_service::gate::ConcurrencyGate;
use order_submission_service::gateway::{self, AppState};
use order_submission_service::logging;
use order_submission_service::orchestrator::{BatchCreateOrchestrator, BulkSubmitOrchestrator};
use order_submission_service::persistence::{
    OrderRepository, ReferenceCache, ReferenceRepository, ReservationRepository,
};
use order_submission_service::pool_monitor::PoolMonitor;
use order_submission_service::trade_client::{TradeService, TradeServiceClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let _log_guard = logging::init_logging(&settings.log);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        "starting order-submission-service"
    );

    let db = Arc::new(Database::connect(&settings.datasource, &settings.pool).await?);
    db.migrate().await?;

    let gate = ConcurrencyGate::new(
        settings.gate.permits,
        Duration::from_millis(settings.gate.acquire_timeout_ms),
    );
    let reference = Arc::new(ReferenceCache::new(db.pool().clone()));
    let orders = Arc::new(OrderRepository::new(db.pool().clone()));
    let reference_admin = Arc::new(ReferenceRepository::new(db.pool().clone()));
    let reservations = Arc::new(ReservationRepository::new(
        db.pool().clone(),
        reference.clone(),
    ));
    let trade_client: Arc<dyn TradeService> = Arc::new(TradeServiceClient::new(&settings.trade_service)?);
    let breaker = Arc::new(CircuitBreaker::new(
        settings.breaker.clone(),
        settings.retry_after.clone(),
    ));
    let pool_monitor = PoolMonitor::new(db.clone(), gate.clone());

    tokio::spawn({
        let pool_monitor = pool_monitor.clone();
        let breaker = breaker.clone();
        async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(5));
            loop {
                ticker.tick().await;
                breaker.observe_pool_sample(pool_monitor.latest());
            }
        }
    });
    tokio::spawn(pool_monitor.clone().run(Duration::from_secs(5)));

    let bulk_submit = Arc::new(BulkSubmitOrchestrator::new(
        gate.clone(),
        breaker.clone(),
        pool_monitor.clone(),
        orders.clone(),
        reservations,
        trade_client,
        settings.submit.clone(),
        settings.reconcile.clone(),
        settings.retry_after.clone(),
    ));
    let batch_create = Arc::new(BatchCreateOrchestrator::new(
        gate,
        orders.clone(),
        settings.create.clone(),
    ));

    let state = Arc::new(AppState {
        bulk_submit,
        batch_create,
        breaker,
        pool_monitor,
        orders,
        reference_admin,
        db,
    });

    gateway::run_server(&settings.server.host, settings.server.port, state).await?;
    Ok(())
}
