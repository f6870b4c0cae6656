pub mod admin_handlers;
pub mod handlers;
pub mod state;

use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio::net::TcpListener;

pub use state::AppState;

/// Wires §6's two in-scope endpoints plus the minimal, out-of-scope-but-
/// present reference/order CRUD fixed in §4.9.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/orders/batch/submit", post(handlers::bulk_submit))
        .route(
            "/orders",
            post(handlers::batch_create).get(admin_handlers::list_orders),
        )
        .route(
            "/orders/{order_id}",
            get(admin_handlers::get_order)
                .put(admin_handlers::update_order)
                .delete(admin_handlers::delete_order),
        )
        .route(
            "/statuses",
            get(admin_handlers::list_statuses).post(admin_handlers::create_status),
        )
        .route(
            "/statuses/{status_id}",
            get(admin_handlers::get_status)
                .put(admin_handlers::update_status)
                .delete(admin_handlers::delete_status),
        )
        .route(
            "/orderTypes",
            get(admin_handlers::list_order_types).post(admin_handlers::create_order_type),
        )
        .route(
            "/orderTypes/{order_type_id}",
            get(admin_handlers::get_order_type)
                .put(admin_handlers::update_order_type)
                .delete(admin_handlers::delete_order_type),
        )
        .route(
            "/blotters",
            get(admin_handlers::list_blotters).post(admin_handlers::create_blotter),
        )
        .route(
            "/blotters/{blotter_id}",
            get(admin_handlers::get_blotter)
                .put(admin_handlers::update_blotter)
                .delete(admin_handlers::delete_blotter),
        )
        .route("/health", get(handlers::health))
        .with_state(state)
}

/// Binds and serves the HTTP gateway until the process is terminated.
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> std::io::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "order-submission-service listening");
    axum::serve(listener, router(state)).await
}
