pub mod orders;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::services::order_service::OrderService;

pub fn edge_router(service: Arc<OrderService>) -> Router {
    Router::new()
        .route("/orders", post(orders::create_order))
        .route("/orders/{order_ledger_id}", get(orders::get_order))
        .with_state(service)
}
