pub mod products;
pub mod reservations;

use axum::Router;
use sqlx::PgPool;

pub fn inventory_router(pool: PgPool) -> Router {
    Router::new()
        .merge(products::router())
        .merge(reservations::router())
        .with_state(pool)
}
