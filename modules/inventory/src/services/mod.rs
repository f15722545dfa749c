pub mod product_service;
pub mod reservation_service;
pub mod stock_service;

/// Postgres unique-constraint violation, used to recover idempotent paths
/// that lose an insert race.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db)
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
    )
}
