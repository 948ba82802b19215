use vendsync_core::AppError;

/// Map a sqlx error into the domain taxonomy.
///
/// Unique and foreign-key violations become [`AppError::IntegrityConflict`];
/// everything else is a storage failure.
pub(crate) fn db_err(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e
        && (db.is_unique_violation() || db.is_foreign_key_violation())
    {
        return AppError::IntegrityConflict(db.message().to_string());
    }
    AppError::DatabaseError(e.to_string())
}
