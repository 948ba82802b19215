use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use vendsync_core::AppError;

use crate::config::DatabaseConfig;
use crate::error::db_err;
use crate::harvest_repository::HarvestRepository;
use crate::hub_repository::HubRepository;
use crate::target_repository::TargetRepository;

/// Central database facade: owns the connection pool, runs migrations
/// and vends repository instances.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL with the given configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {e}")))?;

        Ok(Self { pool })
    }

    /// Create a `Database` from an existing pool (useful for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    pub fn target_repo(&self) -> TargetRepository {
        TargetRepository::new(self.pool.clone())
    }

    pub fn harvest_repo(&self) -> HarvestRepository {
        HarvestRepository::new(self.pool.clone())
    }

    pub fn hub_repo(&self) -> HubRepository {
        HubRepository::new(self.pool.clone())
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
