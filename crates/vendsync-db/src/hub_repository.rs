use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use vendsync_core::error::AppError;
use vendsync_core::models::{HubEntry, PriceChange};

use crate::error::db_err;

/// The published catalog: paths, stocks and their product origins.
#[derive(Clone)]
pub struct HubRepository {
    pool: Pool<Postgres>,
}

impl HubRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn path_exists(&self, path_id: i64) -> Result<bool, AppError> {
        let row: (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM hub_paths WHERE id = $1)")
            .bind(path_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.0)
    }

    /// Stocks under `path_id` whose origin is not deleted, joined with the
    /// origin title and the parse time of the target they came from.
    pub async fn entries_under_path(&self, path_id: i64) -> Result<Vec<HubEntry>, AppError> {
        let rows = sqlx::query_as::<_, HubRow>(
            r#"
            SELECT s.origin, s.path_id, s.vsl_id, o.title, s.warranty,
                   s.input_price, s.output_price, s.updated_at, s.profit_range_id,
                   t.last_parsed_at AS parsed_at
            FROM hub_stocks s
            JOIN product_origins o ON o.origin = s.origin AND NOT o.is_deleted
            LEFT JOIN scrape_targets t ON t.id = s.vsl_id
            WHERE s.path_id = $1
            ORDER BY s.id
            "#,
        )
        .bind(path_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn published_origins(&self) -> Result<HashSet<i64>, AppError> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT DISTINCT origin FROM hub_stocks")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(|(origin,)| origin).collect())
    }

    /// Apply every change to all stocks of its origin in a single transaction.
    ///
    /// A failure rolls back the whole batch. Returns the number of updated
    /// stock rows; origins without stocks are not an error.
    pub async fn update_prices(&self, changes: &[PriceChange]) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let mut affected = 0;
        for change in changes {
            affected += sqlx::query(
                r#"
                UPDATE hub_stocks
                SET input_price = $2,
                    output_price = $3,
                    warranty = COALESCE($4, warranty),
                    updated_at = NOW()
                WHERE origin = $1
                "#,
            )
            .bind(change.origin)
            .bind(change.input_price)
            .bind(change.output_price)
            .bind(&change.warranty)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();
        }

        tx.commit().await.map_err(db_err)?;
        tracing::info!(changes = changes.len(), affected, "Hub prices updated");
        Ok(affected)
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct HubRow {
    origin: i64,
    path_id: i64,
    vsl_id: i64,
    title: String,
    warranty: Option<String>,
    input_price: Option<f64>,
    output_price: Option<f64>,
    updated_at: Option<DateTime<Utc>>,
    profit_range_id: Option<i64>,
    parsed_at: Option<DateTime<Utc>>,
}

impl From<HubRow> for HubEntry {
    fn from(row: HubRow) -> Self {
        HubEntry {
            origin: row.origin,
            path_id: row.path_id,
            vsl_id: row.vsl_id,
            title: row.title,
            warranty: row.warranty,
            input_price: row.input_price,
            output_price: row.output_price,
            updated_at: row.updated_at,
            profit_range_id: row.profit_range_id,
            parsed_at: row.parsed_at,
        }
    }
}

// -- Trait implementation --

impl vendsync_core::traits::HubStore for HubRepository {
    async fn path_exists(&self, path_id: i64) -> Result<bool, AppError> {
        HubRepository::path_exists(self, path_id).await
    }

    async fn entries_under_path(&self, path_id: i64) -> Result<Vec<HubEntry>, AppError> {
        HubRepository::entries_under_path(self, path_id).await
    }

    async fn published_origins(&self) -> Result<HashSet<i64>, AppError> {
        HubRepository::published_origins(self).await
    }

    async fn update_prices(&self, changes: &[PriceChange]) -> Result<u64, AppError> {
        HubRepository::update_prices(self, changes).await
    }
}
