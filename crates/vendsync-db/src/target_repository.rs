use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use vendsync_core::error::AppError;
use vendsync_core::models::{RewardTier, ScrapeTarget, VendorCredentials};

use crate::error::db_err;

/// Read side of the operator-managed configuration: scrape targets, vendor
/// logins and reward ranges.
#[derive(Clone)]
pub struct TargetRepository {
    pool: Pool<Postgres>,
}

impl TargetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_target(&self, target_id: i64) -> Result<Option<ScrapeTarget>, AppError> {
        let row = sqlx::query_as::<_, TargetRow>(
            r#"
            SELECT id, vendor_id, url, source, last_parsed_at, default_reward_range_id
            FROM scrape_targets
            WHERE id = $1
            "#,
        )
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(Into::into))
    }

    /// All configured targets, ordered by id.
    pub async fn list_targets(&self) -> Result<Vec<ScrapeTarget>, AppError> {
        let rows = sqlx::query_as::<_, TargetRow>(
            r#"
            SELECT id, vendor_id, url, source, last_parsed_at, default_reward_range_id
            FROM scrape_targets
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn credentials(&self, vendor_id: i64) -> Result<Option<VendorCredentials>, AppError> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT login, password FROM vendors WHERE id = $1")
                .bind(vendor_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(row.map(|(login, password)| VendorCredentials { login, password }))
    }

    /// Tiers of `range_id`, or of the default range when `None`, in stored order.
    pub async fn reward_tiers(&self, range_id: Option<i64>) -> Result<Vec<RewardTier>, AppError> {
        let rows = sqlx::query_as::<_, TierRow>(
            r#"
            SELECT l.line_from, l.line_to, l.is_percent, l.reward
            FROM reward_range_lines l
            JOIN reward_ranges r ON r.id = l.range_id
            WHERE ($1::BIGINT IS NOT NULL AND r.id = $1)
               OR ($1::BIGINT IS NULL AND r.is_default)
            ORDER BY l.position, l.id
            "#,
        )
        .bind(range_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|r| RewardTier::new(r.line_from, r.line_to, r.is_percent, r.reward))
            .collect())
    }

    pub async fn mark_parsed(&self, target_id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE scrape_targets SET last_parsed_at = $2 WHERE id = $1")
            .bind(target_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(AppError::TargetNotFound(format!("scrape target {target_id}")));
        }
        Ok(())
    }
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct TargetRow {
    id: i64,
    vendor_id: i64,
    url: String,
    source: String,
    last_parsed_at: Option<DateTime<Utc>>,
    default_reward_range_id: Option<i64>,
}

impl From<TargetRow> for ScrapeTarget {
    fn from(row: TargetRow) -> Self {
        ScrapeTarget {
            id: row.id,
            vendor_id: row.vendor_id,
            url: row.url,
            source: row.source,
            last_parsed_at: row.last_parsed_at,
            default_reward_range_id: row.default_reward_range_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TierRow {
    line_from: f64,
    line_to: f64,
    is_percent: bool,
    reward: f64,
}

// -- Trait implementation --

impl vendsync_core::traits::TargetDirectory for TargetRepository {
    async fn get_target(&self, target_id: i64) -> Result<Option<ScrapeTarget>, AppError> {
        TargetRepository::get_target(self, target_id).await
    }

    async fn credentials(&self, vendor_id: i64) -> Result<Option<VendorCredentials>, AppError> {
        TargetRepository::credentials(self, vendor_id).await
    }

    async fn reward_tiers(&self, range_id: Option<i64>) -> Result<Vec<RewardTier>, AppError> {
        TargetRepository::reward_tiers(self, range_id).await
    }

    async fn mark_parsed(&self, target_id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        TargetRepository::mark_parsed(self, target_id, at).await
    }
}
