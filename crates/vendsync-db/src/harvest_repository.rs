use sqlx::{PgPool, Pool, Postgres};
use vendsync_core::error::AppError;
use vendsync_core::models::HarvestedLine;

use crate::error::db_err;

/// Staging area holding the latest crawl of every scrape target.
#[derive(Clone)]
pub struct HarvestRepository {
    pool: Pool<Postgres>,
}

impl HarvestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Swap the staged set of `target_id` for `lines` in one transaction.
    ///
    /// An empty `lines` empties the set. Lines repeating an origin already in
    /// the batch are ignored. Returns the number of lines inserted.
    pub async fn replace(&self, target_id: i64, lines: &[HarvestedLine]) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let removed = sqlx::query("DELETE FROM harvest_lines WHERE target_id = $1")
            .bind(target_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();

        let mut inserted = 0;
        for (position, line) in lines.iter().enumerate() {
            inserted += sqlx::query(
                r#"
                INSERT INTO harvest_lines
                    (target_id, origin, position, title, link, shipment, warranty,
                     input_price, output_price, pics, preview, optional, published)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (target_id, origin) DO NOTHING
                "#,
            )
            .bind(target_id)
            .bind(line.origin)
            .bind(position as i32)
            .bind(&line.title)
            .bind(&line.link)
            .bind(&line.shipment)
            .bind(&line.warranty)
            .bind(line.input_price)
            .bind(line.output_price)
            .bind(&line.pics)
            .bind(&line.preview)
            .bind(&line.optional)
            .bind(line.published)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();
        }

        tx.commit().await.map_err(db_err)?;

        if (inserted as usize) < lines.len() {
            tracing::debug!(
                target_id,
                duplicates = lines.len() - inserted as usize,
                "Ignored duplicate origins"
            );
        }
        tracing::info!(target_id, removed, inserted, "Staging replaced");
        Ok(inserted)
    }

    /// Staged lines of `target_id`, in crawl order.
    pub async fn get(&self, target_id: i64) -> Result<Vec<HarvestedLine>, AppError> {
        self.get_many(&[target_id]).await
    }

    pub async fn get_many(&self, target_ids: &[i64]) -> Result<Vec<HarvestedLine>, AppError> {
        let rows = sqlx::query_as::<_, HarvestRow>(
            r#"
            SELECT target_id, origin, title, link, shipment, warranty,
                   input_price, output_price, pics, preview, optional, published
            FROM harvest_lines
            WHERE target_id = ANY($1)
            ORDER BY target_id, position
            "#,
        )
        .bind(target_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct HarvestRow {
    target_id: i64,
    origin: i64,
    title: String,
    link: String,
    shipment: Option<String>,
    warranty: Option<String>,
    input_price: f64,
    output_price: Option<f64>,
    pics: Vec<String>,
    preview: Option<String>,
    optional: Option<String>,
    published: bool,
}

impl From<HarvestRow> for HarvestedLine {
    fn from(row: HarvestRow) -> Self {
        HarvestedLine {
            target_id: row.target_id,
            origin: row.origin,
            title: row.title,
            link: row.link,
            shipment: row.shipment,
            warranty: row.warranty,
            input_price: row.input_price,
            output_price: row.output_price,
            pics: row.pics,
            preview: row.preview,
            optional: row.optional,
            published: row.published,
        }
    }
}

// -- Trait implementation --

impl vendsync_core::traits::HarvestStore for HarvestRepository {
    async fn replace(&self, target_id: i64, lines: &[HarvestedLine]) -> Result<u64, AppError> {
        HarvestRepository::replace(self, target_id, lines).await
    }

    async fn get(&self, target_id: i64) -> Result<Vec<HarvestedLine>, AppError> {
        HarvestRepository::get(self, target_id).await
    }

    async fn get_many(&self, target_ids: &[i64]) -> Result<Vec<HarvestedLine>, AppError> {
        HarvestRepository::get_many(self, target_ids).await
    }
}
