//! One harvest run: crawl a target, price its rows and stage them.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::HarvestConfig;
use crate::crawl::{CrawlEngine, CrawlJob};
use crate::error::AppError;
use crate::images::sync_images;
use crate::models::HarvestedLine;
use crate::pricing::{find_overlaps, price_rows};
use crate::progress::ProgressReporter;
use crate::source::SourceRegistry;
use crate::traits::{
    HarvestStore, HubStore, ImageUploader, SessionFactory, SessionStore, TargetDirectory,
};

/// Outcome of a successful harvest run.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestSummary {
    pub run_id: String,
    pub target_id: i64,
    pub pages: usize,
    pub parsed: usize,
    pub staged: u64,
    pub reauthenticated: bool,
    /// Mirrored picture URLs per origin; empty without an uploader.
    pub images: HashMap<i64, Vec<String>>,
}

/// Orchestrates a harvest: target → crawl → price → stage.
///
/// Generic over every collaborator so it runs the same against the database
/// and a real browser as against the in-memory mocks.
pub struct HarvestService<F, St, D, H, P, U>
where
    F: SessionFactory,
    St: SessionStore,
    D: TargetDirectory,
    H: HarvestStore,
    P: HubStore,
    U: ImageUploader,
{
    engine: CrawlEngine<F, St>,
    sources: SourceRegistry,
    directory: D,
    staging: H,
    hub: P,
    uploader: Option<U>,
    config: HarvestConfig,
}

impl<F, St, D, H, P, U> Clone for HarvestService<F, St, D, H, P, U>
where
    F: SessionFactory,
    St: SessionStore,
    D: TargetDirectory,
    H: HarvestStore,
    P: HubStore,
    U: ImageUploader,
{
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            sources: self.sources.clone(),
            directory: self.directory.clone(),
            staging: self.staging.clone(),
            hub: self.hub.clone(),
            uploader: self.uploader.clone(),
            config: self.config.clone(),
        }
    }
}

impl<F, St, D, H, P, U> HarvestService<F, St, D, H, P, U>
where
    F: SessionFactory,
    St: SessionStore,
    D: TargetDirectory,
    H: HarvestStore,
    P: HubStore,
    U: ImageUploader,
{
    /// Create a HarvestService that does not mirror images.
    pub fn new(
        engine: CrawlEngine<F, St>,
        sources: SourceRegistry,
        directory: D,
        staging: H,
        hub: P,
        config: HarvestConfig,
    ) -> Self {
        Self {
            engine,
            sources,
            directory,
            staging,
            hub,
            uploader: None,
            config,
        }
    }

    pub fn with_uploader(mut self, uploader: U) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    /// Run a harvest and always terminate the run's progress channel.
    pub async fn run(
        &self,
        target_id: i64,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<HarvestSummary, AppError> {
        let result = self.harvest(target_id, reporter, cancel).await;
        match &result {
            Ok(summary) => reporter.publish(format!(
                "Harvest complete: {} of {} rows staged",
                summary.staged, summary.parsed
            )),
            Err(e) => {
                tracing::error!(run_id = %reporter.run_id(), target_id, error = %e, "Harvest failed");
                reporter.publish(format!("Harvest failed: {e}"));
            }
        }
        reporter.finish();
        result
    }

    async fn harvest(
        &self,
        target_id: i64,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<HarvestSummary, AppError> {
        let target = self
            .directory
            .get_target(target_id)
            .await?
            .ok_or_else(|| AppError::TargetNotFound(format!("scrape target {target_id}")))?;
        let source = self.sources.get(&target.source)?;

        let credentials = self
            .directory
            .credentials(target.vendor_id)
            .await?
            .ok_or_else(|| {
                AppError::auth(
                    source.name(),
                    format!("no credentials stored for vendor {}", target.vendor_id),
                )
            })?;

        let tiers = self
            .directory
            .reward_tiers(target.default_reward_range_id)
            .await?;
        let overlaps = find_overlaps(&tiers);
        if !overlaps.is_empty() {
            tracing::warn!(
                target_id,
                range_id = ?target.default_reward_range_id,
                ?overlaps,
                "Reward tiers overlap, first matching tier wins"
            );
        }

        let published = self.hub.published_origins().await?;
        tracing::info!(
            run_id = %reporter.run_id(),
            target_id,
            source = %source.name(),
            tiers = tiers.len(),
            published = published.len(),
            "Starting harvest"
        );

        let job = CrawlJob {
            start_url: target.url.clone(),
            credentials,
            published,
        };
        let output = self
            .engine
            .run(source.as_ref(), &job, reporter, cancel)
            .await?;

        let parsed = output.rows.len();
        let lines = price_rows(target.id, output.rows, &tiers);
        let staged = self.staging.replace(target.id, &lines).await?;
        // Staging is already swapped; a missing timestamp must not fail the run.
        if let Err(e) = self.directory.mark_parsed(target.id, Utc::now()).await {
            tracing::warn!(target_id, error = %e, "Failed to stamp last_parsed_at");
            reporter.publish(format!("Warning: could not record parse time: {e}"));
        }
        reporter.publish(format!("Staged {staged} rows"));

        let images = match &self.uploader {
            Some(uploader) => {
                let fresh: Vec<HarvestedLine> =
                    lines.iter().filter(|line| !line.published).cloned().collect();
                let map = sync_images(&fresh, uploader, self.config.image_concurrency).await;
                tracing::info!(target_id, rows = map.len(), "Images mirrored");
                map
            }
            None => HashMap::new(),
        };

        Ok(HarvestSummary {
            run_id: reporter.run_id().to_string(),
            target_id: target.id,
            pages: output.pages,
            parsed,
            staged,
            reauthenticated: output.reauthenticated,
            images,
        })
    }
}
