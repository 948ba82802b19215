use std::collections::HashSet;
use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{
    HarvestedLine, HeaderProfile, HubEntry, PriceChange, RewardTier, ScrapeTarget, SessionCookie,
    VendorCredentials,
};

/// One live browser tab driven by the crawl engine.
///
/// Navigation is strictly sequential: a session is owned by exactly one run.
pub trait BrowserSession: Send {
    /// Navigate to `url`, wait for the document and return its HTML.
    fn navigate(&mut self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Type `value` into the element matching `selector`.
    fn fill(
        &mut self,
        selector: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Click the element matching `selector`, wait for navigation to settle and
    /// return the resulting HTML.
    fn submit(&mut self, selector: &str) -> impl Future<Output = Result<String, AppError>> + Send;

    fn cookies(&mut self) -> impl Future<Output = Result<Vec<SessionCookie>, AppError>> + Send;

    fn restore_cookies(
        &mut self,
        cookies: &[SessionCookie],
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Release the browser resources behind this session.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens fresh browser sessions, one per crawl run.
pub trait SessionFactory: Send + Sync + Clone {
    type Session: BrowserSession;

    fn open(
        &self,
        profile: &HeaderProfile,
    ) -> impl Future<Output = Result<Self::Session, AppError>> + Send;
}

/// Durable cookie storage keyed by source name.
pub trait SessionStore: Send + Sync + Clone {
    fn load(
        &self,
        source: &str,
    ) -> impl Future<Output = Result<Option<Vec<SessionCookie>>, AppError>> + Send;

    /// Overwrite the stored state for `source`.
    fn save(
        &self,
        source: &str,
        cookies: &[SessionCookie],
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Read access to the operator-managed configuration the core consumes.
pub trait TargetDirectory: Send + Sync + Clone {
    fn get_target(
        &self,
        target_id: i64,
    ) -> impl Future<Output = Result<Option<ScrapeTarget>, AppError>> + Send;

    fn credentials(
        &self,
        vendor_id: i64,
    ) -> impl Future<Output = Result<Option<VendorCredentials>, AppError>> + Send;

    /// Tiers of `range_id`, or of the default range when `None`, in stored order.
    fn reward_tiers(
        &self,
        range_id: Option<i64>,
    ) -> impl Future<Output = Result<Vec<RewardTier>, AppError>> + Send;

    fn mark_parsed(
        &self,
        target_id: i64,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Holding area for the most recent crawl of each scrape target.
pub trait HarvestStore: Send + Sync + Clone {
    /// Atomically swap the staging set of `target_id` for `lines`.
    ///
    /// An empty `lines` empties the set. Returns the number of rows inserted;
    /// duplicates of an origin already in the batch are ignored.
    fn replace(
        &self,
        target_id: i64,
        lines: &[HarvestedLine],
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn get(
        &self,
        target_id: i64,
    ) -> impl Future<Output = Result<Vec<HarvestedLine>, AppError>> + Send;

    /// Staged lines of several targets at once.
    fn get_many(
        &self,
        target_ids: &[i64],
    ) -> impl Future<Output = Result<Vec<HarvestedLine>, AppError>> + Send;
}

/// The published catalog.
pub trait HubStore: Send + Sync + Clone {
    fn path_exists(&self, path_id: i64) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Entries under `path_id` whose product origin is not deleted.
    fn entries_under_path(
        &self,
        path_id: i64,
    ) -> impl Future<Output = Result<Vec<HubEntry>, AppError>> + Send;

    /// Every origin with at least one hub entry.
    fn published_origins(&self) -> impl Future<Output = Result<HashSet<i64>, AppError>> + Send;

    /// Apply all `changes` in one transaction. Returns affected row count.
    fn update_prices(
        &self,
        changes: &[PriceChange],
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// Copies a vendor image into object storage and returns its new URL.
pub trait ImageUploader: Send + Sync + Clone {
    fn upload(
        &self,
        origin: i64,
        index: usize,
        source_url: &str,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// An ImageUploader for deployments without object storage.
#[derive(Debug, Clone)]
pub struct NullUploader;

impl ImageUploader for NullUploader {
    async fn upload(&self, _origin: i64, _index: usize, source_url: &str) -> Result<String, AppError> {
        Ok(source_url.to_string())
    }
}
