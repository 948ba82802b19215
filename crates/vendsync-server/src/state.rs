use tokio_util::sync::CancellationToken;

use vendsync_client::{ChromiumSessionFactory, ClientConfig, FileSessionStore, HttpImageMirror};
use vendsync_core::{
    AppError, CrawlConfig, CrawlEngine, HarvestConfig, HarvestService, ProgressHub,
    ProgressPacing, ReconcileService, SourceRegistry,
};
use vendsync_db::{Database, HarvestRepository, HubRepository, TargetRepository};

/// The harvest pipeline as wired by the server: Chromium, file-backed
/// sessions, Postgres and the HTTP image mirror.
pub type Harvester = HarvestService<
    ChromiumSessionFactory,
    FileSessionStore,
    TargetRepository,
    HarvestRepository,
    HubRepository,
    HttpImageMirror,
>;

pub type Reconciler = ReconcileService<HubRepository, HarvestRepository>;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub db: Database,
    pub progress: ProgressHub,
    /// Polling of SSE progress streams.
    pub pacing: ProgressPacing,
    pub harvester: Harvester,
    pub reconciler: Reconciler,
    /// Cancelled on shutdown; every background harvest listens to it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        db: Database,
        sources: SourceRegistry,
        client: &ClientConfig,
        crawl: CrawlConfig,
        harvest: HarvestConfig,
    ) -> Result<Self, AppError> {
        let mut factory = ChromiumSessionFactory::new(client.page_timeout);
        if let Some(bin) = &client.chrome_bin {
            factory = factory.with_chrome_bin(bin.clone());
        }
        let engine = CrawlEngine::new(factory, FileSessionStore::new(&client.session_dir), crawl);

        let mut harvester = HarvestService::new(
            engine,
            sources,
            db.target_repo(),
            db.harvest_repo(),
            db.hub_repo(),
            harvest,
        );
        if let Some(bucket) = &client.image_bucket_url {
            harvester = harvester.with_uploader(HttpImageMirror::with_timeout(
                bucket.as_str(),
                client.page_timeout,
            )?);
        }

        Ok(Self {
            reconciler: ReconcileService::new(db.hub_repo(), db.harvest_repo()),
            progress: ProgressHub::default(),
            pacing: ProgressPacing::default(),
            harvester,
            db,
            shutdown: CancellationToken::new(),
        })
    }
}
