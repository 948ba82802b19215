pub mod config;
pub mod crawl;
pub mod error;
pub mod frontier;
pub mod harvest;
pub mod images;
pub mod models;
pub mod pricing;
pub mod progress;
pub mod reconcile;
pub mod source;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::{CrawlConfig, HarvestConfig};
pub use crawl::{CrawlEngine, CrawlEvent, CrawlJob, CrawlOutput, CrawlReporter, TracingCrawlReporter};
pub use error::AppError;
pub use harvest::{HarvestService, HarvestSummary};
pub use models::{
    DiffItem, DiffReport, DiffStatus, HarvestedLine, HeaderProfile, HubEntry, ParsedRow,
    PriceChange, RewardTier, ScrapeTarget, SessionCookie, VendorCredentials,
};
pub use progress::{
    new_run_id, ProgressHub, ProgressPacing, ProgressPoll, ProgressReporter, ProgressSubscription,
};
pub use reconcile::ReconcileService;
pub use source::{CrawlSource, LoginForm, SourceRegistry};
pub use traits::{
    BrowserSession, HarvestStore, HubStore, ImageUploader, NullUploader, SessionFactory,
    SessionStore, TargetDirectory,
};
