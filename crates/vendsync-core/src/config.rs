use std::time::Duration;

use crate::error::AppError;
use crate::models::HeaderProfile;

/// Settings of the crawl engine.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub profile: HeaderProfile,
    /// Pause between two page visits of the same run.
    pub page_delay: Duration,
    pub max_pages: Option<usize>,
    /// Overall limit for one run, checked between pages.
    pub run_deadline: Option<Duration>,
    /// Re-authentications allowed after a mid-crawl session expiry.
    pub max_reauth: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            profile: HeaderProfile::default(),
            page_delay: Duration::ZERO,
            max_pages: None,
            run_deadline: None,
            max_reauth: 1,
        }
    }
}

impl CrawlConfig {
    /// Read configuration from environment variables.
    ///
    /// - `VENDSYNC_USER_AGENT`, `VENDSYNC_LOCALE`, `VENDSYNC_REFERRER` (header profile)
    /// - `VENDSYNC_PAGE_DELAY_MS` (defaults to 0)
    /// - `VENDSYNC_MAX_PAGES` (unbounded when unset)
    /// - `VENDSYNC_RUN_DEADLINE_SECS` (unbounded when unset)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = HeaderProfile::default();
        let profile = HeaderProfile {
            user_agent: lookup("VENDSYNC_USER_AGENT").unwrap_or(defaults.user_agent),
            locale: lookup("VENDSYNC_LOCALE").unwrap_or(defaults.locale),
            referrer: lookup("VENDSYNC_REFERRER").unwrap_or(defaults.referrer),
        };

        let page_delay = parse_var::<u64>(&lookup, "VENDSYNC_PAGE_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO);
        let max_pages = parse_positive(&lookup, "VENDSYNC_MAX_PAGES")?.map(|n| n as usize);
        let run_deadline =
            parse_positive(&lookup, "VENDSYNC_RUN_DEADLINE_SECS")?.map(Duration::from_secs);

        Ok(Self {
            profile,
            page_delay,
            max_pages,
            run_deadline,
            ..Self::default()
        })
    }
}

/// Settings of the harvest orchestration around a crawl.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Parallel image uploads per run.
    pub image_concurrency: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            image_concurrency: 4,
        }
    }
}

impl HarvestConfig {
    /// - `VENDSYNC_IMAGE_CONCURRENCY` (optional, defaults to 4)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let image_concurrency = parse_positive(&lookup, "VENDSYNC_IMAGE_CONCURRENCY")?
            .map(|n| n as usize)
            .unwrap_or(Self::default().image_concurrency);
        Ok(Self { image_concurrency })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, AppError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            AppError::ConfigError(format!("Invalid {key} '{raw}': must be a non-negative integer"))
        }),
    }
}

fn parse_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<u64>, AppError> {
    match parse_var::<u64>(lookup, key)? {
        Some(0) => Err(AppError::ConfigError(format!("{key} must be at least 1"))),
        other => Ok(other),
    }
}
