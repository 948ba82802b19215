use std::path::PathBuf;
use std::time::Duration;

use vendsync_core::error::AppError;

/// Settings of the concrete collaborators built by this crate.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// JSON file with the [`crate::SourceSelectors`] of every vendor.
    pub sources_file: Option<PathBuf>,
    pub session_dir: PathBuf,
    pub page_timeout: Duration,
    pub image_bucket_url: Option<String>,
    pub chrome_bin: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            sources_file: None,
            session_dir: PathBuf::from(".vendsync/sessions"),
            page_timeout: Duration::from_secs(30),
            image_bucket_url: None,
            chrome_bin: None,
        }
    }
}

impl ClientConfig {
    /// Read configuration from environment variables.
    ///
    /// - `VENDSYNC_SOURCES_FILE` (optional)
    /// - `VENDSYNC_SESSION_DIR` (optional, defaults to `.vendsync/sessions`)
    /// - `VENDSYNC_PAGE_TIMEOUT_SECS` (optional, defaults to 30)
    /// - `VENDSYNC_IMAGE_BUCKET_URL` (optional; images are not mirrored without it)
    /// - `CHROME_BIN` (optional)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let page_timeout = match non_empty("VENDSYNC_PAGE_TIMEOUT_SECS") {
            None => defaults.page_timeout,
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    AppError::ConfigError(format!(
                        "Invalid VENDSYNC_PAGE_TIMEOUT_SECS '{raw}': must be a positive integer"
                    ))
                })?;
                if secs == 0 {
                    return Err(AppError::ConfigError(
                        "VENDSYNC_PAGE_TIMEOUT_SECS must be at least 1".into(),
                    ));
                }
                Duration::from_secs(secs)
            }
        };

        Ok(Self {
            sources_file: non_empty("VENDSYNC_SOURCES_FILE").map(PathBuf::from),
            session_dir: non_empty("VENDSYNC_SESSION_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_dir),
            page_timeout,
            image_bucket_url: non_empty("VENDSYNC_IMAGE_BUCKET_URL"),
            chrome_bin: non_empty("CHROME_BIN").map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let config = ClientConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.session_dir, PathBuf::from(".vendsync/sessions"));
        assert!(config.image_bucket_url.is_none());

        let config = ClientConfig::from_lookup(|key| match key {
            "VENDSYNC_PAGE_TIMEOUT_SECS" => Some("45".into()),
            "VENDSYNC_IMAGE_BUCKET_URL" => Some("https://s3.test/pics".into()),
            "VENDSYNC_SESSION_DIR" => Some("  ".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.page_timeout, Duration::from_secs(45));
        assert_eq!(config.image_bucket_url.as_deref(), Some("https://s3.test/pics"));
        assert_eq!(config.session_dir, PathBuf::from(".vendsync/sessions"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = ClientConfig::from_lookup(|key| {
            (key == "VENDSYNC_PAGE_TIMEOUT_SECS").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
