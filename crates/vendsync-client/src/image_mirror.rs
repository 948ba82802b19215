use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use vendsync_core::error::AppError;
use vendsync_core::traits::ImageUploader;

/// Copies vendor images into an HTTP object store.
///
/// Each image is downloaded and `PUT` to `<bucket>/<origin>/<index>.jpg`;
/// the PUT URL is the public URL returned to the caller.
#[derive(Clone)]
pub struct HttpImageMirror {
    client: Client,
    bucket_url: String,
    timeout: Duration,
}

impl HttpImageMirror {
    pub fn new(bucket_url: impl Into<String>) -> Result<Self, AppError> {
        Self::with_timeout(bucket_url, Duration::from_secs(30))
    }

    pub fn with_timeout(bucket_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent("vendsync/0.1 (image mirror)")
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            bucket_url: bucket_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn object_url(&self, origin: i64, index: usize) -> String {
        format!("{}/{origin}/{index}.jpg", self.bucket_url)
    }

    fn map_send_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout)
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else {
            AppError::HttpError(e.to_string())
        }
    }
}

impl ImageUploader for HttpImageMirror {
    async fn upload(&self, origin: i64, index: usize, source_url: &str) -> Result<String, AppError> {
        let response = self
            .client
            .get(source_url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                source_url
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read image body: {e}")))?;

        let target = self.object_url(origin, index);
        let stored = self
            .client
            .put(&target)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let status = stored.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} storing {}",
                status.as_u16(),
                target
            )));
        }

        tracing::debug!(%origin, %index, %source_url, %target, "Image mirrored");
        Ok(target)
    }
}
