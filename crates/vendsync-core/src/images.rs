use std::collections::HashMap;

use futures::stream::{self, StreamExt};

use crate::error::AppError;
use crate::models::HarvestedLine;
use crate::traits::ImageUploader;

/// Mirror the pictures of every line, up to `concurrency` lines at a time.
///
/// Returns the mirrored URLs per origin. A line whose upload fails is logged
/// and left out of the map; the remaining lines are unaffected.
pub async fn sync_images<U: ImageUploader>(
    lines: &[HarvestedLine],
    uploader: &U,
    concurrency: usize,
) -> HashMap<i64, Vec<String>> {
    stream::iter(lines.iter().filter(|line| !line.pics.is_empty()))
        .map(|line| async move { (line.origin, upload_line(line, uploader).await) })
        .buffer_unordered(concurrency.max(1))
        .filter_map(|(origin, result)| async move {
            match result {
                Ok(urls) => Some((origin, urls)),
                Err(e) => {
                    tracing::warn!(%origin, error = %e, "Image upload failed, skipping row");
                    None
                }
            }
        })
        .boxed()
        .collect()
        .await
}

async fn upload_line<U: ImageUploader>(
    line: &HarvestedLine,
    uploader: &U,
) -> Result<Vec<String>, AppError> {
    let mut urls = Vec::with_capacity(line.pics.len());
    for (index, pic) in line.pics.iter().enumerate() {
        urls.push(uploader.upload(line.origin, index, pic).await?);
    }
    Ok(urls)
}
