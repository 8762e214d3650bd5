//! The fetch-and-save task: one image URL in, one [`DownloadOutcome`] out.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::HarvestConfig;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::image::ImageFormat;

/// Total fetch attempts per image: one initial plus five retries, each
/// retry switching to the mission's alternate URL.
pub const MAX_ATTEMPTS: usize = 6;

/// Per-image result of a fetch-and-save task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Fetched and written to disk during this run.
    Downloaded,
    /// Already on disk and `force` is off; no network call was made.
    AlreadyPresent,
    /// No mapping rule (or no known format) matched the URL. Logged,
    /// never retried, never leaves a partial file.
    Unresolvable,
    /// All attempts exhausted.
    Failed,
}

/// Fetch one image and save it under the mission's layout.
///
/// Errors returned here are the unexpected kind (directory creation,
/// blocking-task join); everything transient is absorbed by the retry
/// loop and reported through the outcome.
pub async fn fetch_and_save(
    config: Arc<HarvestConfig>,
    fetcher: Arc<dyn Fetcher>,
    image_url: String,
    downloaded: Arc<AtomicU32>,
) -> Result<DownloadOutcome> {
    let Some(source_format) = ImageFormat::from_url(&image_url) else {
        info!("/!\\ Unable to download image: {image_url}");
        return Ok(DownloadOutcome::Unresolvable);
    };
    let target_format = config.save_mode.target_format(source_format);
    let path = match config
        .mission
        .image_path(&image_url, &config.save_root, target_format)
    {
        Ok(path) => path,
        Err(_) => {
            info!("/!\\ Unable to download image: {image_url}");
            return Ok(DownloadOutcome::Unresolvable);
        }
    };

    if path.exists() && !config.force {
        debug!("  {image_url}");
        return Ok(DownloadOutcome::AlreadyPresent);
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    for (attempt, url) in config
        .mission
        .candidate_urls(&image_url, MAX_ATTEMPTS)
        .into_iter()
        .enumerate()
    {
        let bullet = if attempt == 0 { "*" } else { "!" };
        info!("{bullet} {url}");
        let bytes = match fetcher.fetch(&url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("fetch attempt {} failed for '{url}': {e}", attempt + 1);
                continue;
            }
        };
        let save_mode = config.save_mode;
        let quality = config.quality;
        let dest = path.clone();
        let saved = tokio::task::spawn_blocking(move || {
            save_mode.save_image(&bytes, source_format, &dest, quality)
        })
        .await
        .map_err(std::io::Error::other)?;
        match saved {
            Ok(()) => {
                downloaded.fetch_add(1, Ordering::Relaxed);
                return Ok(DownloadOutcome::Downloaded);
            }
            Err(e) => {
                debug!("save attempt {} failed for '{url}': {e}", attempt + 1);
                continue;
            }
        }
    }

    warn!("/!\\ Giving up on {image_url} after {MAX_ATTEMPTS} attempts");
    Ok(DownloadOutcome::Failed)
}
