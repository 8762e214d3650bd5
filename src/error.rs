//! Error taxonomy for harvesting runs.

use std::path::PathBuf;

/// Errors surfaced by the harvesting engine.
///
/// Pattern mismatches are recovered locally by the download task; the
/// navigation and page variants are fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Invalid or unusable configuration, detected before any harvesting.
    #[error("configuration error: {0}")]
    Config(String),

    /// No URL mapping rule matched the given URL.
    #[error("no matching pattern found for URL '{url}'")]
    PatternMismatch { url: String },

    /// The page-advance confirmation was never observed within the retry
    /// budget. Navigation state is unrecoverable without a new session.
    #[error("an error occurred while going to page {page} (gave up after {attempts} attempts)")]
    Navigation { page: u32, attempts: u32 },

    /// A download task failed in a way the retry loop does not cover
    /// (e.g. it panicked). Indicates a logic bug, not a transient
    /// condition, and aborts the run.
    #[error("an error occurred while downloading page {page}")]
    Page {
        page: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The external page source failed to produce a usable DOM.
    #[error("page source error: {0}")]
    PageSource(String),

    #[error("HTTP error fetching '{url}'")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("image codec error for '{path}'")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HarvestError>;
