//! Page navigation over an external page source.
//!
//! The catalog is a JavaScript-rendered page: entering a page number only
//! counts as "navigated" once the page's status element shows the start
//! index of the requested page ("501-550 of ..."). Navigation therefore
//! confirms the advance by polling for that marker, with a bounded number
//! of attempts.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::{HarvestError, Result};
use crate::mission::Mission;

/// Attempts to confirm a page advance before giving up on the run.
pub const NAVIGATION_ATTEMPTS: u32 = 10;

/// Budget for one confirmation attempt (and for thumbnail enumeration).
const CONFIRM_BUDGET: Duration = Duration::from_secs(10);

/// Fixed polling interval. No backoff anywhere in navigation.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A live, navigable rendering of the catalog page.
///
/// Implementations must be restartable: the coordinator tears the session
/// down and recreates it when it becomes unresponsive.
#[async_trait]
pub trait PageSource: Send {
    /// Tear down any existing session and start a fresh one on the
    /// mission's catalog URL.
    async fn restart(&mut self) -> Result<()>;

    /// Total page count reported by the pagination control. A source that
    /// has not finished rendering may report 0.
    async fn page_count(&mut self) -> Result<u32>;

    /// Clear the pagination input and enter `page`.
    async fn enter_page_number(&mut self, page: u32) -> Result<()>;

    /// Whether the page's status element currently contains `text`.
    async fn status_contains(&mut self, text: &str) -> Result<bool>;

    /// The thumbnail URLs currently listed on the page.
    async fn thumbnail_urls(&mut self) -> Result<Vec<String>>;
}

/// Drives a [`PageSource`] to a given page and enumerates its images.
pub struct PageNavigator<S: PageSource> {
    source: S,
    mission: Mission,
}

impl<S: PageSource> PageNavigator<S> {
    pub fn new(source: S, mission: Mission) -> Self {
        Self { source, mission }
    }

    pub async fn restart(&mut self) -> Result<()> {
        self.source.restart().await
    }

    pub async fn page_count(&mut self) -> Result<u32> {
        self.source.page_count().await
    }

    /// Advance to `page` and confirm via the displayed start index.
    pub async fn go_to_page(&mut self, page: u32) -> Result<()> {
        let start_index =
            format_start_index(u64::from(page - 1) * u64::from(self.mission.images_per_page()) + 1);
        for attempt in 1..=NAVIGATION_ATTEMPTS {
            self.source.enter_page_number(page).await?;
            if self.wait_for_status(&start_index).await {
                return Ok(());
            }
            debug!("page {page} not confirmed (attempt {attempt}/{NAVIGATION_ATTEMPTS})");
        }
        Err(HarvestError::Navigation {
            page,
            attempts: NAVIGATION_ATTEMPTS,
        })
    }

    /// Poll for `text` in the status element within one attempt's budget.
    /// Source errors count as "not there yet"; the page may be mid-render.
    async fn wait_for_status(&mut self, text: &str) -> bool {
        let deadline = Instant::now() + CONFIRM_BUDGET;
        loop {
            match self.source.status_contains(text).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => debug!("status element not readable: {e}"),
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Enumerate the current page's thumbnails and resolve each to its
    /// full-size URL. Enumeration tolerates transient source errors (the
    /// page re-renders its list while loading); a thumbnail with no
    /// mapping rule is logged and skipped.
    pub async fn image_urls(&mut self) -> Result<Vec<String>> {
        let deadline = Instant::now() + CONFIRM_BUDGET;
        loop {
            match self.source.thumbnail_urls().await {
                Ok(thumbnails) => {
                    let mut urls = Vec::with_capacity(thumbnails.len());
                    for thumbnail in &thumbnails {
                        match self.mission.full_size_url(thumbnail) {
                            Ok(url) => urls.push(url),
                            Err(_) => warn!("/!\\ No mapping rule for thumbnail: {thumbnail}"),
                        }
                    }
                    return Ok(urls);
                }
                Err(e) if Instant::now() < deadline => {
                    debug!("thumbnail enumeration failed transiently: {e}");
                    sleep(POLL_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Render a start index the way the catalog does: English locale, with
/// thousands separators ("50,001").
pub fn format_start_index(index: u64) -> String {
    let digits = index.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
