//! The harvest coordinator: page iteration, the per-page download
//! barrier, and early-stop accounting.

pub mod download;
pub mod navigator;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::HarvestConfig;
use crate::error::{HarvestError, Result};
use crate::fetch::Fetcher;

use download::{fetch_and_save, DownloadOutcome};
use navigator::{PageNavigator, PageSource};

/// Width of the page delimiter lines in the log.
const PAGE_DELIMITER_WIDTH: usize = 148;

/// Final accounting for a run.
#[derive(Debug, Clone, Copy)]
pub struct HarvestReport {
    /// Images newly written to disk during this run.
    pub downloaded: u32,
    /// True when the run was cut short by an interrupt.
    pub interrupted: bool,
}

/// Top-level harvest loop.
///
/// The page source is only ever touched from here, on the control task;
/// download tasks run in a pool bounded by the configured worker count.
/// All of a page's tasks complete before the next page is navigated to.
pub struct Harvester<S: PageSource> {
    config: Arc<HarvestConfig>,
    navigator: PageNavigator<S>,
    fetcher: Arc<dyn Fetcher>,
    downloaded: Arc<AtomicU32>,
}

impl<S: PageSource> Harvester<S> {
    pub fn new(config: HarvestConfig, source: S, fetcher: Arc<dyn Fetcher>) -> Self {
        let mission = config.mission;
        Self {
            config: Arc::new(config),
            navigator: PageNavigator::new(source, mission),
            fetcher,
            downloaded: Arc::new(AtomicU32::new(0)),
        }
    }

    pub async fn run(self) -> Result<HarvestReport> {
        let interrupt = CancellationToken::new();
        let trigger = interrupt.clone();
        // Registered once, before any navigation, so a Ctrl-C arriving in
        // any phase of the run trips the token.
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                trigger.cancel();
            }
        });
        self.run_cancellable(interrupt).await
    }

    /// Run with an externally controlled interrupt token.
    pub async fn run_cancellable(mut self, interrupt: CancellationToken) -> Result<HarvestReport> {
        let workers = Arc::new(Semaphore::new(self.config.workers));

        // A source that has not finished rendering reports zero pages;
        // the session is recreated until a usable count shows up.
        let mut max_page = 0;
        while max_page == 0 {
            let count = tokio::select! {
                biased;
                _ = interrupt.cancelled() => return Ok(self.finish(true)),
                count = async {
                    self.navigator.restart().await?;
                    self.navigator.page_count().await
                } => count?,
            };
            max_page = count.min(self.config.to_page);
            if max_page == 0 {
                warn!("page source reported no pages, reinitializing the session");
            }
        }

        let mut interrupted = false;
        let mut consecutive_already_downloaded = 0u32;
        for page in self.config.from_page..=max_page {
            log_page_delimiter("Start", page, max_page);
            let page_result = self.process_page(page, &workers, &interrupt).await?;
            let Some(fully_downloaded) = page_result else {
                interrupted = true;
                break;
            };
            if fully_downloaded {
                info!("Page already fully downloaded!");
                consecutive_already_downloaded += 1;
            } else {
                consecutive_already_downloaded = 0;
            }
            log_page_delimiter("End", page, max_page);
            if let Some(threshold) = self.config.stop_after_already_downloaded_pages {
                if consecutive_already_downloaded >= threshold {
                    info!("Stopping after {threshold} already fully downloaded page(s)");
                    break;
                }
            }
        }

        Ok(self.finish(interrupted))
    }

    fn finish(&self, interrupted: bool) -> HarvestReport {
        let downloaded = self.downloaded.load(Ordering::Relaxed);
        info!("{downloaded} images downloaded");
        HarvestReport {
            downloaded,
            interrupted,
        }
    }

    /// Download every image of `page`, waiting for all of its tasks.
    ///
    /// Returns whether the page was already fully downloaded (every image
    /// already present), or `None` when the wait was interrupted.
    async fn process_page(
        &mut self,
        page: u32,
        workers: &Arc<Semaphore>,
        interrupt: &CancellationToken,
    ) -> Result<Option<bool>> {
        // Navigation polling can take a while; the interrupt has to cut
        // it short just like it cuts the download barrier short.
        let image_urls = tokio::select! {
            biased;
            _ = interrupt.cancelled() => {
                warn!("interrupt received, stopping before page {page} is enumerated");
                return Ok(None);
            }
            urls = async {
                self.navigator.go_to_page(page).await?;
                self.navigator.image_urls().await
            } => urls?,
        };

        let mut tasks: JoinSet<Result<DownloadOutcome>> = JoinSet::new();
        for url in image_urls {
            let config = Arc::clone(&self.config);
            let fetcher = Arc::clone(&self.fetcher);
            let downloaded = Arc::clone(&self.downloaded);
            let workers = Arc::clone(workers);
            tasks.spawn(async move {
                let _permit = workers
                    .acquire_owned()
                    .await
                    .expect("worker pool semaphore closed");
                fetch_and_save(config, fetcher, url, downloaded).await
            });
        }

        // Per-page barrier: drain every task before advancing, but drop
        // the remaining ones as soon as an interrupt is observed.
        let mut already_downloaded = true;
        loop {
            tokio::select! {
                biased;
                _ = interrupt.cancelled() => {
                    warn!("interrupt received, aborting the remaining downloads of page {page}");
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Ok(None);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok(outcome))) => {
                        already_downloaded &= outcome == DownloadOutcome::AlreadyPresent;
                    }
                    Some(Ok(Err(e))) => {
                        tasks.abort_all();
                        return Err(HarvestError::Page {
                            page,
                            source: Box::new(e),
                        });
                    }
                    Some(Err(join_error)) => {
                        tasks.abort_all();
                        return Err(HarvestError::Page {
                            page,
                            source: Box::new(join_error),
                        });
                    }
                },
            }
        }
        Ok(Some(already_downloaded))
    }
}

fn log_page_delimiter(part: &str, page: u32, max_page: u32) {
    let mut line = format!("====[{part} of page {page}/{max_page}]");
    while line.len() < PAGE_DELIMITER_WIDTH {
        line.push('=');
    }
    info!("{line}");
}
