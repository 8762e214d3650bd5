//! chromiumoxide-backed [`PageSource`] implementation.
//!
//! Drives a headless chromium session over CDP. The catalog page renders
//! its image list with JavaScript, so plain HTTP fetching never sees the
//! thumbnails; everything here goes through a live DOM.

use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tracing::debug;

use crate::error::{HarvestError, Result};
use crate::harvest::navigator::PageSource;
use crate::mission::Mission;

/// CSS selector for the element showing the index range of the current
/// page ("501-550 of 1,234,567"). Shared by both missions.
const START_INDEX_SELECTOR: &str = ".start_index";

/// CSS selector for the thumbnail images of the current page.
const THUMBNAIL_SELECTOR: &str = "div.raw_list_image_inner img";

fn cdp_err(e: impl std::fmt::Display) -> HarvestError {
    HarvestError::PageSource(e.to_string())
}

struct Session {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    page: Page,
}

/// A restartable chromium session on a mission's catalog page.
pub struct ChromePageSource {
    mission: Mission,
    chrome_binary: Option<PathBuf>,
    session: Option<Session>,
}

impl ChromePageSource {
    pub fn new(mission: Mission, chrome_binary: Option<PathBuf>) -> Self {
        Self {
            mission,
            chrome_binary,
            session: None,
        }
    }

    async fn launch(&self) -> Result<Session> {
        let mut builder = BrowserConfig::builder()
            .window_size(2560, 1440)
            .arg("--disable-gpu");
        if let Some(path) = &self.chrome_binary {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(HarvestError::PageSource)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(cdp_err)?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler error: {e}");
                    break;
                }
            }
        });

        let page = browser
            .new_page(self.mission.catalog_url())
            .await
            .map_err(cdp_err)?;
        page.wait_for_navigation().await.map_err(cdp_err)?;

        Ok(Session {
            browser,
            handler_task,
            page,
        })
    }

    async fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.browser.close().await {
                debug!("failed to close the browser session: {e}");
            }
            session.handler_task.abort();
        }
    }

    fn page(&self) -> Result<&Page> {
        self.session
            .as_ref()
            .map(|s| &s.page)
            .ok_or_else(|| HarvestError::PageSource("browser session not started".to_string()))
    }
}

#[async_trait]
impl PageSource for ChromePageSource {
    async fn restart(&mut self) -> Result<()> {
        self.teardown().await;
        self.session = Some(self.launch().await?);
        Ok(())
    }

    async fn page_count(&mut self) -> Result<u32> {
        let pagination = self
            .page()?
            .find_element(self.mission.pagination_selector())
            .await
            .map_err(cdp_err)?;
        let max = pagination.attribute("max").await.map_err(cdp_err)?;
        // A missing or unparsable max attribute means the pagination
        // control has not rendered yet; the coordinator restarts on 0.
        Ok(max.and_then(|m| m.parse().ok()).unwrap_or(0))
    }

    async fn enter_page_number(&mut self, page: u32) -> Result<()> {
        let selector = self.mission.pagination_selector();
        let dom = self.page()?;
        let input = dom.find_element(selector).await.map_err(cdp_err)?;
        input.scroll_into_view().await.map_err(cdp_err)?;
        // Clear the input in the DOM; type_str only appends.
        dom.evaluate(format!(
            "document.querySelector('{selector}').value = ''"
        ))
        .await
        .map_err(cdp_err)?;
        input.click().await.map_err(cdp_err)?;
        input.type_str(page.to_string()).await.map_err(cdp_err)?;
        Ok(())
    }

    async fn status_contains(&mut self, text: &str) -> Result<bool> {
        let status = self
            .page()?
            .find_element(START_INDEX_SELECTOR)
            .await
            .map_err(cdp_err)?;
        let content = status.inner_text().await.map_err(cdp_err)?;
        Ok(content.is_some_and(|c| c.contains(text)))
    }

    async fn thumbnail_urls(&mut self) -> Result<Vec<String>> {
        let thumbnails = self
            .page()?
            .find_elements(THUMBNAIL_SELECTOR)
            .await
            .map_err(cdp_err)?;
        let mut urls = Vec::with_capacity(thumbnails.len());
        for thumbnail in thumbnails {
            if let Some(src) = thumbnail.attribute("src").await.map_err(cdp_err)? {
                urls.push(src);
            }
        }
        Ok(urls)
    }
}

impl Drop for ChromePageSource {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.handler_task.abort();
        }
    }
}
