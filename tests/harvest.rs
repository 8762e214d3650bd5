//! End-to-end coordinator behavior over fake collaborators: a scripted
//! page source and an in-memory fetcher, with a real temp directory as
//! the sink.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mars_harvester::config::HarvestConfig;
use mars_harvester::error::Result;
use mars_harvester::fetch::Fetcher;
use mars_harvester::harvest::navigator::{format_start_index, PageSource};
use mars_harvester::harvest::Harvester;
use mars_harvester::image::SaveMode;
use mars_harvester::mission::Mission;

const IMAGE_BYTES: &[u8] = b"not really a jpeg";

/// Thumbnail URL for image `i` of page `p`, shaped like the Curiosity
/// catalog so the mission rules resolve it.
fn thumbnail(page: u32, i: u32) -> String {
    format!("https://mars.nasa.gov/msss/0300{page}/mcam/P{page}I{i}-thm.jpg")
}

/// The path the corresponding full-size image is saved under.
fn saved_path(root: &Path, page: u32, i: u32) -> std::path::PathBuf {
    root.join(format!("0300{page}/mcam/P{page}I{i}.jpg"))
}

#[derive(Clone)]
struct FakeCatalog {
    pages: Arc<Vec<Vec<String>>>,
    current_page: u32,
    /// Zero page counts to report before a usable one (forces restarts).
    empty_counts: Arc<AtomicU32>,
    /// Navigating to this page never completes (0 disables it).
    hang_on_page: Arc<AtomicU32>,
    restarts: Arc<AtomicU32>,
    events: Arc<Mutex<Vec<String>>>,
}

impl FakeCatalog {
    fn new(pages: Vec<Vec<String>>) -> Self {
        Self {
            pages: Arc::new(pages),
            current_page: 0,
            empty_counts: Arc::new(AtomicU32::new(0)),
            hang_on_page: Arc::new(AtomicU32::new(0)),
            restarts: Arc::new(AtomicU32::new(0)),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn uniform(page_count: u32, images_per_page: u32) -> Self {
        Self::new(
            (1..=page_count)
                .map(|p| (0..images_per_page).map(|i| thumbnail(p, i)).collect())
                .collect(),
        )
    }
}

#[async_trait]
impl PageSource for FakeCatalog {
    async fn restart(&mut self) -> Result<()> {
        self.restarts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn page_count(&mut self) -> Result<u32> {
        if self
            .empty_counts
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(0);
        }
        Ok(self.pages.len() as u32)
    }

    async fn enter_page_number(&mut self, page: u32) -> Result<()> {
        self.current_page = page;
        self.events.lock().unwrap().push(format!("page:{page}"));
        if self.hang_on_page.load(Ordering::Relaxed) == page {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn status_contains(&mut self, text: &str) -> Result<bool> {
        let start = u64::from(self.current_page - 1) * 50 + 1;
        Ok(format_start_index(start) == text)
    }

    async fn thumbnail_urls(&mut self) -> Result<Vec<String>> {
        Ok(self.pages[(self.current_page - 1) as usize].clone())
    }
}

struct FakeFetcher {
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        // Let other workers interleave so the barrier test is meaningful.
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.events.lock().unwrap().push(format!("fetch:{url}"));
        Ok(IMAGE_BYTES.to_vec())
    }
}

/// Records the request, then never responds.
struct StalledFetcher {
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Fetcher for StalledFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.events.lock().unwrap().push(format!("fetch:{url}"));
        std::future::pending().await
    }
}

async fn wait_until(events: &Mutex<Vec<String>>, seen: impl Fn(&str) -> bool) {
    loop {
        if events.lock().unwrap().iter().any(|e| seen(e)) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

fn config(save_root: &Path) -> HarvestConfig {
    HarvestConfig {
        mission: Mission::Curiosity,
        save_root: save_root.to_path_buf(),
        from_page: 1,
        to_page: u32::MAX,
        force: false,
        workers: 3,
        save_mode: SaveMode::AsIs,
        quality: 0.0,
        stop_after_already_downloaded_pages: None,
    }
}

fn harvester(config: HarvestConfig, catalog: FakeCatalog) -> Harvester<FakeCatalog> {
    let fetcher = Arc::new(FakeFetcher {
        events: catalog.events.clone(),
    });
    Harvester::new(config, catalog, fetcher)
}

#[tokio::test]
async fn harvests_every_image_of_every_page() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = FakeCatalog::uniform(3, 4);

    let report = harvester(config(dir.path()), catalog).run().await.unwrap();

    assert_eq!(report.downloaded, 12);
    assert!(!report.interrupted);
    for page in 1..=3 {
        for i in 0..4 {
            let path = saved_path(dir.path(), page, i);
            assert_eq!(std::fs::read(&path).unwrap(), IMAGE_BYTES);
        }
    }
}

#[tokio::test]
async fn second_run_downloads_nothing() {
    let dir = tempfile::tempdir().unwrap();

    let first = harvester(config(dir.path()), FakeCatalog::uniform(2, 3))
        .run()
        .await
        .unwrap();
    assert_eq!(first.downloaded, 6);

    let second = harvester(config(dir.path()), FakeCatalog::uniform(2, 3))
        .run()
        .await
        .unwrap();
    assert_eq!(second.downloaded, 0);
}

#[tokio::test]
async fn force_overrides_idempotence() {
    let dir = tempfile::tempdir().unwrap();

    harvester(config(dir.path()), FakeCatalog::uniform(2, 3))
        .run()
        .await
        .unwrap();

    let mut forced = config(dir.path());
    forced.force = true;
    let report = harvester(forced, FakeCatalog::uniform(2, 3))
        .run()
        .await
        .unwrap();
    assert_eq!(report.downloaded, 6);
}

#[tokio::test]
async fn to_page_caps_the_page_range() {
    let dir = tempfile::tempdir().unwrap();
    let mut capped = config(dir.path());
    capped.to_page = 1;

    let report = harvester(capped, FakeCatalog::uniform(3, 2))
        .run()
        .await
        .unwrap();

    assert_eq!(report.downloaded, 2);
    assert!(!saved_path(dir.path(), 2, 0).exists());
}

#[tokio::test]
async fn zero_page_count_reinitializes_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = FakeCatalog::uniform(1, 1);
    catalog.empty_counts.store(2, Ordering::Relaxed);
    let restarts = catalog.restarts.clone();

    let report = harvester(config(dir.path()), catalog).run().await.unwrap();

    assert_eq!(report.downloaded, 1);
    // One restart per empty count, plus the one that got a usable count.
    assert_eq!(restarts.load(Ordering::Relaxed), 3);
}

#[tokio::test]
async fn stops_after_consecutive_already_downloaded_pages() {
    let dir = tempfile::tempdir().unwrap();

    // Pre-populate pages 1 and 2 in full.
    for page in 1..=2 {
        for i in 0..2 {
            let path = saved_path(dir.path(), page, i);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, IMAGE_BYTES).unwrap();
        }
    }

    let catalog = FakeCatalog::uniform(4, 2);
    let events = catalog.events.clone();
    let mut stopping = config(dir.path());
    stopping.stop_after_already_downloaded_pages = Some(2);

    let report = harvester(stopping, catalog).run().await.unwrap();

    assert_eq!(report.downloaded, 0);
    let events = events.lock().unwrap();
    assert!(events.contains(&"page:2".to_string()));
    assert!(!events.contains(&"page:3".to_string()));
}

#[tokio::test]
async fn a_new_download_resets_the_early_stop_counter() {
    let dir = tempfile::tempdir().unwrap();

    // Pages 1, 3 and 4 fully present; page 2 is missing one image.
    for page in [1, 3, 4] {
        for i in 0..2 {
            let path = saved_path(dir.path(), page, i);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, IMAGE_BYTES).unwrap();
        }
    }
    let partial = saved_path(dir.path(), 2, 0);
    std::fs::create_dir_all(partial.parent().unwrap()).unwrap();
    std::fs::write(&partial, IMAGE_BYTES).unwrap();

    let catalog = FakeCatalog::uniform(5, 2);
    let events = catalog.events.clone();
    let mut stopping = config(dir.path());
    stopping.stop_after_already_downloaded_pages = Some(2);

    let report = harvester(stopping, catalog).run().await.unwrap();

    // Page 2's download resets the counter, so the run reaches page 4
    // before two consecutive full pages (3 and 4) stop it.
    assert_eq!(report.downloaded, 1);
    let events = events.lock().unwrap();
    assert!(events.contains(&"page:4".to_string()));
    assert!(!events.contains(&"page:5".to_string()));
}

#[tokio::test]
async fn an_interrupt_while_navigating_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = FakeCatalog::uniform(3, 2);
    catalog.hang_on_page.store(2, Ordering::Relaxed);
    let events = catalog.events.clone();

    let interrupt = CancellationToken::new();
    let run = tokio::spawn(harvester(config(dir.path()), catalog).run_cancellable(interrupt.clone()));

    // Page 1 drains its barrier, then navigation to page 2 wedges; the
    // interrupt must be observed with no download barrier in flight.
    wait_until(&events, |e| e == "page:2").await;
    interrupt.cancel();

    let report = run.await.unwrap().unwrap();
    assert!(report.interrupted);
    assert_eq!(report.downloaded, 2);
}

#[tokio::test]
async fn an_interrupt_aborts_the_in_flight_download_barrier() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = FakeCatalog::uniform(2, 3);
    let events = catalog.events.clone();
    let fetcher = Arc::new(StalledFetcher {
        events: events.clone(),
    });

    let interrupt = CancellationToken::new();
    let run = tokio::spawn(
        Harvester::new(config(dir.path()), catalog, fetcher).run_cancellable(interrupt.clone()),
    );

    wait_until(&events, |e| e.starts_with("fetch:")).await;
    interrupt.cancel();

    let report = run.await.unwrap().unwrap();
    assert!(report.interrupted);
    assert_eq!(report.downloaded, 0);
    assert!(!events.lock().unwrap().contains(&"page:2".to_string()));
}

#[tokio::test]
async fn no_download_of_a_page_starts_before_the_previous_page_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = FakeCatalog::uniform(3, 5);
    let events = catalog.events.clone();

    harvester(config(dir.path()), catalog).run().await.unwrap();

    // Every fetch recorded between "page:N" and "page:N+1" must belong
    // to page N: the coordinator drains each page's tasks before moving.
    let events = events.lock().unwrap();
    let mut current_page = 0u32;
    for event in events.iter() {
        if let Some(page) = event.strip_prefix("page:") {
            current_page = page.parse().unwrap();
        } else if let Some(url) = event.strip_prefix("fetch:") {
            assert!(
                url.contains(&format!("/0300{current_page}/")),
                "fetch of '{url}' observed while page {current_page} was in flight"
            );
        }
    }
}
