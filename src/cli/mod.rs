//! Command-line surface.

use std::path::PathBuf;

use anyhow::Context;
use clap::builder::TypedValueParser as _;
use clap::Parser;

use crate::config::{HarvestConfig, DEFAULT_DOWNLOAD_WORKERS};
use crate::image::SaveMode;
use crate::mission::Mission;

/// Mars rovers raw images harvester command.
#[derive(Debug, Parser)]
#[command(name = "mars-harvester", version, about)]
pub struct Cli {
    /// Name of the Mars mission
    #[arg(short = 'm', long, value_enum)]
    pub mission: Mission,

    /// Root directory in which the images are saved
    #[arg(short = 'd', long = "dir")]
    pub dir: String,

    /// Harvesting starts from this page
    #[arg(short = 'f', long = "from-page", default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub from_page: u32,

    /// Harvesting stops at this page (default is the last page)
    #[arg(short = 't', long = "to-page",
          value_parser = clap::value_parser!(u32).range(1..))]
    pub to_page: Option<u32>,

    /// Force harvesting already downloaded images
    #[arg(long)]
    pub force: bool,

    /// Harvesting stops after the nth consecutive page which is already
    /// fully downloaded
    #[arg(short = 's', long = "stop-after-already-downloaded-pages",
          value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub stop_after_already_downloaded_pages: Option<u32>,

    /// Number of threads to download the images
    #[arg(long = "threads", default_value_t = DEFAULT_DOWNLOAD_WORKERS,
          value_parser = clap::value_parser!(u64).range(1..).map(|n| n as usize))]
    pub threads: usize,

    /// Convert the downloaded images to JPG format with the given
    /// compression ratio (default is not to convert)
    #[arg(long = "convert-to-jpg", value_name = "RATIO",
          value_parser = clap::value_parser!(u32).range(1..=100))]
    pub convert_to_jpg: Option<u32>,

    /// Path to the chromium binary used for page rendering
    #[arg(long = "chrome", env = "MARS_HARVESTER_CHROME")]
    pub chrome: Option<PathBuf>,

    /// Path to the config file
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Validate the flags into an immutable run configuration.
    pub fn harvest_config(&self) -> anyhow::Result<HarvestConfig> {
        let save_root = PathBuf::from(shellexpand::tilde(&self.dir).as_ref());
        if !save_root.is_dir() {
            anyhow::bail!("save directory '{}' does not exist", save_root.display());
        }
        let metadata = std::fs::metadata(&save_root)
            .with_context(|| format!("save directory '{}' is not readable", save_root.display()))?;
        if metadata.permissions().readonly() {
            anyhow::bail!("save directory '{}' is not writable", save_root.display());
        }

        let (save_mode, quality) = match self.convert_to_jpg {
            Some(ratio) => (SaveMode::ConvertToJpg, ratio as f32 / 100.0),
            None => (SaveMode::AsIs, 0.0),
        };

        Ok(HarvestConfig {
            mission: self.mission,
            save_root,
            from_page: self.from_page,
            to_page: self.to_page.unwrap_or(u32::MAX),
            force: self.force,
            workers: self.threads,
            save_mode,
            quality,
            stop_after_already_downloaded_pages: self.stop_after_already_downloaded_pages,
        })
    }
}

/// Run a harvest from parsed flags.
#[cfg(feature = "browser")]
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    use std::sync::Arc;

    use console::style;

    use crate::config::Settings;

    let config = cli.harvest_config()?;
    let settings = Settings::load(cli.chrome.clone(), cli.config.as_deref());

    let source = crate::browser::ChromePageSource::new(config.mission, settings.chrome_binary);
    let fetcher = Arc::new(crate::fetch::HttpFetcher::new()?);
    let report = crate::harvest::Harvester::new(config, source, fetcher)
        .run()
        .await?;

    if report.interrupted {
        println!(
            "{} Harvest interrupted; {} images downloaded",
            style("!").yellow(),
            report.downloaded
        );
    } else {
        println!(
            "{} {} images downloaded",
            style("✓").green(),
            report.downloaded
        );
    }
    Ok(())
}

#[cfg(not(feature = "browser"))]
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    cli.harvest_config()?;
    anyhow::bail!("built without the `browser` feature; no page source is available")
}
