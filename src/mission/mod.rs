//! Mission registry: per-catalog rules for URL and path resolution.
//!
//! Each Mars mission publishes its raw images on a differently shaped
//! catalog page, with its own pagination size and URL layout. The rules
//! here map a thumbnail URL to its full-resolution counterpart and a
//! full-resolution URL to the relative path it is saved under. Mapping
//! lookup is linear first-match over an ordered rule list.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{HarvestError, Result};
use crate::image::ImageFormat;

/// A named catalog variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mission {
    Curiosity,
    Perseverance,
}

/// One (URL pattern, substitution template) rule. Patterns are anchored;
/// a rule either matches the whole URL or not at all.
struct UrlRule {
    pattern: Regex,
    template: &'static str,
}

impl UrlRule {
    fn new(pattern: &str, template: &'static str) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("invalid mission rule pattern"),
            template,
        }
    }

    fn apply(&self, url: &str) -> Option<String> {
        if self.pattern.is_match(url) {
            Some(self.pattern.replace(url, self.template).into_owned())
        } else {
            None
        }
    }
}

/// Static per-mission configuration.
pub struct MissionRules {
    /// Base URL of the raw-images catalog page.
    pub catalog_url: &'static str,
    /// Number of images the catalog renders per page.
    pub images_per_page: u32,
    /// CSS selector for the pagination page-number input.
    pub pagination_selector: &'static str,
    /// Ordered full-size-URL -> relative-path rules, first match wins.
    path_rules: Vec<UrlRule>,
    /// Ordered thumbnail-URL -> full-size-URL rules, first match wins.
    thumbnail_rules: Vec<UrlRule>,
}

static CURIOSITY: LazyLock<MissionRules> = LazyLock::new(|| MissionRules {
    catalog_url: "https://mars.nasa.gov/msl/multimedia/raw-images/",
    images_per_page: 50,
    pagination_selector: "div#primary_column input.page_num",
    path_rules: vec![
        UrlRule::new(
            r"^https://.+/msss/(\d{5})/([a-zA-Z]+)/(.+)\.(jpg|JPG|png|PNG)$",
            "$1/$2/$3",
        ),
        UrlRule::new(
            r"^https://.+(?:/proj/msl/redops)?/ods/surface/sol/(\d{5})/([a-zA-Z]+)/([a-zA-Z]+)/([a-zA-Z]+)/(.+)\.(jpg|JPG|png|PNG)$",
            "$1/$2/$3/$4/$5",
        ),
    ],
    thumbnail_rules: vec![
        UrlRule::new(r"^(.+)-thm\.jpg$", "$1.JPG"),
        UrlRule::new(r"^(.+)\.PNG$", "$1.PNG"),
    ],
});

static PERSEVERANCE: LazyLock<MissionRules> = LazyLock::new(|| MissionRules {
    catalog_url: "https://mars.nasa.gov/mars2020/multimedia/raw-images/",
    images_per_page: 100,
    pagination_selector: "#header_pagination",
    path_rules: vec![UrlRule::new(
        r"^https://.+/pub/ods/surface/sol/(\d{5})/ids/([a-zA-Z]+)/browse/([a-zA-Z]+)/(.+)\.png$",
        "$1/$2/$3/$4",
    )],
    thumbnail_rules: vec![UrlRule::new(r"^(.+)_320\.jpg$", "$1.png")],
});

// Curiosity serves some images with an uppercase extension; the alternate
// URL toggles the case as a retry fallback.
static JPG_LOWER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+)\.jpg$").unwrap());
static JPG_UPPER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+)\.JPG$").unwrap());

impl Mission {
    pub fn rules(&self) -> &'static MissionRules {
        match self {
            Mission::Curiosity => &CURIOSITY,
            Mission::Perseverance => &PERSEVERANCE,
        }
    }

    pub fn catalog_url(&self) -> &'static str {
        self.rules().catalog_url
    }

    pub fn images_per_page(&self) -> u32 {
        self.rules().images_per_page
    }

    pub fn pagination_selector(&self) -> &'static str {
        self.rules().pagination_selector
    }

    /// Resolve a thumbnail URL to its full-resolution counterpart.
    pub fn full_size_url(&self, thumbnail_url: &str) -> Result<String> {
        self.rules()
            .thumbnail_rules
            .iter()
            .find_map(|rule| rule.apply(thumbnail_url))
            .ok_or_else(|| HarvestError::PatternMismatch {
                url: thumbnail_url.to_string(),
            })
    }

    /// Resolve the path a full-size image URL is saved under.
    ///
    /// Pure: identical inputs always yield an identical path, which is what
    /// makes the skip-if-exists check meaningful across runs.
    pub fn image_path(
        &self,
        image_url: &str,
        save_root: &Path,
        format: ImageFormat,
    ) -> Result<PathBuf> {
        let relative = self
            .rules()
            .path_rules
            .iter()
            .find_map(|rule| rule.apply(image_url))
            .ok_or_else(|| HarvestError::PatternMismatch {
                url: image_url.to_string(),
            })?;
        // Rule templates emit '/'-separated segments with the source
        // extension stripped; push them one by one so separators stay
        // portable, then append the target format's extension.
        let relative = format!("{}{}", relative, format.extension());
        let mut path = save_root.to_path_buf();
        for segment in relative.split('/') {
            path.push(segment);
        }
        Ok(path)
    }

    /// Single-step alternate-URL transform used as a retry fallback.
    /// Identity for missions without the extension-case quirk.
    pub fn alternate_url(&self, image_url: &str) -> String {
        match self {
            Mission::Curiosity => {
                if JPG_LOWER.is_match(image_url) {
                    JPG_LOWER.replace(image_url, "$1.JPG").into_owned()
                } else if JPG_UPPER.is_match(image_url) {
                    JPG_UPPER.replace(image_url, "$1.jpg").into_owned()
                } else {
                    image_url.to_string()
                }
            }
            Mission::Perseverance => image_url.to_string(),
        }
    }

    /// Ordered list of URLs the retry loop walks through: the original URL
    /// followed by repeated applications of the alternate transform.
    pub fn candidate_urls(&self, image_url: &str, attempts: usize) -> Vec<String> {
        let mut candidates = Vec::with_capacity(attempts);
        let mut url = image_url.to_string();
        for _ in 0..attempts {
            candidates.push(url.clone());
            url = self.alternate_url(&url);
        }
        candidates
    }
}
