//! Harvester for the raw images taken by the Curiosity and Perseverance
//! Mars rovers, as published on the NASA raw-image catalogs:
//!
//! - Curiosity: <https://mars.nasa.gov/msl/multimedia/raw-images/>
//! - Perseverance: <https://mars.nasa.gov/mars2020/multimedia/raw-images/>
//!
//! The catalogs are JavaScript-rendered and paginated. A browser session
//! (the [`browser`] module, behind the default `browser` feature) renders
//! each page; the [`harvest`] coordinator walks the pages, resolving each
//! thumbnail to its full-resolution URL through the per-mission rules in
//! [`mission`] and downloading it to a deterministic local layout, with
//! optional PNG -> JPEG conversion in [`image`].

#[cfg(feature = "browser")]
pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod harvest;
pub mod image;
pub mod mission;

pub use config::HarvestConfig;
pub use error::HarvestError;
pub use harvest::{Harvester, HarvestReport};
pub use mission::Mission;
