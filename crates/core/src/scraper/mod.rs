//! Source adapters and the shared scraping primitives.
//!
//! Each platform adapter implements the `Scraper` trait. Adapters share the
//! request throttle and the page driver; everything they emit flows through
//! the catalog reconciler, never straight into storage.

mod abledata;
mod github;
mod pagination;
mod ravelry;
mod registry;
mod thingiverse;
mod throttle;
mod types;

pub use abledata::{AbledataConfig, AbledataScraper};
pub use github::{GithubConfig, GithubScraper};
pub use pagination::PageDriver;
pub use ravelry::{RavelryConfig, RavelryScraper};
pub use registry::ScraperRegistry;
pub use thingiverse::{ThingiverseConfig, ThingiverseScraper};
pub use throttle::Throttle;
pub use types::*;
