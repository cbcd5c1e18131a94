//! Page-by-page iteration with an optional cross-query item quota.

use std::future::Future;

use super::ScrapeError;

/// Drives a `fetch_page(page) -> (items, has_more)` callback.
///
/// Iteration stops when the callback reports no further pages, when a page
/// comes back empty, or when the page cap is reached. With a quota set, the
/// yielded-item count carries over across successive `run` calls on the same
/// driver, so a multi-term scrape never exceeds the quota in total; the final
/// page is truncated to exactly fill what remains.
pub struct PageDriver {
    max_pages: u32,
    quota: Option<usize>,
    yielded: usize,
}

impl PageDriver {
    /// Create a driver with a page cap and an optional total item quota.
    pub fn new(max_pages: u32, quota: Option<usize>) -> Self {
        Self {
            max_pages,
            quota,
            yielded: 0,
        }
    }

    /// Whether the quota is already exhausted.
    pub fn exhausted(&self) -> bool {
        match self.quota {
            Some(q) => self.yielded >= q,
            None => false,
        }
    }

    /// Total items yielded so far, across all `run` calls.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Page through one query, invoking `fetch_page` with 1-based page
    /// numbers and collecting items until a stop condition is hit.
    pub async fn run<T, F, Fut>(&mut self, mut fetch_page: F) -> Result<Vec<T>, ScrapeError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(Vec<T>, bool), ScrapeError>>,
    {
        let mut collected = Vec::new();

        for page in 1..=self.max_pages {
            if self.exhausted() {
                break;
            }

            let (mut items, has_more) = fetch_page(page).await?;
            if items.is_empty() {
                break;
            }

            if let Some(quota) = self.quota {
                let remaining = quota - self.yielded;
                if items.len() > remaining {
                    items.truncate(remaining);
                }
            }

            self.yielded += items.len();
            collected.extend(items);

            if !has_more || self.exhausted() {
                break;
            }
        }

        Ok(collected)
    }
}
