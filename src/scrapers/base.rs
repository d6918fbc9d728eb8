use crate::errors::Result;
use crate::models::raw::RawTable;
use async_trait::async_trait;
use chrono::NaiveDate;
use log::debug;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Source of the listed-company directory.
#[async_trait]
pub trait ListingSource {
    fn source_name(&self) -> &'static str;

    /// Current listing as labelled rows (`Code`, `Name`, `Close`, ...).
    async fn fetch_listing(&self, date: &NaiveDate) -> Result<RawTable>;
}

/// One page of a paginated daily price history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PricePage {
    pub table: RawTable,
    /// Last page number advertised by the page's pagination control, if any.
    pub last_page: Option<u32>,
}

/// Source of per-company daily price pages.
#[async_trait]
pub trait PriceSource {
    fn source_name(&self) -> &'static str;

    /// Fetches page `page` (1-based) of `code`'s history.
    async fn fetch_page(&self, code: &str, page: u32) -> Result<PricePage>;
}

/// Keeps a minimum interval between consecutive requests to one upstream.
pub struct RequestPacer {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(instant) = *last {
            let elapsed = instant.elapsed();
            if elapsed < self.interval {
                let wait_time = self.interval - elapsed;
                debug!("Waiting {:?} before next request", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        *last = Some(Instant::now());
    }
}
