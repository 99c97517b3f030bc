use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

use crate::models::{Constituent, DailyBar};

pub mod biznesradar_client;
pub mod gpw_client;
pub mod yahoo_client;

pub use biznesradar_client::BiznesradarClient;
pub use gpw_client::GpwBenchmarkClient;
pub use yahoo_client::YahooChartClient;

/// Browser-like agent; the scraped sites reject obvious bots
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Failures talking to an external source
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected response shape: {0}")]
    Shape(String),
}

/// Fixed pause between consecutive requests to the same site
pub struct CourtesyDelay {
    delay: Duration,
}

impl CourtesyDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Batched daily bars for exchange-qualified symbols.
///
/// Symbols the feed could not serve are simply absent from the map; only a
/// failure affecting the whole batch is returned as an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn fetch_daily_bars(&self, symbols: &[String]) -> Result<HashMap<String, DailyBar>, FetchError>;
}

/// Company profile pages used to infer sector membership
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClassificationSource: Send + Sync {
    /// Raw HTML of the profile page, `None` when the site has no page for the ticker
    async fn fetch_profile(&self, ticker: &str) -> Result<Option<String>, FetchError>;
}

/// Current index composition (ticker and weight)
#[async_trait]
pub trait CompositionSource: Send + Sync {
    async fn fetch_composition(&self) -> Result<Vec<Constituent>, FetchError>;
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<Client, FetchError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(BROWSER_USER_AGENT)
        .build()?)
}
