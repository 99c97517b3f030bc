use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::{build_http_client, FetchError, PriceFeed};
use crate::models::{Config, DailyBar};

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Daily bars from a Yahoo-style chart endpoint
pub struct YahooChartClient {
    client: Client,
    base_url: String,
    concurrency: usize,
}

impl YahooChartClient {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_http_client(config.feed_timeout)?,
            base_url: config.feed_base_url.trim_end_matches('/').to_string(),
            concurrency: config.feed_concurrency.max(1),
        })
    }

    async fn fetch_symbol(&self, symbol: &str) -> Result<Option<DailyBar>, FetchError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        debug!("Requesting {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("range", "1d"), ("interval", "1d")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status { url, status: response.status().as_u16() });
        }

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Shape(format!("{}: {}", symbol, e)))?;

        Ok(body
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .and_then(|result| result.indicators.quote.into_iter().next())
            .and_then(|series| last_complete_bar(&series)))
    }
}

/// Latest bar with every OHLCV field present
fn last_complete_bar(series: &QuoteSeries) -> Option<DailyBar> {
    let len = series.close.len();
    (0..len).rev().find_map(|i| {
        Some(DailyBar {
            open: (*series.open.get(i)?)?,
            high: (*series.high.get(i)?)?,
            low: (*series.low.get(i)?)?,
            close: (*series.close.get(i)?)?,
            volume: (*series.volume.get(i)?)?,
        })
    })
}

#[async_trait]
impl PriceFeed for YahooChartClient {
    /// One call for the whole symbol set; requests fan out with bounded concurrency
    async fn fetch_daily_bars(&self, symbols: &[String]) -> Result<HashMap<String, DailyBar>, FetchError> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }

        let results: Vec<(String, Result<Option<DailyBar>, FetchError>)> = stream::iter(symbols.iter().cloned())
            .map(|symbol| async move {
                let result = self.fetch_symbol(&symbol).await;
                (symbol, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut bars = HashMap::new();
        let mut transport_failures = 0;
        let mut last_transport_error = None;

        for (symbol, result) in results {
            match result {
                Ok(Some(bar)) => {
                    bars.insert(symbol, bar);
                }
                Ok(None) => debug!("No bar for {}", symbol),
                Err(FetchError::Transport(e)) => {
                    warn!("Price request for {} failed: {}", symbol, e);
                    transport_failures += 1;
                    last_transport_error = Some(e);
                }
                Err(e) => warn!("Price request for {} failed: {}", symbol, e),
            }
        }

        // Every symbol failing at the transport level means the feed itself is unreachable
        if transport_failures == symbols.len() {
            if let Some(e) = last_transport_error {
                return Err(FetchError::Transport(e));
            }
        }

        debug!("Retrieved {} bars for {} symbols", bars.len(), symbols.len());
        Ok(bars)
    }
}
