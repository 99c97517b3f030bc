use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Sector assigned to a constituent before (or instead of) a successful resolution.
pub const UNKNOWN_SECTOR: &str = "Inne / Nieznany";

/// Normalize a ticker to its canonical key form.
pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

/// One member of the tracked index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constituent {
    pub ticker: String,
    pub share: f64,
    pub price: f64,
    pub change_pct: f64,
    pub turnover: f64,
    pub sector: String,
    /// Display name from the composition page, not persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isin: Option<String>,
}

impl Constituent {
    /// A freshly listed constituent with no market data yet.
    pub fn new(ticker: &str, share: f64) -> Self {
        Self {
            ticker: normalize_ticker(ticker),
            share: share.max(0.0),
            price: 0.0,
            change_pct: 0.0,
            turnover: 0.0,
            sector: UNKNOWN_SECTOR.to_string(),
            name: None,
            isin: None,
        }
    }

    pub fn has_known_sector(&self) -> bool {
        self.sector != UNKNOWN_SECTOR
    }
}

/// Knowledge-base entry mapping a ticker to its sector
#[derive(Debug, Clone, PartialEq)]
pub struct SectorRecord {
    pub ticker: String,
    pub sector: String,
    pub updated_at: DateTime<Utc>,
}

/// The full current set of constituents as persisted
#[derive(Debug, Clone, Default)]
pub struct PortfolioSnapshot {
    pub constituents: Vec<Constituent>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PortfolioSnapshot {
    pub fn is_empty(&self) -> bool {
        self.constituents.is_empty()
    }

    pub fn total_share(&self) -> f64 {
        self.constituents.iter().map(|c| c.share).sum()
    }
}

/// One OHLCV bar from the price feed
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DailyBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl DailyBar {
    /// A bar is usable when its close is a positive price and the
    /// fields the refresher reads are finite numbers.
    pub fn is_valid(&self) -> bool {
        self.close.is_finite()
            && self.close > 0.0
            && self.open.is_finite()
            && self.volume.is_finite()
            && self.volume >= 0.0
    }
}

/// Outcome of a single refresh cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub tickers: usize,
    pub requested_symbols: usize,
    pub updated: usize,
    pub missing_symbols: Vec<String>,
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub refresh_interval: Duration,
    pub dashboard_poll_interval: Duration,
    pub feed_base_url: String,
    pub feed_symbol_suffix: String,
    pub feed_concurrency: usize,
    pub feed_timeout: Duration,
    pub classification_base_url: String,
    pub scrape_delay: Duration,
    pub composition_url: String,
    pub sector_overrides_path: Option<PathBuf>,
    pub index_sectors_path: Option<PathBuf>,
    pub ticker_mapping_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "wig_data.db".to_string(),
            refresh_interval: Duration::from_secs(30),
            dashboard_poll_interval: Duration::from_secs(5),
            feed_base_url: "https://query1.finance.yahoo.com".to_string(),
            feed_symbol_suffix: ".WA".to_string(),
            feed_concurrency: 8,
            feed_timeout: Duration::from_secs(10),
            classification_base_url: "https://www.biznesradar.pl".to_string(),
            scrape_delay: Duration::from_millis(500),
            composition_url: "https://gpwbenchmark.pl/karta-indeksu?isin=PL9999999060".to_string(),
            sector_overrides_path: None,
            index_sectors_path: None,
            ticker_mapping_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let defaults = Config::default();

        let config = Config {
            database_path: std::env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
            refresh_interval: env_seconds("REFRESH_INTERVAL_SECS", 30),
            dashboard_poll_interval: env_seconds("DASHBOARD_POLL_SECS", 5),
            feed_base_url: std::env::var("FEED_BASE_URL").unwrap_or(defaults.feed_base_url),
            feed_symbol_suffix: std::env::var("FEED_SYMBOL_SUFFIX")
                .unwrap_or(defaults.feed_symbol_suffix),
            feed_concurrency: env_parse("FEED_CONCURRENCY", 8).max(1),
            feed_timeout: env_seconds("FEED_TIMEOUT_SECS", 10),
            classification_base_url: std::env::var("CLASSIFICATION_BASE_URL")
                .unwrap_or(defaults.classification_base_url),
            scrape_delay: Duration::from_millis(env_parse("SCRAPE_DELAY_MS", 500)),
            composition_url: std::env::var("COMPOSITION_URL").unwrap_or(defaults.composition_url),
            sector_overrides_path: std::env::var("SECTOR_OVERRIDES_PATH").ok().map(PathBuf::from),
            index_sectors_path: std::env::var("INDEX_SECTORS_PATH").ok().map(PathBuf::from),
            ticker_mapping_path: std::env::var("TICKER_MAPPING_PATH").ok().map(PathBuf::from),
        };

        for (name, value) in [
            ("FEED_BASE_URL", &config.feed_base_url),
            ("CLASSIFICATION_BASE_URL", &config.classification_base_url),
            ("COMPOSITION_URL", &config.composition_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| anyhow::anyhow!("{} is not a valid URL ({}): {}", name, value, e))?;
        }

        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Whole seconds, never below one
fn env_seconds(key: &str, default: u64) -> Duration {
    Duration::from_secs(env_parse(key, default).max(1))
}
