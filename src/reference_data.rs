//! Hand-curated lookup tables.
//!
//! The tables are plain CSV so they can be edited without touching the
//! resolution logic. Bundled copies are compiled in and used whenever no
//! path is configured.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::models::{normalize_ticker, Config};

const DEFAULT_SECTOR_OVERRIDES: &str = include_str!("../data/sector_overrides.csv");
const DEFAULT_INDEX_SECTORS: &str = include_str!("../data/index_sectors.csv");
const DEFAULT_TICKER_MAPPING: &str = include_str!("../data/ticker_mapping.csv");

#[derive(Debug, Deserialize)]
struct OverrideRow {
    ticker: String,
    sector: String,
}

#[derive(Debug, Deserialize)]
struct IndexSectorRow {
    index_code: String,
    sector: String,
}

#[derive(Debug, Deserialize)]
struct MappingRow {
    ticker: String,
    feed_symbol: String,
}

/// Ticker -> sector entries that always win over cached or scraped data
#[derive(Debug, Clone, Default)]
pub struct SectorOverrides {
    entries: HashMap<String, String>,
}

impl SectorOverrides {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (normalize_ticker(k.as_ref()), v.into()))
                .collect(),
        }
    }

    pub fn from_csv(text: &str) -> Result<Self> {
        let rows: Vec<OverrideRow> = read_rows(text)?;
        Ok(Self::from_pairs(rows.into_iter().map(|r| (r.ticker, r.sector))))
    }

    pub fn get(&self, ticker: &str) -> Option<&str> {
        self.entries.get(ticker).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered index-code -> sector table; order decides which code is tried first
#[derive(Debug, Clone, Default)]
pub struct IndexSectorTable {
    entries: Vec<(String, String)>,
}

impl IndexSectorTable {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.as_ref().trim().to_uppercase(), v.into()))
                .collect(),
        }
    }

    pub fn from_csv(text: &str) -> Result<Self> {
        let rows: Vec<IndexSectorRow> = read_rows(text)?;
        Ok(Self::from_pairs(rows.into_iter().map(|r| (r.index_code, r.sector))))
    }

    /// Sector of the first table code contained in `index_name`.
    pub fn match_index(&self, index_name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(code, _)| index_name.contains(code.as_str()))
            .map(|(_, sector)| sector.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Local ticker -> price feed symbol corrections
#[derive(Debug, Clone)]
pub struct TickerMapping {
    entries: HashMap<String, String>,
    suffix: String,
}

impl TickerMapping {
    pub fn from_pairs<I, K, V>(pairs: I, suffix: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (normalize_ticker(k.as_ref()), v.as_ref().trim().to_string()))
                .collect(),
            suffix: suffix.to_string(),
        }
    }

    pub fn from_csv(text: &str, suffix: &str) -> Result<Self> {
        let rows: Vec<MappingRow> = read_rows(text)?;
        Ok(Self::from_pairs(
            rows.into_iter().map(|r| (r.ticker, r.feed_symbol)),
            suffix,
        ))
    }

    /// Exchange-qualified feed symbol for a local ticker
    pub fn feed_symbol(&self, ticker: &str) -> String {
        let base = self.entries.get(ticker).map(String::as_str).unwrap_or(ticker);
        format!("{}{}", base, self.suffix)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All tables the resolver and the refresher need
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub overrides: SectorOverrides,
    pub index_sectors: IndexSectorTable,
    pub ticker_mapping: TickerMapping,
}

impl ReferenceData {
    /// Bundled tables
    pub fn builtin(feed_suffix: &str) -> Result<Self> {
        Ok(Self {
            overrides: SectorOverrides::from_csv(DEFAULT_SECTOR_OVERRIDES)?,
            index_sectors: IndexSectorTable::from_csv(DEFAULT_INDEX_SECTORS)?,
            ticker_mapping: TickerMapping::from_csv(DEFAULT_TICKER_MAPPING, feed_suffix)?,
        })
    }

    /// Tables from the configured files, bundled copies for any path left unset
    pub fn load(config: &Config) -> Result<Self> {
        let overrides = SectorOverrides::from_csv(&read_table(
            config.sector_overrides_path.as_deref(),
            DEFAULT_SECTOR_OVERRIDES,
        )?)?;
        let index_sectors = IndexSectorTable::from_csv(&read_table(
            config.index_sectors_path.as_deref(),
            DEFAULT_INDEX_SECTORS,
        )?)?;
        let ticker_mapping = TickerMapping::from_csv(
            &read_table(config.ticker_mapping_path.as_deref(), DEFAULT_TICKER_MAPPING)?,
            &config.feed_symbol_suffix,
        )?;

        info!(
            "Loaded reference data: {} overrides, {} index codes, {} ticker corrections",
            overrides.len(),
            index_sectors.len(),
            ticker_mapping.len()
        );

        Ok(Self { overrides, index_sectors, ticker_mapping })
    }
}

fn read_table(path: Option<&Path>, bundled: &str) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read table {}", path.display())),
        None => Ok(bundled.to_string()),
    }
}

fn read_rows<T: serde::de::DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}
