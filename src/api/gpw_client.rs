use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use super::{build_http_client, CompositionSource, FetchError};
use crate::models::{Config, Constituent};

/// Index portfolio page from GPW Benchmark
pub struct GpwBenchmarkClient {
    client: Client,
    url: String,
}

impl GpwBenchmarkClient {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_http_client(config.feed_timeout * 3)?,
            url: config.composition_url.clone(),
        })
    }
}

#[async_trait]
impl CompositionSource for GpwBenchmarkClient {
    async fn fetch_composition(&self) -> Result<Vec<Constituent>, FetchError> {
        info!("Fetching index composition from {}", self.url);

        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: response.status().as_u16(),
            });
        }

        let html = response.text().await?;
        let constituents = parse_portfolio_table(&html);
        if constituents.is_empty() {
            return Err(FetchError::Shape("no portfolio table found".to_string()));
        }

        info!("Parsed {} constituents", constituents.len());
        Ok(constituents)
    }
}

fn table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<table\b.*?</table>").expect("valid regex"))
}

fn row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<tr\b.*?</tr>").expect("valid regex"))
}

fn cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<(td|th)\b[^>]*>(.*?)</(?:td|th)>").expect("valid regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"))
}

fn cell_text(inner: &str) -> String {
    let text = tag_re().replace_all(inner, "");
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Constituents from the first table whose header mentions weights or names.
///
/// Data rows need at least five cells: name (0), ISIN (1) and share (4),
/// the share written with a decimal comma.
pub fn parse_portfolio_table(html: &str) -> Vec<Constituent> {
    let table = table_re().find_iter(html).map(|m| m.as_str()).find(|table| {
        cell_re()
            .captures_iter(table)
            .filter(|c| c[1].eq_ignore_ascii_case("th"))
            .map(|c| cell_text(&c[2]))
            .any(|h| h.contains("Udzia") || h.contains("Nazwa"))
    });

    let Some(table) = table else {
        warn!("Could not find the portfolio table");
        return Vec::new();
    };

    let mut constituents = Vec::new();
    for row in row_re().find_iter(table) {
        let cells: Vec<String> = cell_re()
            .captures_iter(row.as_str())
            .filter(|c| c[1].eq_ignore_ascii_case("td"))
            .map(|c| cell_text(&c[2]))
            .collect();

        if cells.len() < 5 || cells[0].is_empty() {
            continue;
        }

        let share = cells[4].replace(',', ".").parse::<f64>().unwrap_or(0.0);
        let mut constituent = Constituent::new(&cells[0], share);
        constituent.name = Some(cells[0].clone());
        constituent.isin = Some(cells[1].clone()).filter(|s| !s.is_empty());
        constituents.push(constituent);
    }

    debug!("Portfolio table yielded {} rows", constituents.len());
    constituents
}
