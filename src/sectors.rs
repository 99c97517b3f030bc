//! Sector resolution
//!
//! Precedence, first hit wins:
//! 1. static overrides (also written to the knowledge base)
//! 2. knowledge base
//! 3. live inference from the company's profile page (persisted)
//! 4. [`UNKNOWN_SECTOR`], never persisted so it is retried next time

use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::{ClassificationSource, CourtesyDelay};
use crate::database::PortfolioStore;
use crate::models::{normalize_ticker, Constituent, UNKNOWN_SECTOR};
use crate::reference_data::{IndexSectorTable, SectorOverrides};

/// Where a resolved sector came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorOrigin {
    Override,
    KnowledgeBase,
    Inferred,
    Fallback,
}

/// Counts from one [`SectorResolver::enrich_all`] pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub overrides: usize,
    pub cached: usize,
    pub inferred: usize,
    pub unknown: usize,
}

const PROGRESS_EVERY: usize = 20;

pub struct SectorResolver {
    store: Arc<dyn PortfolioStore>,
    source: Arc<dyn ClassificationSource>,
    overrides: SectorOverrides,
    index_sectors: IndexSectorTable,
    courtesy: CourtesyDelay,
}

impl SectorResolver {
    pub fn new(
        store: Arc<dyn PortfolioStore>,
        source: Arc<dyn ClassificationSource>,
        overrides: SectorOverrides,
        index_sectors: IndexSectorTable,
        scrape_delay: Duration,
    ) -> Self {
        Self {
            store,
            source,
            overrides,
            index_sectors,
            courtesy: CourtesyDelay::new(scrape_delay),
        }
    }

    /// Sector for `ticker`; never fails
    pub async fn resolve(&self, ticker: &str) -> String {
        self.resolve_with_origin(ticker).await.0
    }

    pub async fn resolve_with_origin(&self, ticker: &str) -> (String, SectorOrigin) {
        let ticker = normalize_ticker(ticker);

        if let Some(sector) = self.overrides.get(&ticker) {
            self.persist(&ticker, sector).await;
            return (sector.to_string(), SectorOrigin::Override);
        }

        match self.store.get_sector(&ticker).await {
            Ok(Some(sector)) => return (sector, SectorOrigin::KnowledgeBase),
            Ok(None) => {}
            Err(e) => warn!("Knowledge base lookup for {} failed: {}", ticker, e),
        }

        info!("Inferring sector for new company {}", ticker);
        if let Some(sector) = self.infer(&ticker).await {
            info!("{} -> {}", ticker, sector);
            self.persist(&ticker, &sector).await;
            self.courtesy.wait().await;
            return (sector, SectorOrigin::Inferred);
        }

        debug!("No sector found for {}", ticker);
        (UNKNOWN_SECTOR.to_string(), SectorOrigin::Fallback)
    }

    /// Resolve sectors in order, writing each result into its constituent
    pub async fn enrich_all(&self, constituents: &mut [Constituent]) -> EnrichSummary {
        let total = constituents.len();
        let mut summary = EnrichSummary::default();
        info!("Updating sector knowledge for {} companies", total);

        for (i, constituent) in constituents.iter_mut().enumerate() {
            let (sector, origin) = self.resolve_with_origin(&constituent.ticker).await;
            constituent.sector = sector;

            match origin {
                SectorOrigin::Override => summary.overrides += 1,
                SectorOrigin::KnowledgeBase => summary.cached += 1,
                SectorOrigin::Inferred => summary.inferred += 1,
                SectorOrigin::Fallback => summary.unknown += 1,
            }

            if i % PROGRESS_EVERY == 0 {
                info!("Processed {}/{}", i, total);
            }
        }

        info!(
            "Sector analysis finished: {} overrides, {} cached, {} inferred, {} unknown",
            summary.overrides, summary.cached, summary.inferred, summary.unknown
        );
        summary
    }

    async fn infer(&self, ticker: &str) -> Option<String> {
        match self.source.fetch_profile(ticker).await {
            Ok(Some(html)) => infer_sector_from_html(&html, &self.index_sectors),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to fetch sector for {}: {}", ticker, e);
                None
            }
        }
    }

    async fn persist(&self, ticker: &str, sector: &str) {
        if let Err(e) = self.store.upsert_sector(ticker, sector).await {
            warn!("Could not save sector for {}: {}", ticker, e);
        }
    }
}

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
    })
}

/// Sector of the first index-membership link, in document order.
///
/// Links look like `.../indeks:WIG-GRY,...`; the code after `indeks:` up to
/// the first comma is matched against the index table.
pub fn infer_sector_from_html(html: &str, index_sectors: &IndexSectorTable) -> Option<String> {
    href_re()
        .captures_iter(html)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str())
        .filter(|href| href.contains("indeks:WIG-") || href.contains("indeks:WIG."))
        .find_map(|href| {
            let (_, rest) = href.split_once("indeks:")?;
            let index_name = rest.split(',').next().unwrap_or(rest).to_uppercase();
            index_sectors.match_index(&index_name).map(str::to_string)
        })
}
