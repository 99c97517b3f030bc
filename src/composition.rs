//! Index composition updates
//!
//! The basket changes only at quarterly revisions, so a download is made when
//! the last installed composition predates the latest revision (or when forced).
//! Price refreshes rewrite the snapshot rows but never the composition time.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::CompositionSource;
use crate::database::PortfolioStore;
use crate::models::Constituent;
use crate::sectors::{EnrichSummary, SectorResolver};
use crate::utils::RevisionCalendar;

/// What [`CompositionUpdater::ensure_current`] did
#[derive(Debug, Clone, PartialEq)]
pub enum CompositionOutcome {
    /// Stored composition is newer than the last revision
    UpToDate,
    /// A fresh composition replaced the snapshot
    Updated { constituents: usize, sectors: EnrichSummary },
    /// Download failed; the previous snapshot was kept
    KeptPrevious { constituents: usize },
}

pub struct CompositionUpdater {
    store: Arc<dyn PortfolioStore>,
    source: Arc<dyn CompositionSource>,
    resolver: Arc<SectorResolver>,
}

impl CompositionUpdater {
    pub fn new(
        store: Arc<dyn PortfolioStore>,
        source: Arc<dyn CompositionSource>,
        resolver: Arc<SectorResolver>,
    ) -> Self {
        Self { store, source, resolver }
    }

    pub async fn needs_update(&self, today: NaiveDate) -> Result<bool> {
        let last_update = self.store.last_composition_timestamp().await?;
        Ok(RevisionCalendar::should_update_portfolio(last_update, today))
    }

    /// Refresh the composition if the calendar (or `force`) says so
    pub async fn ensure_current(&self, force: bool) -> Result<CompositionOutcome> {
        let today = Utc::now().date_naive();
        if !force && !self.needs_update(today).await? {
            info!("Stored composition is current");
            return Ok(CompositionOutcome::UpToDate);
        }

        info!("Composition update required, downloading current basket");
        match self.source.fetch_composition().await {
            Ok(fresh) if !fresh.is_empty() => {
                let (count, sectors) = self.install(fresh).await?;
                Ok(CompositionOutcome::Updated { constituents: count, sectors })
            }
            Ok(_) => {
                warn!("Composition source returned no constituents, keeping stored snapshot");
                self.kept_previous().await
            }
            Err(e) => {
                warn!("Composition download failed ({}), keeping stored snapshot", e);
                self.kept_previous().await
            }
        }
    }

    /// Enrich with sectors, carry over known prices and replace the snapshot
    async fn install(&self, mut fresh: Vec<Constituent>) -> Result<(usize, EnrichSummary)> {
        let summary = self.resolver.enrich_all(&mut fresh).await;

        // Prices of tickers that stay in the basket are still valid
        let previous = self.store.load_snapshot().await.unwrap_or_default();
        for constituent in fresh.iter_mut() {
            if let Some(old) = previous.iter().find(|p| p.ticker == constituent.ticker) {
                constituent.price = old.price;
                constituent.change_pct = old.change_pct;
                constituent.turnover = old.turnover;
            }
        }

        self.store.replace_composition(&fresh, Utc::now()).await?;
        info!("Saved {} constituents", fresh.len());
        Ok((fresh.len(), summary))
    }

    async fn kept_previous(&self) -> Result<CompositionOutcome> {
        let constituents = self.store.load_snapshot().await?.len();
        Ok(CompositionOutcome::KeptPrevious { constituents })
    }
}
