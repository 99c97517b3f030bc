//! Market data refresh
//!
//! [`MarketDataRefresher::refresh_once`] runs one cycle: load the ticker
//! universe, translate to feed symbols, fetch the whole batch, apply bars and
//! write the snapshot back. [`RefreshTask`] repeats it on a fixed interval
//! until asked to stop.

use anyhow::{anyhow, Result};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::PriceFeed;
use crate::database::PortfolioStore;
use crate::models::{Constituent, DailyBar, RefreshReport};
use crate::reference_data::TickerMapping;

/// Write a bar's derived fields into `constituent`.
///
/// Returns `false` and leaves the constituent untouched when the bar is
/// unusable. `change_pct` is only recomputed when the open is positive.
pub fn apply_bar(constituent: &mut Constituent, bar: &DailyBar) -> bool {
    if !bar.is_valid() {
        return false;
    }

    constituent.price = bar.close;
    // approximation of cash volume
    constituent.turnover = bar.close * bar.volume;
    if bar.open > 0.0 {
        constituent.change_pct = (bar.close - bar.open) / bar.open * 100.0;
    }
    true
}

pub struct MarketDataRefresher {
    store: Arc<dyn PortfolioStore>,
    feed: Arc<dyn PriceFeed>,
    mapping: TickerMapping,
}

impl MarketDataRefresher {
    pub fn new(store: Arc<dyn PortfolioStore>, feed: Arc<dyn PriceFeed>, mapping: TickerMapping) -> Self {
        Self { store, feed, mapping }
    }

    pub async fn refresh_once(&self) -> Result<RefreshReport> {
        let mut constituents = self.store.load_snapshot().await?;
        if constituents.is_empty() {
            info!("Portfolio in database is empty, waiting");
            return Ok(RefreshReport::default());
        }

        // Several tickers may share one feed symbol
        let mut symbols: Vec<String> = Vec::new();
        let mut holders: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, constituent) in constituents.iter().enumerate() {
            let symbol = self.mapping.feed_symbol(&constituent.ticker);
            holders
                .entry(symbol.clone())
                .or_insert_with(|| {
                    symbols.push(symbol);
                    Vec::new()
                })
                .push(i);
        }

        info!("Fetching prices for {} companies", constituents.len());
        let bars = self
            .feed
            .fetch_daily_bars(&symbols)
            .await
            .map_err(|e| anyhow!("price feed unavailable: {}", e))?;

        let mut report = RefreshReport {
            tickers: constituents.len(),
            requested_symbols: symbols.len(),
            ..Default::default()
        };

        for symbol in &symbols {
            let indices = &holders[symbol];
            let applied = match bars.get(symbol) {
                Some(bar) => indices
                    .iter()
                    .map(|&i| apply_bar(&mut constituents[i], bar))
                    .fold(false, |any, ok| any | ok),
                None => false,
            };

            if applied {
                report.updated += indices.len();
            } else {
                debug!("Keeping previous values for {}", symbol);
                report.missing_symbols.push(symbol.clone());
            }
        }

        self.store.replace_snapshot(&constituents).await?;
        info!(
            "Updated prices for {} of {} companies ({} symbols missing)",
            report.updated,
            report.tickers,
            report.missing_symbols.len()
        );

        Ok(report)
    }
}

/// Background loop around a [`MarketDataRefresher`].
///
/// Stop is cooperative: it is noticed while sleeping between cycles and never
/// interrupts a fetch in progress.
pub struct RefreshTask {
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshTask {
    pub fn spawn(refresher: Arc<MarketDataRefresher>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(refresher, interval, stop_rx));

        Self {
            stop_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Ask the loop to exit after the current cycle
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn is_running(&self) -> bool {
        match self.handle.lock() {
            Ok(guard) => guard.as_ref().map(|h| !h.is_finished()).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Wait for the loop to finish; call [`RefreshTask::stop`] first
    pub async fn join(&self) -> Result<()> {
        let handle = self
            .handle
            .lock()
            .map_err(|_| anyhow!("refresh task state poisoned"))?
            .take();

        if let Some(handle) = handle {
            handle.await?;
        }
        Ok(())
    }

    pub async fn stop_and_join(&self) -> Result<()> {
        self.stop();
        self.join().await
    }
}

async fn run_loop(refresher: Arc<MarketDataRefresher>, interval: Duration, mut stop_rx: watch::Receiver<bool>) {
    info!("Market data refresher started (every {:?})", interval);

    loop {
        if *stop_rx.borrow() {
            break;
        }

        match AssertUnwindSafe(refresher.refresh_once()).catch_unwind().await {
            Ok(Ok(report)) => debug!("Refresh cycle done: {:?}", report),
            Ok(Err(e)) => error!("Refresh cycle failed: {:#}", e),
            Err(_) => error!("Refresh cycle panicked"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    warn!("Refresher stop handle dropped");
                    break;
                }
            }
        }
    }

    info!("Market data refresher stopped");
}
