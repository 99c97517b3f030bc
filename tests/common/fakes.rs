//! In-memory stand-ins for the external sources, with call counters

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use swig_tracker::api::{ClassificationSource, CompositionSource, FetchError, PriceFeed};
use swig_tracker::models::{Constituent, DailyBar};

/// Profile pages keyed by ticker; unknown tickers have no page
#[derive(Default)]
pub struct FakeClassificationSource {
    pages: HashMap<String, String>,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl FakeClassificationSource {
    pub fn with_page(mut self, ticker: &str, html: String) -> Self {
        self.pages.insert(ticker.to_string(), html);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClassificationSource for FakeClassificationSource {
    async fn fetch_profile(&self, ticker: &str) -> Result<Option<String>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(ticker.to_string());
        Ok(self.pages.get(ticker).cloned())
    }
}

/// Bars keyed by feed symbol; a missing symbol is simply absent from the result
#[derive(Default)]
pub struct FakePriceFeed {
    bars: Mutex<HashMap<String, DailyBar>>,
    unavailable: bool,
    delay: Duration,
    calls: AtomicUsize,
    last_request: Mutex<Vec<String>>,
}

impl FakePriceFeed {
    pub fn with_bar(self, symbol: &str, bar: DailyBar) -> Self {
        self.bars.lock().unwrap().insert(symbol.to_string(), bar);
        self
    }

    pub fn unavailable() -> Self {
        Self { unavailable: true, ..Default::default() }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Vec<String> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl PriceFeed for FakePriceFeed {
    async fn fetch_daily_bars(&self, symbols: &[String]) -> Result<HashMap<String, DailyBar>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = symbols.to_vec();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unavailable {
            return Err(FetchError::Shape("feed offline".to_string()));
        }

        let bars = self.bars.lock().unwrap();
        Ok(symbols
            .iter()
            .filter_map(|s| bars.get(s).map(|bar| (s.clone(), *bar)))
            .collect())
    }
}

/// Composition source returning a fixed basket, or failing
pub struct FakeCompositionSource {
    basket: Option<Vec<Constituent>>,
    calls: AtomicUsize,
}

impl FakeCompositionSource {
    pub fn returning(basket: Vec<Constituent>) -> Self {
        Self { basket: Some(basket), calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self { basket: None, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompositionSource for FakeCompositionSource {
    async fn fetch_composition(&self) -> Result<Vec<Constituent>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.basket
            .clone()
            .ok_or_else(|| FetchError::Status { url: "https://gpwbenchmark.test".to_string(), status: 503 })
    }
}
