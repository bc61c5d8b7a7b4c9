//! Data provider capability.
//!
//! The engine never performs I/O itself; it consumes a [`DataProvider`]
//! injected by the caller. Provider failures are categorized and surfaced
//! unchanged so callers can decide their own retry policy.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::series::{BarSeries, VolumeSeries};

/// Categorized provider failure, propagated unchanged through the engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("data processing error: {0}")]
    DataProcessing(String),

    #[error("provider error: {0}")]
    Unknown(String),
}

/// Capability for fetching aligned-by-construction bar data.
///
/// `interval` and `period` use provider-conventional strings such as
/// `"1d"` / `"60d"`. Implementations may block on I/O; the engine only
/// calls `fetch` between cancellation checkpoints.
pub trait DataProvider: Send + Sync {
    fn fetch(
        &self,
        ticker: &str,
        interval: &str,
        period: &str,
    ) -> std::result::Result<(BarSeries, VolumeSeries), ProviderError>;
}

/// Deterministic in-memory provider, for tests and offline replay.
///
/// Series are keyed by `(ticker, interval)`; `period` is ignored.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    series: Mutex<HashMap<(String, String), (BarSeries, VolumeSeries)>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        ticker: impl Into<String>,
        interval: impl Into<String>,
        price: BarSeries,
        volume: VolumeSeries,
    ) {
        self.series
            .lock()
            .expect("provider map poisoned")
            .insert((ticker.into(), interval.into()), (price, volume));
    }
}

impl DataProvider for InMemoryProvider {
    fn fetch(
        &self,
        ticker: &str,
        interval: &str,
        _period: &str,
    ) -> std::result::Result<(BarSeries, VolumeSeries), ProviderError> {
        self.series
            .lock()
            .map_err(|_| ProviderError::Unknown("provider map poisoned".to_string()))?
            .get(&(ticker.to_string(), interval.to_string()))
            .cloned()
            .ok_or_else(|| {
                ProviderError::DataProcessing(format!("no data for {ticker} at {interval}"))
            })
    }
}
