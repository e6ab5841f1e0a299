use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use common::{Granularity, MarketDataProvider, PriceSeries, ProviderError};

/// Cache key: one fetched series per (symbol, granularity, period).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub symbol: String,
    pub granularity: Granularity,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Per-run market data cache. Entries are populated once and read-only
/// afterwards; strategies sharing a symbol share the fetch. The cache is
/// scoped to a validation run, so there is no invalidation.
#[derive(Default)]
pub struct SeriesCache {
    inner: RwLock<HashMap<SeriesKey, Arc<PriceSeries>>>,
}

impl SeriesCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached series for `key`, fetching it on first use.
    /// Concurrent first users may fetch in parallel; the first insert wins
    /// and everyone ends up holding the same entry.
    pub async fn get_or_fetch(
        &self,
        provider: &dyn MarketDataProvider,
        key: &SeriesKey,
    ) -> Result<Arc<PriceSeries>, ProviderError> {
        if let Some(series) = self.inner.read().await.get(key) {
            debug!(symbol = %key.symbol, window = %key.granularity, "series cache hit");
            return Ok(series.clone());
        }

        let series = provider
            .fetch_series(&key.symbol, key.granularity, key.start, key.end)
            .await?;

        let mut map = self.inner.write().await;
        Ok(map
            .entry(key.clone())
            .or_insert_with(|| Arc::new(series))
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataProvider for CountingProvider {
        async fn fetch_series(
            &self,
            symbol: &str,
            granularity: Granularity,
            start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<PriceSeries, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PriceSeries {
                symbol: symbol.to_string(),
                granularity,
                candles: vec![common::Candle {
                    ts: start,
                    open: 1.0,
                    high: 1.0,
                    low: 1.0,
                    close: 1.0,
                    volume: 1.0,
                }],
            })
        }
    }

    fn key(symbol: &str, granularity: Granularity) -> SeriesKey {
        let start = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        SeriesKey {
            symbol: symbol.to_string(),
            granularity,
            start,
            end: start + Duration::days(1),
        }
    }

    #[tokio::test]
    async fn repeated_lookups_fetch_once_and_share_the_entry() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };
        let cache = SeriesCache::new();
        let k = key("BTCUSDT", Granularity::Hour1);

        let first = cache.get_or_fetch(&provider, &k).await.unwrap();
        let second = cache.get_or_fetch(&provider, &k).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn distinct_keys_fetch_separately() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };
        let cache = SeriesCache::new();

        cache
            .get_or_fetch(&provider, &key("BTCUSDT", Granularity::Hour1))
            .await
            .unwrap();
        cache
            .get_or_fetch(&provider, &key("BTCUSDT", Granularity::Day1))
            .await
            .unwrap();
        cache
            .get_or_fetch(&provider, &key("ETHUSDT", Granularity::Hour1))
            .await
            .unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }
}
