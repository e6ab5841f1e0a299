use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ProviderError;
use crate::types::{Granularity, PriceSeries, SentimentSample, Source};

/// Abstraction over the market data collaborator.
///
/// `BinanceProvider` implements this against live spot klines;
/// `SyntheticProvider` implements it for offline validation.
/// Fetches are cached per (symbol, granularity, period) by the runner, so
/// implementations do not need their own caching.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch the OHLCV series for one symbol/granularity/period.
    async fn fetch_series(
        &self,
        symbol: &str,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PriceSeries, ProviderError>;
}

/// Abstraction over the sentiment scraper collaborator.
#[async_trait]
pub trait SentimentFeed: Send + Sync {
    /// Fetch scored sentiment samples for one source over a date range.
    async fn fetch_samples(
        &self,
        source: Source,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SentimentSample>, ProviderError>;
}
