use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use common::{
    Candle, Granularity, MarketDataProvider, PriceSeries, ProviderError, SentimentFeed,
    SentimentSample, Source,
};

/// Minutes in one day, used to scale drift/volatility to the bar size.
const DAY_MINUTES: f64 = 1440.0;

/// Offline market data: a seeded random walk. The same (symbol,
/// granularity, period) always produces the same series, so validation
/// runs are reproducible without any network access.
///
/// Also serves synthetic sentiment samples so the sentiment path can be
/// exercised offline.
pub struct SyntheticProvider {
    /// Daily drift of the generated walk.
    pub trend: f64,
    /// Daily volatility of the generated walk.
    pub volatility: f64,
    pub seed: u64,
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self {
            trend: 0.0008,
            volatility: 0.012,
            seed: 42,
        }
    }
}

impl SyntheticProvider {
    fn rng_for(&self, tag: &str, extra: &str, start: DateTime<Utc>) -> StdRng {
        let mut hasher = DefaultHasher::new();
        tag.hash(&mut hasher);
        extra.hash(&mut hasher);
        start.timestamp().hash(&mut hasher);
        StdRng::seed_from_u64(self.seed ^ hasher.finish())
    }
}

#[async_trait]
impl MarketDataProvider for SyntheticProvider {
    async fn fetch_series(
        &self,
        symbol: &str,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PriceSeries, ProviderError> {
        if end <= start {
            return Err(ProviderError::Unavailable(format!(
                "empty period {start}..{end}"
            )));
        }

        let mut rng = self.rng_for(symbol, granularity.label(), start);
        let step = Duration::minutes(granularity.minutes() as i64);
        let day_fraction = granularity.minutes() as f64 / DAY_MINUTES;
        let drift = self.trend * day_fraction;
        let vol = self.volatility * day_fraction.sqrt();

        let mut candles = Vec::new();
        let mut price = 100.0_f64;
        let mut ts = start;
        while ts < end {
            let change = drift + (rng.gen::<f64>() - 0.5) * 2.0 * vol;
            let open = price;
            price = (price * (1.0 + change)).max(1.0);
            let (hi, lo) = (open.max(price), open.min(price));
            candles.push(Candle {
                ts,
                open,
                high: hi * (1.0 + rng.gen_range(0.0..0.005)),
                low: lo * (1.0 - rng.gen_range(0.0..0.005)),
                close: price,
                volume: rng.gen_range(1_000_000.0..10_000_000.0),
            });
            ts += step;
        }

        debug!(symbol, window = %granularity, bars = candles.len(), "synthetic series generated");
        Ok(PriceSeries {
            symbol: symbol.to_string(),
            granularity,
            candles,
        })
    }
}

#[async_trait]
impl SentimentFeed for SyntheticProvider {
    async fn fetch_samples(
        &self,
        source: Source,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SentimentSample>, ProviderError> {
        let mut rng = self.rng_for("sentiment", &source.to_string(), start);
        let step = Duration::minutes(15);

        let mut samples = Vec::new();
        let mut ts = start;
        while ts < end {
            samples.push(SentimentSample {
                ts,
                source,
                score: rng.gen_range(-1.0..1.0),
            });
            ts += step;
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn period() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        (start, start + Duration::days(10))
    }

    #[tokio::test]
    async fn same_key_generates_the_same_series() {
        let provider = SyntheticProvider::default();
        let (start, end) = period();
        let a = provider
            .fetch_series("BTCUSDT", Granularity::Hour1, start, end)
            .await
            .unwrap();
        let b = provider
            .fetch_series("BTCUSDT", Granularity::Hour1, start, end)
            .await
            .unwrap();
        let closes_a: Vec<f64> = a.candles.iter().map(|c| c.close).collect();
        let closes_b: Vec<f64> = b.candles.iter().map(|c| c.close).collect();
        assert_eq!(closes_a, closes_b);
    }

    #[tokio::test]
    async fn different_symbols_diverge() {
        let provider = SyntheticProvider::default();
        let (start, end) = period();
        let a = provider
            .fetch_series("BTCUSDT", Granularity::Hour1, start, end)
            .await
            .unwrap();
        let b = provider
            .fetch_series("ETHUSDT", Granularity::Hour1, start, end)
            .await
            .unwrap();
        assert_ne!(
            a.candles.last().unwrap().close,
            b.candles.last().unwrap().close
        );
    }

    #[tokio::test]
    async fn bars_are_contiguous_and_positive() {
        let provider = SyntheticProvider::default();
        let (start, end) = period();
        let series = provider
            .fetch_series("BTCUSDT", Granularity::Hour4, start, end)
            .await
            .unwrap();
        assert_eq!(series.candles.len(), 60); // 10 days of 4h bars
        for pair in series.candles.windows(2) {
            assert_eq!(
                (pair[1].ts - pair[0].ts).num_minutes(),
                240,
                "bars must be evenly spaced"
            );
        }
        assert!(series.candles.iter().all(|c| c.close > 0.0 && c.low > 0.0));
        assert!(series.candles.iter().all(|c| c.high >= c.low));
    }

    #[tokio::test]
    async fn sentiment_scores_stay_in_range() {
        let provider = SyntheticProvider::default();
        let (start, end) = period();
        let samples = provider
            .fetch_samples(Source::Reddit, start, end)
            .await
            .unwrap();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(&s.score)));
    }

    #[tokio::test]
    async fn empty_period_is_an_error() {
        let provider = SyntheticProvider::default();
        let (start, _) = period();
        assert!(provider
            .fetch_series("BTCUSDT", Granularity::Hour1, start, start)
            .await
            .is_err());
    }
}
