use chrono::Duration;
use tracing::debug;

use common::{stats, Granularity, PriceSeries, SentimentCorrelation, SentimentSample};

#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    /// Candidate lags in minutes between a sentiment sample and the forward
    /// return it is scored against.
    pub lags: Vec<u32>,
    /// Below this many aligned pairs a lag is marked unreliable outright.
    pub min_samples: usize,
    /// Two-tailed significance level for the coefficient check.
    pub alpha: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            lags: Granularity::ALL.iter().map(|g| g.minutes()).collect(),
            min_samples: 30,
            alpha: 0.05,
        }
    }
}

/// Score every configured lag against forward returns.
///
/// Each lag is judged on its own: the output always has exactly one entry
/// per configured lag, in configuration order, regardless of how the other
/// lags fared. Samples that cannot be aligned (no bar at the sample time or
/// none after the lag horizon) are dropped from that lag's pairing only.
pub fn validate(
    samples: &[SentimentSample],
    series: &PriceSeries,
    cfg: &CorrelationConfig,
) -> Vec<SentimentCorrelation> {
    cfg.lags
        .iter()
        .map(|&lag| score_lag(samples, series, lag, cfg))
        .collect()
}

fn score_lag(
    samples: &[SentimentSample],
    series: &PriceSeries,
    lag_minutes: u32,
    cfg: &CorrelationConfig,
) -> SentimentCorrelation {
    let horizon = Duration::minutes(lag_minutes as i64);

    let mut scores = Vec::new();
    let mut forward_returns = Vec::new();
    for sample in samples {
        let Some((_, start_close)) = series.close_at_or_after(sample.ts) else {
            continue;
        };
        let Some((_, end_close)) = series.close_at_or_after(sample.ts + horizon) else {
            continue;
        };
        if start_close <= 0.0 {
            continue;
        }
        scores.push(sample.score);
        forward_returns.push(end_close / start_close - 1.0);
    }

    let sample_size = scores.len();
    let coefficient = stats::pearson(&scores, &forward_returns).unwrap_or(0.0);

    let significant = stats::correlation_p_value(coefficient, sample_size)
        .map(|p| p < cfg.alpha)
        .unwrap_or(false);
    let reliable = sample_size >= cfg.min_samples && significant;

    debug!(
        lag_minutes,
        sample_size, coefficient, reliable, "sentiment lag scored"
    );

    SentimentCorrelation {
        lag_minutes,
        coefficient,
        sample_size,
        reliable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use common::{Candle, Source};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn series_with_closes(closes: &[f64]) -> PriceSeries {
        let step = Duration::minutes(15);
        PriceSeries {
            symbol: "BTCUSDT".into(),
            granularity: Granularity::Min15,
            candles: closes
                .iter()
                .enumerate()
                .map(|(i, &close)| Candle {
                    ts: base() + step * i as i32,
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1.0,
                })
                .collect(),
        }
    }

    fn sample(minute: i64, score: f64) -> SentimentSample {
        SentimentSample {
            ts: base() + Duration::minutes(minute),
            source: Source::TradingView,
            score,
        }
    }

    /// Closes engineered so the 15-minute forward return of bar i is
    /// positive exactly when i is even; sentiment scores share the sign but
    /// vary in magnitude, giving a strong (not perfect) positive
    /// correlation at the 15-minute lag.
    fn aligned_fixture(n: usize) -> (Vec<SentimentSample>, PriceSeries) {
        let mut closes = vec![100.0];
        for i in 0..n + 1 {
            let last = *closes.last().unwrap();
            let next = if i % 2 == 0 { last * 1.01 } else { last * 0.995 };
            closes.push(next);
        }
        let samples = (0..n)
            .map(|i| {
                let magnitude = 0.5 + 0.1 * (i % 3) as f64;
                let score = if i % 2 == 0 { magnitude } else { -magnitude };
                sample(15 * i as i64, score)
            })
            .collect();
        (samples, series_with_closes(&closes))
    }

    #[test]
    fn reports_exactly_one_result_per_lag_in_order() {
        let (samples, series) = aligned_fixture(40);
        let cfg = CorrelationConfig {
            lags: vec![15, 60, 1440],
            ..CorrelationConfig::default()
        };
        let results = validate(&samples, &series, &cfg);
        let lags: Vec<u32> = results.iter().map(|r| r.lag_minutes).collect();
        assert_eq!(lags, vec![15, 60, 1440]);
    }

    #[test]
    fn predictive_signal_is_reliable_at_its_lag() {
        let (samples, series) = aligned_fixture(40);
        let cfg = CorrelationConfig {
            lags: vec![15],
            ..CorrelationConfig::default()
        };
        let result = &validate(&samples, &series, &cfg)[0];
        assert!(result.sample_size >= 30);
        assert!(result.coefficient > 0.5, "got {}", result.coefficient);
        assert!(result.reliable);
    }

    #[test]
    fn small_sample_is_unreliable_regardless_of_fit() {
        let (samples, series) = aligned_fixture(10);
        let cfg = CorrelationConfig {
            lags: vec![15],
            ..CorrelationConfig::default()
        };
        let result = &validate(&samples, &series, &cfg)[0];
        assert!(result.sample_size < 30);
        assert!(
            !result.reliable,
            "10 samples must be unreliable even at coefficient {}",
            result.coefficient
        );
    }

    #[test]
    fn lags_are_judged_independently() {
        // Enough bars for the 15m lag, far too few for the daily lag.
        let (samples, series) = aligned_fixture(40);
        let cfg = CorrelationConfig {
            lags: vec![15, 1440],
            ..CorrelationConfig::default()
        };
        let results = validate(&samples, &series, &cfg);
        assert!(results[0].reliable);
        assert!(!results[1].reliable);
        assert_eq!(results[1].sample_size, 0);
    }

    #[test]
    fn no_samples_yields_unreliable_zero_coefficient() {
        let series = series_with_closes(&[100.0, 101.0, 102.0]);
        let cfg = CorrelationConfig {
            lags: vec![15],
            ..CorrelationConfig::default()
        };
        let result = &validate(&[], &series, &cfg)[0];
        assert_eq!(result.sample_size, 0);
        assert_eq!(result.coefficient, 0.0);
        assert!(!result.reliable);
    }

    #[test]
    fn uninformative_signal_is_not_reliable() {
        // Constant sentiment cannot correlate with anything.
        let (_, series) = aligned_fixture(40);
        let samples: Vec<SentimentSample> =
            (0..40).map(|i| sample(15 * i as i64, 0.5)).collect();
        let cfg = CorrelationConfig {
            lags: vec![15],
            ..CorrelationConfig::default()
        };
        let result = &validate(&samples, &series, &cfg)[0];
        assert_eq!(result.coefficient, 0.0);
        assert!(!result.reliable);
    }
}
