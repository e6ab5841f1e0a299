use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rule::SignalRule;

/// Where a candidate strategy was scraped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum Source {
    Reddit,
    Twitter,
    TradingView,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Reddit => write!(f, "reddit"),
            Source::Twitter => write!(f, "twitter"),
            Source::TradingView => write!(f, "tradingview"),
        }
    }
}

/// Lifecycle of a candidate. Only the registry moves a candidate between
/// states; everything else treats candidates as read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum CandidateStatus {
    Pending,
    Validated,
    Rejected,
    /// Too many windows failed to evaluate (provider outage, data gaps).
    /// Distinct from `Rejected`: the candidate stays eligible for a retry
    /// on the next scheduled run.
    InsufficientlyEvaluated,
}

impl std::fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandidateStatus::Pending => write!(f, "pending"),
            CandidateStatus::Validated => write!(f, "validated"),
            CandidateStatus::Rejected => write!(f, "rejected"),
            CandidateStatus::InsufficientlyEvaluated => write!(f, "insufficiently_evaluated"),
        }
    }
}

/// An unvalidated trading rule sourced from social/discussion content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyCandidate {
    pub id: String,
    pub name: String,
    pub source: Source,
    pub rule: SignalRule,
    pub discovered_at: DateTime<Utc>,
    pub status: CandidateStatus,
}

impl StrategyCandidate {
    pub fn new(name: impl Into<String>, source: Source, rule: SignalRule) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            source,
            rule,
            discovered_at: Utc::now(),
            status: CandidateStatus::Pending,
        }
    }
}

/// Backtest time resolution. The variant order is ascending so the type
/// can key an ordered per-window map.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Granularity {
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "2h")]
    Hour2,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
}

impl Granularity {
    pub const ALL: [Granularity; 6] = [
        Granularity::Min15,
        Granularity::Min30,
        Granularity::Hour1,
        Granularity::Hour2,
        Granularity::Hour4,
        Granularity::Day1,
    ];

    pub fn minutes(self) -> u32 {
        match self {
            Granularity::Min15 => 15,
            Granularity::Min30 => 30,
            Granularity::Hour1 => 60,
            Granularity::Hour2 => 120,
            Granularity::Hour4 => 240,
            Granularity::Day1 => 1440,
        }
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.minutes() == minutes)
    }

    /// Interval label as exchanges spell it ("15m", "1h", "1d").
    pub fn label(self) -> &'static str {
        match self {
            Granularity::Min15 => "15m",
            Granularity::Min30 => "30m",
            Granularity::Hour1 => "1h",
            Granularity::Hour2 => "2h",
            Granularity::Hour4 => "4h",
            Granularity::Day1 => "1d",
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.label() == s)
            .or_else(|| s.parse::<u32>().ok().and_then(Granularity::from_minutes))
            .ok_or_else(|| format!("unknown granularity '{s}'"))
    }
}

/// One OHLCV bar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Time-ordered bar series for one symbol at one granularity.
/// Read-only once fetched from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub granularity: Granularity,
    pub candles: Vec<Candle>,
}

impl PriceSeries {
    /// Close of the first bar at or after `ts`, with its index.
    pub fn close_at_or_after(&self, ts: DateTime<Utc>) -> Option<(usize, f64)> {
        let idx = self.candles.partition_point(|c| c.ts < ts);
        self.candles.get(idx).map(|c| (idx, c.close))
    }
}

/// One round trip recorded by the simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub entry_ts: DateTime<Utc>,
    pub exit_ts: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Direction-adjusted net return of the round trip (fees included).
    pub ret: f64,
    /// True when the position was still open at period end and was closed
    /// at the last available bar.
    pub forced_close: bool,
}

/// Output of one (strategy, window) simulation. Immutable once computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRun {
    pub strategy_id: String,
    pub granularity: Granularity,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub trades: Vec<TradeEvent>,
}

/// Summary statistics for one BacktestRun.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub trade_count: usize,
    /// Mean/stdev of per-trade returns. `None` means there were too few
    /// trades to estimate it — reported as missing rather than 0 so a flat
    /// number never masquerades as a neutral signal.
    pub risk_adjusted_return: Option<f64>,
}

/// Strategy performance measured against passive buy-and-hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub baseline_return: f64,
    pub relative_delta: f64,
    pub p_value: Option<f64>,
    pub significant: bool,
}

impl BenchmarkResult {
    /// A window passes only when the strategy beat the baseline, the excess
    /// survived the significance test, and risk-adjusted return could be
    /// estimated at all.
    pub fn passes(&self, metrics: &PerformanceMetrics) -> bool {
        self.relative_delta > 0.0 && self.significant && metrics.risk_adjusted_return.is_some()
    }
}

/// One scored social-sentiment observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSample {
    pub ts: DateTime<Utc>,
    pub source: Source,
    /// Score in [-1, 1]; positive is bullish.
    pub score: f64,
}

/// Correlation of the sentiment signal with forward returns at one lag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentCorrelation {
    pub lag_minutes: u32,
    pub coefficient: f64,
    pub sample_size: usize,
    /// False when the sample was too small or the coefficient did not pass
    /// its own significance check.
    pub reliable: bool,
}

/// Sentiment dimension of a verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentVerdict {
    /// At least one lag reliable and correlated in the rule's direction.
    pub supportive: bool,
    pub correlations: Vec<SentimentCorrelation>,
}

/// Outcome of one backtest window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WindowOutcome {
    Passed {
        metrics: PerformanceMetrics,
        benchmark: BenchmarkResult,
    },
    Failed {
        metrics: PerformanceMetrics,
        benchmark: BenchmarkResult,
    },
    /// The window could not be evaluated (data gap, provider failure,
    /// timeout). Excluded from the majority-vote denominator.
    NotEvaluated { reason: String },
}

impl WindowOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, WindowOutcome::Passed { .. })
    }

    pub fn is_evaluated(&self) -> bool {
        !matches!(self, WindowOutcome::NotEvaluated { .. })
    }
}

/// Aggregate decision for one validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum OverallStatus {
    Validated,
    Rejected,
    InsufficientlyEvaluated,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallStatus::Validated => write!(f, "validated"),
            OverallStatus::Rejected => write!(f, "rejected"),
            OverallStatus::InsufficientlyEvaluated => write!(f, "insufficiently_evaluated"),
        }
    }
}

/// The decision record appended to the registry. Constructed only by the
/// verdict engine; never mutated after the append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub strategy_id: String,
    pub windows: BTreeMap<Granularity, WindowOutcome>,
    pub sentiment: Option<SentimentVerdict>,
    pub overall: OverallStatus,
    pub evaluated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granularity_round_trips_through_minutes_and_labels() {
        for g in Granularity::ALL {
            assert_eq!(Granularity::from_minutes(g.minutes()), Some(g));
            assert_eq!(g.label().parse::<Granularity>().unwrap(), g);
        }
        assert_eq!("240".parse::<Granularity>().unwrap(), Granularity::Hour4);
        assert!("7m".parse::<Granularity>().is_err());
    }

    #[test]
    fn close_at_or_after_finds_the_next_bar() {
        let base = Utc::now();
        let series = PriceSeries {
            symbol: "BTCUSDT".into(),
            granularity: Granularity::Min15,
            candles: (0..4)
                .map(|i| Candle {
                    ts: base + chrono::Duration::minutes(15 * i),
                    open: 100.0,
                    high: 101.0,
                    low: 99.0,
                    close: 100.0 + i as f64,
                    volume: 1.0,
                })
                .collect(),
        };

        let (idx, close) = series
            .close_at_or_after(base + chrono::Duration::minutes(20))
            .unwrap();
        assert_eq!(idx, 2);
        assert!((close - 102.0).abs() < 1e-12);

        assert!(series
            .close_at_or_after(base + chrono::Duration::minutes(60))
            .is_none());
    }
}
