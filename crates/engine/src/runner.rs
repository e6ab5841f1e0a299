//! Validation runner: fans one strategy out across all configured windows,
//! contains per-window failures, joins the results, and writes exactly one
//! verdict per run to the registry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use backtest::{ComparatorConfig, SimulatorConfig};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use sentiment::CorrelationConfig;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use verdict::VerdictConfig;

use common::{
    CandidateStatus, Config, Granularity, MarketDataProvider, ProviderError, Result,
    SentimentCorrelation, SentimentFeed, SignalRule, StrategyCandidate, ValidationVerdict,
    WindowOutcome,
};
use registry::Registry;

use crate::cache::{SeriesCache, SeriesKey};

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub symbol: String,
    pub windows: Vec<Granularity>,
    pub lookback_days: i64,
    /// Bound on in-flight provider fetches, sized to the provider's rate
    /// limits. Simulation itself is not throttled.
    pub max_concurrent_fetches: usize,
    pub fetch_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            windows: Granularity::ALL.to_vec(),
            lookback_days: 200,
            max_concurrent_fetches: 4,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// Everything tunable about a validation run, grouped per component.
#[derive(Debug, Clone, Default)]
pub struct ValidationConfig {
    pub runner: RunnerConfig,
    pub simulator: SimulatorConfig,
    pub comparator: ComparatorConfig,
    pub correlation: CorrelationConfig,
    pub verdict: VerdictConfig,
}

impl ValidationConfig {
    /// Map the process-level env config onto the component configs.
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            runner: RunnerConfig {
                symbol: cfg.symbol.clone(),
                windows: cfg.windows.clone(),
                lookback_days: cfg.lookback_days,
                max_concurrent_fetches: cfg.max_concurrent_fetches,
                fetch_timeout: Duration::from_secs(cfg.fetch_timeout_secs),
            },
            simulator: SimulatorConfig {
                gap_tolerance: cfg.gap_tolerance,
                fee_rate: cfg.fee_rate,
            },
            comparator: ComparatorConfig {
                min_trades: cfg.min_trades,
                alpha: cfg.significance_alpha,
            },
            correlation: CorrelationConfig {
                lags: cfg.sentiment_lags.clone(),
                min_samples: cfg.min_sentiment_samples,
                alpha: cfg.significance_alpha,
            },
            verdict: VerdictConfig {
                min_evaluated_windows: cfg.min_evaluated_windows,
            },
        }
    }
}

/// Drives validation runs. This is the re-run entry point a scheduler
/// invokes; the runner itself holds no timers.
pub struct Runner {
    provider: Arc<dyn MarketDataProvider>,
    sentiment_feed: Option<Arc<dyn SentimentFeed>>,
    registry: Arc<Registry>,
    cache: Arc<SeriesCache>,
    fetch_permits: Arc<Semaphore>,
    config: ValidationConfig,
}

impl Runner {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        sentiment_feed: Option<Arc<dyn SentimentFeed>>,
        registry: Arc<Registry>,
        config: ValidationConfig,
    ) -> Self {
        let fetch_permits = Arc::new(Semaphore::new(config.runner.max_concurrent_fetches.max(1)));
        Self {
            provider,
            sentiment_feed,
            registry,
            cache: Arc::new(SeriesCache::new()),
            fetch_permits,
            config,
        }
    }

    /// Validate every pending candidate over the configured lookback.
    pub async fn validate_pending(&self) -> Result<Vec<ValidationVerdict>> {
        let pending = self
            .registry
            .candidates_by_status(CandidateStatus::Pending)
            .await?;
        info!(count = pending.len(), "validating pending candidates");

        let mut verdicts = Vec::with_capacity(pending.len());
        for candidate in &pending {
            verdicts.push(self.validate_candidate(candidate).await?);
        }
        Ok(verdicts)
    }

    /// Validate one candidate by id.
    pub async fn validate_one(&self, id: &str) -> Result<ValidationVerdict> {
        let candidate = self.registry.candidate(id).await?;
        self.validate_candidate(&candidate).await
    }

    /// Validate one candidate over the configured lookback ending now.
    pub async fn validate_candidate(
        &self,
        candidate: &StrategyCandidate,
    ) -> Result<ValidationVerdict> {
        let end = Utc::now();
        let start = end - chrono::Duration::days(self.config.runner.lookback_days);
        self.validate_in_period(candidate, start, end).await
    }

    /// Validate one candidate over an explicit period.
    ///
    /// Windows run concurrently (one fetch permit each while touching the
    /// provider) and are joined before the verdict is decided. Each run
    /// appends exactly one verdict to the registry.
    pub async fn validate_in_period(
        &self,
        candidate: &StrategyCandidate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ValidationVerdict> {
        info!(strategy = %candidate.id, name = %candidate.name, "validation run started");

        let windows = if matches!(candidate.rule, SignalRule::SentimentThreshold { .. }) {
            // No price-bar interpretation; judged on the sentiment dimension.
            BTreeMap::new()
        } else {
            self.evaluate_windows(candidate, start, end).await
        };

        let correlations = self.sentiment_dimension(candidate, start, end).await;

        let verdict = verdict::decide(
            candidate,
            &windows,
            correlations.as_deref(),
            &self.config.verdict,
        );
        self.registry.append_verdict(&verdict).await?;
        Ok(verdict)
    }

    /// Fan out one task per window and join them all.
    async fn evaluate_windows(
        &self,
        candidate: &StrategyCandidate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BTreeMap<Granularity, WindowOutcome> {
        let tasks: Vec<_> = self
            .config
            .runner
            .windows
            .iter()
            .map(|&granularity| {
                let provider = self.provider.clone();
                let cache = self.cache.clone();
                let permits = self.fetch_permits.clone();
                let candidate = candidate.clone();
                let symbol = self.config.runner.symbol.clone();
                let fetch_timeout = self.config.runner.fetch_timeout;
                let simulator_cfg = self.config.simulator.clone();
                let comparator_cfg = self.config.comparator.clone();

                tokio::spawn(async move {
                    evaluate_window(
                        provider,
                        cache,
                        permits,
                        &candidate,
                        symbol,
                        granularity,
                        start,
                        end,
                        fetch_timeout,
                        &simulator_cfg,
                        &comparator_cfg,
                    )
                    .await
                })
            })
            .collect();

        let results = join_all(tasks).await;

        let mut outcomes = BTreeMap::new();
        for (&granularity, joined) in self.config.runner.windows.iter().zip(results) {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(window = %granularity, error = %e, "window task failed");
                    WindowOutcome::NotEvaluated {
                        reason: format!("window task failed: {e}"),
                    }
                }
            };
            outcomes.insert(granularity, outcome);
        }
        outcomes
    }

    /// Fetch sentiment samples and score the configured lags, when a
    /// sentiment feed is wired at all. Any failure here just drops the
    /// dimension — it never fails the run.
    async fn sentiment_dimension(
        &self,
        candidate: &StrategyCandidate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<Vec<SentimentCorrelation>> {
        let feed = self.sentiment_feed.as_ref()?;

        let samples = match feed.fetch_samples(candidate.source, start, end).await {
            Ok(samples) if !samples.is_empty() => samples,
            Ok(_) => {
                info!(strategy = %candidate.id, "no sentiment samples in period");
                return None;
            }
            Err(e) => {
                warn!(strategy = %candidate.id, error = %e, "sentiment feed failed");
                return None;
            }
        };

        // Forward returns are taken against the finest configured window.
        let granularity = self
            .config
            .runner
            .windows
            .iter()
            .copied()
            .min()
            .unwrap_or(Granularity::Min15);
        let key = SeriesKey {
            symbol: self.config.runner.symbol.clone(),
            granularity,
            start,
            end,
        };
        let series = {
            let _permit = self.fetch_permits.acquire().await.ok()?;
            match tokio::time::timeout(
                self.config.runner.fetch_timeout,
                self.cache.get_or_fetch(self.provider.as_ref(), &key),
            )
            .await
            {
                Ok(Ok(series)) => series,
                Ok(Err(e)) => {
                    warn!(error = %e, "sentiment alignment series unavailable");
                    return None;
                }
                Err(_) => {
                    warn!("sentiment alignment series fetch timed out");
                    return None;
                }
            }
        };

        Some(sentiment::validate(
            &samples,
            &series,
            &self.config.correlation,
        ))
    }
}

/// Evaluate one (strategy, window) pair. Failures are contained here: any
/// provider or simulation error becomes a not-evaluated outcome and the
/// other windows proceed untouched.
#[allow(clippy::too_many_arguments)]
async fn evaluate_window(
    provider: Arc<dyn MarketDataProvider>,
    cache: Arc<SeriesCache>,
    permits: Arc<Semaphore>,
    candidate: &StrategyCandidate,
    symbol: String,
    granularity: Granularity,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    fetch_timeout: Duration,
    simulator_cfg: &SimulatorConfig,
    comparator_cfg: &ComparatorConfig,
) -> WindowOutcome {
    let key = SeriesKey {
        symbol,
        granularity,
        start,
        end,
    };

    let series = {
        let _permit = match permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return WindowOutcome::NotEvaluated {
                    reason: "fetch pool closed".into(),
                }
            }
        };
        match tokio::time::timeout(fetch_timeout, cache.get_or_fetch(provider.as_ref(), &key))
            .await
        {
            Ok(Ok(series)) => series,
            Ok(Err(e)) => {
                warn!(window = %granularity, error = %e, "window not evaluated");
                return WindowOutcome::NotEvaluated {
                    reason: e.to_string(),
                };
            }
            Err(_) => {
                let e = ProviderError::Timeout(fetch_timeout.as_secs());
                warn!(window = %granularity, error = %e, "window not evaluated");
                return WindowOutcome::NotEvaluated {
                    reason: e.to_string(),
                };
            }
        }
    };

    match backtest::simulate(candidate, &series, granularity, simulator_cfg) {
        Ok(run) => {
            let metrics = backtest::compute(&run);
            let benchmark = backtest::compare(&metrics, &run, &series, comparator_cfg);
            if benchmark.passes(&metrics) {
                WindowOutcome::Passed { metrics, benchmark }
            } else {
                WindowOutcome::Failed { metrics, benchmark }
            }
        }
        Err(e) => {
            warn!(window = %granularity, error = %e, "window not evaluated");
            WindowOutcome::NotEvaluated {
                reason: e.to_string(),
            }
        }
    }
}
