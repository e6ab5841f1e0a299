//! Compares a strategy's backtest against passive buy-and-hold over the
//! same period, with a significance gate for small samples.

use tracing::debug;

use common::{stats, BacktestRun, BenchmarkResult, PerformanceMetrics, PriceSeries};

#[derive(Debug, Clone)]
pub struct ComparatorConfig {
    /// Below this many trades the result is marked not significant no
    /// matter how good the delta looks. Small samples are not trusted.
    pub min_trades: usize,
    /// Two-tailed significance level for the excess-return test.
    pub alpha: f64,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            min_trades: 20,
            alpha: 0.05,
        }
    }
}

/// Benchmark one run against buy-at-start, hold-to-end on the same series.
///
/// Significance is a one-sample test of the per-trade returns against a
/// null of zero mean. The `min_trades` floor overrides the test: with too
/// few trades the flag is false regardless of the computed p-value.
pub fn compare(
    metrics: &PerformanceMetrics,
    run: &BacktestRun,
    series: &PriceSeries,
    cfg: &ComparatorConfig,
) -> BenchmarkResult {
    let baseline_return = match (series.candles.first(), series.candles.last()) {
        (Some(first), Some(last)) if first.close > 0.0 => last.close / first.close - 1.0,
        _ => 0.0,
    };

    let returns: Vec<f64> = run.trades.iter().map(|t| t.ret).collect();
    let p_value = stats::one_sample_t(&returns).map(|(_, p)| p);

    let significant = metrics.trade_count >= cfg.min_trades
        && p_value.map(|p| p < cfg.alpha).unwrap_or(false);

    let relative_delta = metrics.total_return - baseline_return;

    debug!(
        window = %run.granularity,
        baseline = baseline_return,
        delta = relative_delta,
        trades = metrics.trade_count,
        significant,
        "benchmark comparison"
    );

    BenchmarkResult {
        baseline_return,
        relative_delta,
        p_value,
        significant,
    }
}
