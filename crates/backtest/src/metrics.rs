//! Reduces a trade sequence to summary statistics. Pure — same run in,
//! same metrics out.

use common::{stats, BacktestRun, PerformanceMetrics};

/// Compute summary statistics for one backtest run.
///
/// An empty run yields all-zero metrics with `trade_count` 0; there is no
/// division by zero anywhere in here. `risk_adjusted_return` is `None`
/// (not 0) when fewer than two trades exist or their spread is zero.
pub fn compute(run: &BacktestRun) -> PerformanceMetrics {
    let returns: Vec<f64> = run.trades.iter().map(|t| t.ret).collect();
    let trade_count = returns.len();

    if trade_count == 0 {
        return PerformanceMetrics {
            total_return: 0.0,
            max_drawdown: 0.0,
            win_rate: 0.0,
            trade_count: 0,
            risk_adjusted_return: None,
        };
    }

    // Compound the equity curve trade by trade, tracking the peak as we go.
    let mut equity = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut max_drawdown = 0.0_f64;
    for r in &returns {
        equity *= 1.0 + r;
        if equity > peak {
            peak = equity;
        } else if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - equity) / peak);
        }
    }

    let wins = returns.iter().filter(|&&r| r > 0.0).count();

    let risk_adjusted_return = match (stats::mean(&returns), stats::sample_stdev(&returns)) {
        (Some(m), Some(sd)) if sd > 0.0 => Some(m / sd),
        _ => None,
    };

    PerformanceMetrics {
        total_return: equity - 1.0,
        max_drawdown,
        win_rate: wins as f64 / trade_count as f64,
        trade_count,
        risk_adjusted_return,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use common::{Granularity, TradeEvent};

    fn run_with(returns: &[f64]) -> BacktestRun {
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        BacktestRun {
            strategy_id: "s1".into(),
            granularity: Granularity::Hour1,
            period_start: base,
            period_end: base + Duration::hours(returns.len() as i64 * 2),
            trades: returns
                .iter()
                .enumerate()
                .map(|(i, &ret)| TradeEvent {
                    entry_ts: base + Duration::hours(i as i64 * 2),
                    exit_ts: base + Duration::hours(i as i64 * 2 + 1),
                    entry_price: 100.0,
                    exit_price: 100.0 * (1.0 + ret),
                    ret,
                    forced_close: false,
                })
                .collect(),
        }
    }

    #[test]
    fn empty_run_is_all_zeros_with_no_risk_adjusted() {
        let m = compute(&run_with(&[]));
        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.trade_count, 0);
        assert!(m.risk_adjusted_return.is_none());
    }

    #[test]
    fn compounds_and_tracks_drawdown() {
        let m = compute(&run_with(&[0.10, -0.05, 0.20]));
        // 1.1 * 0.95 * 1.2 - 1
        assert!((m.total_return - 0.254).abs() < 1e-9);
        // Peak 1.1, trough 1.045 → 5% drawdown
        assert!((m.max_drawdown - 0.05).abs() < 1e-9);
        assert!((m.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.trade_count, 3);
        assert!(m.risk_adjusted_return.unwrap() > 0.0);
    }

    #[test]
    fn recomputing_the_same_run_is_identical() {
        let run = run_with(&[0.02, -0.01, 0.03, -0.04, 0.01]);
        assert_eq!(compute(&run), compute(&run));
    }

    #[test]
    fn single_trade_has_no_risk_adjusted_return() {
        let m = compute(&run_with(&[0.08]));
        assert_eq!(m.trade_count, 1);
        assert!(m.risk_adjusted_return.is_none());
    }

    #[test]
    fn zero_spread_returns_have_no_risk_adjusted_return() {
        let m = compute(&run_with(&[0.01, 0.01, 0.01]));
        assert!(m.risk_adjusted_return.is_none());
        assert!(m.total_return > 0.0);
    }

    #[test]
    fn all_losing_run_has_full_loss_shape() {
        let m = compute(&run_with(&[-0.10, -0.10]));
        assert!(m.total_return < 0.0);
        assert_eq!(m.win_rate, 0.0);
        assert!((m.max_drawdown - 0.19).abs() < 1e-9);
    }
}
