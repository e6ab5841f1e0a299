use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use backtest::compute;
use common::{BacktestRun, Granularity, TradeEvent};

fn run_from_returns(returns: &[f64]) -> BacktestRun {
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    BacktestRun {
        strategy_id: "prop".into(),
        granularity: Granularity::Hour1,
        period_start: base,
        period_end: base + Duration::hours(returns.len() as i64),
        trades: returns
            .iter()
            .enumerate()
            .map(|(i, &ret)| TradeEvent {
                entry_ts: base + Duration::hours(i as i64),
                exit_ts: base + Duration::hours(i as i64),
                entry_price: 100.0,
                exit_price: 100.0 * (1.0 + ret),
                ret,
                forced_close: false,
            })
            .collect(),
    }
}

proptest! {
    /// Metrics must never panic and must keep their invariants for any
    /// plausible per-trade return sequence.
    #[test]
    fn metrics_invariants_hold_on_random_returns(
        returns in prop::collection::vec(-0.9f64..2.0f64, 0..64)
    ) {
        let run = run_from_returns(&returns);
        let m = compute(&run);

        prop_assert_eq!(m.trade_count, run.trades.len());
        prop_assert!((0.0..=1.0).contains(&m.win_rate));
        prop_assert!((0.0..=1.0).contains(&m.max_drawdown));
        prop_assert!(m.total_return >= -1.0);
        if m.trade_count < 2 {
            prop_assert!(m.risk_adjusted_return.is_none());
        }
    }

    /// Recomputing the same run must be byte-for-byte identical.
    #[test]
    fn metrics_are_idempotent(
        returns in prop::collection::vec(-0.5f64..1.0f64, 0..32)
    ) {
        let run = run_from_returns(&returns);
        prop_assert_eq!(compute(&run), compute(&run));
    }
}
