//! Replays a candidate's signal rule over a price series at one
//! granularity and records the resulting trade sequence.

use chrono::{DateTime, Utc};
use tracing::debug;

use common::{
    BacktestError, BacktestRun, Candle, Direction, Granularity, Indicator, PriceSeries,
    SignalRule, StrategyCandidate, Threshold, TradeEvent,
};

use crate::indicators::{RollingRsi, RollingSma};

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Maximum number of consecutive missing bars tolerated before the
    /// window fails with a data gap. Gaps are never interpolated over.
    pub gap_tolerance: u32,
    /// Round-trip trading fee applied to every recorded trade.
    pub fee_rate: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            gap_tolerance: 2,
            fee_rate: 0.001,
        }
    }
}

/// Replay `candidate`'s rule over `series`.
///
/// The walk is strictly time-ordered and the rule only ever sees bars up to
/// and including the current one. Overlapping entry signals while a position
/// is open are ignored (no pyramiding). A position still open at period end
/// is closed at the last bar and flagged `forced_close`.
///
/// Zero qualifying signals is a valid result: the run comes back with an
/// empty trade sequence, not an error.
pub fn simulate(
    candidate: &StrategyCandidate,
    series: &PriceSeries,
    granularity: Granularity,
    cfg: &SimulatorConfig,
) -> Result<BacktestRun, BacktestError> {
    if series.granularity != granularity {
        return Err(BacktestError::GranularityMismatch {
            expected: granularity,
            got: series.granularity,
        });
    }
    if series.candles.is_empty() {
        return Err(BacktestError::EmptySeries);
    }
    check_gaps(&series.candles, granularity, cfg.gap_tolerance)?;

    let direction = candidate.rule.direction();
    let mut eval = RuleEval::for_rule(&candidate.rule)?;
    let mut open: Option<OpenPosition> = None;
    let mut trades = Vec::new();

    for candle in &series.candles {
        let signal = eval.observe(candle.close);

        match (&open, signal) {
            (None, Signal::Enter) => {
                open = Some(OpenPosition {
                    entry_ts: candle.ts,
                    entry_price: candle.close,
                });
            }
            (Some(pos), Signal::Exit) => {
                trades.push(close_trade(pos, candle, direction, cfg.fee_rate, false));
                open = None;
            }
            // Entry while a position is open is deliberately ignored.
            _ => {}
        }
    }

    if let Some(pos) = &open {
        if let Some(last) = series.candles.last() {
            trades.push(close_trade(pos, last, direction, cfg.fee_rate, true));
        }
    }

    debug!(
        strategy = %candidate.id,
        window = %granularity,
        trades = trades.len(),
        "simulation finished"
    );

    Ok(BacktestRun {
        strategy_id: candidate.id.clone(),
        granularity,
        period_start: series.candles[0].ts,
        period_end: series.candles[series.candles.len() - 1].ts,
        trades,
    })
}

struct OpenPosition {
    entry_ts: DateTime<Utc>,
    entry_price: f64,
}

fn close_trade(
    pos: &OpenPosition,
    candle: &Candle,
    direction: Direction,
    fee_rate: f64,
    forced: bool,
) -> TradeEvent {
    let raw = match direction {
        Direction::Long => candle.close / pos.entry_price - 1.0,
        Direction::Short => (pos.entry_price - candle.close) / pos.entry_price,
    };
    TradeEvent {
        entry_ts: pos.entry_ts,
        exit_ts: candle.ts,
        entry_price: pos.entry_price,
        exit_price: candle.close,
        ret: (1.0 + raw) * (1.0 - fee_rate) - 1.0,
        forced_close: forced,
    }
}

fn check_gaps(
    candles: &[Candle],
    granularity: Granularity,
    tolerance: u32,
) -> Result<(), BacktestError> {
    let step_minutes = granularity.minutes() as i64;
    for pair in candles.windows(2) {
        let delta = (pair[1].ts - pair[0].ts).num_minutes();
        let missing = (delta / step_minutes - 1).max(0) as u32;
        if missing > tolerance {
            return Err(BacktestError::DataGap {
                at: pair[0].ts,
                missing,
            });
        }
    }
    Ok(())
}

enum Signal {
    Enter,
    Exit,
    Hold,
}

/// Per-rule incremental evaluator fed one close at a time.
enum RuleEval {
    Threshold {
        rsi: RollingRsi,
        entry: Threshold,
        exit: Threshold,
    },
    Cross {
        fast: RollingSma,
        slow: RollingSma,
        direction: Direction,
        prev: Option<(f64, f64)>,
    },
}

impl RuleEval {
    fn for_rule(rule: &SignalRule) -> Result<Self, BacktestError> {
        match rule {
            SignalRule::IndicatorThreshold {
                indicator: Indicator::Rsi { period },
                entry,
                exit,
                ..
            } => Ok(RuleEval::Threshold {
                rsi: RollingRsi::new(*period),
                entry: *entry,
                exit: *exit,
            }),
            SignalRule::Crossover {
                fast_period,
                slow_period,
                direction,
            } => Ok(RuleEval::Cross {
                fast: RollingSma::new(*fast_period),
                slow: RollingSma::new(*slow_period),
                direction: *direction,
                prev: None,
            }),
            SignalRule::SentimentThreshold { .. } => Err(BacktestError::UnsupportedRule(
                "sentiment-threshold rules have no price-bar signal".into(),
            )),
        }
    }

    fn observe(&mut self, close: f64) -> Signal {
        match self {
            RuleEval::Threshold { rsi, entry, exit } => match rsi.push(close) {
                Some(value) if entry.matches(value) => Signal::Enter,
                Some(value) if exit.matches(value) => Signal::Exit,
                _ => Signal::Hold,
            },
            RuleEval::Cross {
                fast,
                slow,
                direction,
                prev,
            } => {
                let fast_v = fast.push(close);
                let slow_v = slow.push(close);
                let (Some(f), Some(s)) = (fast_v, slow_v) else {
                    return Signal::Hold;
                };
                let crossed = match prev.replace((f, s)) {
                    Some((pf, ps)) => {
                        if pf <= ps && f > s {
                            Some(Direction::Long)
                        } else if pf >= ps && f < s {
                            Some(Direction::Short)
                        } else {
                            None
                        }
                    }
                    None => None,
                };
                match crossed {
                    Some(c) if c == *direction => Signal::Enter,
                    Some(_) => Signal::Exit,
                    None => Signal::Hold,
                }
            }
        }
    }
}
