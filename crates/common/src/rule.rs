//! Signal rule model and the parser boundary.
//!
//! Scraped rule descriptions are loose text. They are converted into a
//! closed set of typed signal primitives here, and malformed descriptions
//! are rejected before a candidate ever reaches the simulator.

use serde::{Deserialize, Serialize};

use crate::error::RuleParseError;

/// Trade direction of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

/// Comparison operator of a threshold condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdOp {
    Below,
    Above,
}

/// A threshold condition on an indicator value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub op: ThresholdOp,
    pub value: f64,
}

impl Threshold {
    pub fn below(value: f64) -> Self {
        Self { op: ThresholdOp::Below, value }
    }

    pub fn above(value: f64) -> Self {
        Self { op: ThresholdOp::Above, value }
    }

    pub fn matches(&self, observed: f64) -> bool {
        match self.op {
            ThresholdOp::Below => observed < self.value,
            ThresholdOp::Above => observed > self.value,
        }
    }
}

/// Indicator referenced by a threshold rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Indicator {
    Rsi { period: usize },
}

/// The closed set of signal primitives a candidate rule can use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalRule {
    /// Enter when `entry` matches the indicator value, exit when `exit` does.
    IndicatorThreshold {
        indicator: Indicator,
        entry: Threshold,
        exit: Threshold,
        direction: Direction,
    },
    /// Enter when the fast moving average crosses the slow one in the trade
    /// direction; exit on the opposite cross.
    Crossover {
        fast_period: usize,
        slow_period: usize,
        direction: Direction,
    },
    /// Enter when the aggregated sentiment score crosses `entry_score`.
    /// Has no price-bar interpretation; validated via the sentiment path.
    SentimentThreshold { entry_score: f64, direction: Direction },
}

impl SignalRule {
    pub fn direction(&self) -> Direction {
        match self {
            SignalRule::IndicatorThreshold { direction, .. }
            | SignalRule::Crossover { direction, .. }
            | SignalRule::SentimentThreshold { direction, .. } => *direction,
        }
    }

    /// Validate a rule that arrived already structured (e.g. JSON import).
    pub fn validate(&self) -> Result<(), RuleParseError> {
        match self {
            SignalRule::IndicatorThreshold { indicator, entry, exit, .. } => {
                let Indicator::Rsi { period } = indicator;
                if *period < 2 {
                    return Err(RuleParseError::InvalidParameter {
                        name: "rsi_period",
                        message: format!("must be >= 2, got {period}"),
                    });
                }
                for t in [entry, exit] {
                    if !(0.0..=100.0).contains(&t.value) {
                        return Err(RuleParseError::InvalidParameter {
                            name: "rsi_threshold",
                            message: format!("must be within 0..100, got {}", t.value),
                        });
                    }
                }
                Ok(())
            }
            SignalRule::Crossover { fast_period, slow_period, .. } => {
                if *fast_period == 0 || fast_period >= slow_period {
                    return Err(RuleParseError::InvalidParameter {
                        name: "crossover_periods",
                        message: format!(
                            "fast must be nonzero and below slow, got {fast_period}/{slow_period}"
                        ),
                    });
                }
                Ok(())
            }
            SignalRule::SentimentThreshold { entry_score, .. } => {
                if !(-1.0..=1.0).contains(entry_score) {
                    return Err(RuleParseError::InvalidParameter {
                        name: "entry_score",
                        message: format!("must be within -1..1, got {entry_score}"),
                    });
                }
                Ok(())
            }
        }
    }
}

const DEFAULT_RSI_PERIOD: usize = 14;
const DEFAULT_FAST_MA: usize = 10;
const DEFAULT_SLOW_MA: usize = 20;

/// Parse a scraped rule description into a `SignalRule`.
///
/// Recognized phrasings mirror what actually shows up in scraped posts:
/// "RSI below 30", "oversold", "golden cross", "50-day MA crosses above
/// 200-day MA", "sentiment above 0.3". Anything else is rejected here.
pub fn parse(text: &str) -> Result<SignalRule, RuleParseError> {
    let lower = text.to_lowercase();

    if let Some(rule) = parse_sentiment(&lower)? {
        rule.validate()?;
        return Ok(rule);
    }
    if let Some(rule) = parse_rsi(&lower)? {
        rule.validate()?;
        return Ok(rule);
    }
    if let Some(rule) = parse_crossover(&lower) {
        rule.validate()?;
        return Ok(rule);
    }

    Err(RuleParseError::Unrecognized(text.to_string()))
}

fn parse_sentiment(lower: &str) -> Result<Option<SignalRule>, RuleParseError> {
    if !lower.contains("sentiment") && !lower.contains("bullish ratio") {
        return Ok(None);
    }
    let entry_score = first_number(lower).ok_or(RuleParseError::MissingParameter(
        "sentiment threshold score",
    ))?;
    let direction = if lower.contains("below")
        || lower.contains("under")
        || lower.contains("short")
        || lower.contains("bearish")
    {
        Direction::Short
    } else {
        Direction::Long
    };
    Ok(Some(SignalRule::SentimentThreshold { entry_score, direction }))
}

fn parse_rsi(lower: &str) -> Result<Option<SignalRule>, RuleParseError> {
    let mentions_rsi =
        has_word(lower, "rsi") || lower.contains("oversold") || lower.contains("overbought");
    if !mentions_rsi {
        return Ok(None);
    }

    let indicator = Indicator::Rsi { period: DEFAULT_RSI_PERIOD };

    // "RSI below 30" style: enter oversold, exit on recovery through 50.
    for kw in ["below", "under", "<"] {
        if let Some(value) = number_after(lower, kw) {
            return Ok(Some(SignalRule::IndicatorThreshold {
                indicator,
                entry: Threshold::below(value),
                exit: Threshold::above(50.0),
                direction: Direction::Long,
            }));
        }
    }
    for kw in ["above", "over", ">"] {
        if let Some(value) = number_after(lower, kw) {
            return Ok(Some(SignalRule::IndicatorThreshold {
                indicator,
                entry: Threshold::above(value),
                exit: Threshold::below(50.0),
                direction: Direction::Short,
            }));
        }
    }

    // Bare "oversold"/"overbought" fall back to the conventional 30/70.
    if lower.contains("oversold") {
        return Ok(Some(SignalRule::IndicatorThreshold {
            indicator,
            entry: Threshold::below(30.0),
            exit: Threshold::above(50.0),
            direction: Direction::Long,
        }));
    }
    if lower.contains("overbought") {
        return Ok(Some(SignalRule::IndicatorThreshold {
            indicator,
            entry: Threshold::above(70.0),
            exit: Threshold::below(50.0),
            direction: Direction::Short,
        }));
    }

    Err(RuleParseError::MissingParameter("rsi threshold"))
}

fn parse_crossover(lower: &str) -> Option<SignalRule> {
    if lower.contains("golden cross") {
        return Some(SignalRule::Crossover {
            fast_period: 50,
            slow_period: 200,
            direction: Direction::Long,
        });
    }
    if lower.contains("death cross") {
        return Some(SignalRule::Crossover {
            fast_period: 50,
            slow_period: 200,
            direction: Direction::Short,
        });
    }

    let mentions_ma =
        has_word(lower, "ma") || has_word(lower, "sma") || lower.contains("moving average");
    if !mentions_ma || !lower.contains("cross") {
        return None;
    }

    let periods: Vec<usize> = numbers(lower)
        .into_iter()
        .filter(|n| n.fract() == 0.0 && *n >= 2.0 && *n <= 500.0)
        .map(|n| n as usize)
        .collect();

    let (fast, slow) = match periods.as_slice() {
        [] => (DEFAULT_FAST_MA, DEFAULT_SLOW_MA),
        [one] => {
            if *one > DEFAULT_FAST_MA {
                (DEFAULT_FAST_MA, *one)
            } else {
                (*one, DEFAULT_SLOW_MA)
            }
        }
        [a, b, ..] => (*a.min(b), *a.max(b)),
    };

    let direction = if lower.contains("death")
        || lower.contains("short")
        || lower.contains("sell")
        || lower.contains("cross below")
        || lower.contains("crosses below")
    {
        Direction::Short
    } else {
        Direction::Long
    };

    Some(SignalRule::Crossover { fast_period: fast, slow_period: slow, direction })
}

/// Whole-word match so "ma" never fires inside "market".
fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|t| t == word)
}

/// Every numeric literal in order of appearance.
fn numbers(text: &str) -> Vec<f64> {
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit()
            || (bytes[i] == b'-'
                && i + 1 < bytes.len()
                && bytes[i + 1].is_ascii_digit())
        {
            let start = i;
            if bytes[i] == b'-' {
                i += 1;
            }
            let mut seen_dot = false;
            while i < bytes.len()
                && (bytes[i].is_ascii_digit() || (bytes[i] == b'.' && !seen_dot))
            {
                if bytes[i] == b'.' {
                    seen_dot = true;
                }
                i += 1;
            }
            if let Ok(n) = text[start..i].trim_end_matches('.').parse::<f64>() {
                out.push(n);
            }
        } else {
            i += 1;
        }
    }
    out
}

fn first_number(text: &str) -> Option<f64> {
    numbers(text).into_iter().next()
}

/// First numeric literal appearing after a keyword.
fn number_after(text: &str, kw: &str) -> Option<f64> {
    let idx = text.find(kw)?;
    first_number(&text[idx + kw.len()..])
}
