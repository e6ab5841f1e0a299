use std::collections::BTreeMap;

use chrono::Utc;
use tracing::info;

use common::{
    Direction, Granularity, OverallStatus, SentimentCorrelation, SentimentVerdict,
    StrategyCandidate, ValidationVerdict, WindowOutcome,
};

#[derive(Debug, Clone)]
pub struct VerdictConfig {
    /// Minimum number of evaluated windows for a decision to count at all.
    /// Below this the strategy is "insufficiently evaluated" — a transient
    /// provider outage must not flip a candidate to rejected.
    pub min_evaluated_windows: usize,
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            min_evaluated_windows: 3,
        }
    }
}

/// Aggregate one validation run into a verdict.
///
/// Windows marked not-evaluated are excluded from the vote denominator.
/// A strict majority of evaluated windows must pass; an exact tie resolves
/// to rejected — buy-and-hold wins by default — unless a supportive
/// sentiment dimension breaks it. When sentiment is present at all,
/// validation additionally requires at least one reliable lag correlated in
/// the rule's intended direction.
///
/// Sentiment-threshold rules carry no backtest windows; they are judged on
/// the sentiment dimension alone.
pub fn decide(
    candidate: &StrategyCandidate,
    windows: &BTreeMap<Granularity, WindowOutcome>,
    correlations: Option<&[SentimentCorrelation]>,
    cfg: &VerdictConfig,
) -> ValidationVerdict {
    let sentiment = correlations.map(|corrs| SentimentVerdict {
        supportive: is_supportive(corrs, candidate.rule.direction()),
        correlations: corrs.to_vec(),
    });

    let evaluated = windows.values().filter(|w| w.is_evaluated()).count();
    let passed = windows.values().filter(|w| w.is_passed()).count();

    let overall = if windows.is_empty() {
        // Sentiment-only path.
        match &sentiment {
            Some(s) if s.supportive => OverallStatus::Validated,
            Some(_) => OverallStatus::Rejected,
            None => OverallStatus::InsufficientlyEvaluated,
        }
    } else if evaluated < cfg.min_evaluated_windows {
        OverallStatus::InsufficientlyEvaluated
    } else {
        let sentiment_ok = sentiment.as_ref().map(|s| s.supportive);
        let majority = passed * 2 > evaluated;
        let tie = passed * 2 == evaluated;
        match (majority, tie, sentiment_ok) {
            (true, _, None) | (true, _, Some(true)) => OverallStatus::Validated,
            // A supportive sentiment dimension breaks an exact tie.
            (false, true, Some(true)) => OverallStatus::Validated,
            _ => OverallStatus::Rejected,
        }
    };

    info!(
        strategy = %candidate.id,
        evaluated,
        passed,
        overall = %overall,
        "verdict decided"
    );

    ValidationVerdict {
        strategy_id: candidate.id.clone(),
        windows: windows.clone(),
        sentiment,
        overall,
        evaluated_at: Utc::now(),
    }
}

/// At least one reliable lag, correlated in the trade direction.
fn is_supportive(correlations: &[SentimentCorrelation], direction: Direction) -> bool {
    correlations.iter().any(|c| {
        c.reliable
            && match direction {
                Direction::Long => c.coefficient > 0.0,
                Direction::Short => c.coefficient < 0.0,
            }
    })
}
