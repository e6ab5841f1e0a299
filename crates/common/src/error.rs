use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::Granularity;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Market data provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Backtest error: {0}")]
    Backtest(#[from] BacktestError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Rule parse error: {0}")]
    Rule(#[from] RuleParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures of the external market data / sentiment collaborators.
/// All of these are per-window: the affected window is marked "not
/// evaluated" and the rest of the run proceeds.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("fetch timed out after {0}s")]
    Timeout(u64),
}

/// Failures local to a single backtest window.
#[derive(Debug, Error)]
pub enum BacktestError {
    /// More than the tolerated number of bars missing in a row. Gaps are
    /// never interpolated over; the window is dropped instead.
    #[error("data gap of {missing} bars at {at}")]
    DataGap { at: DateTime<Utc>, missing: u32 },

    #[error("series granularity {got} does not match requested {expected}")]
    GranularityMismatch {
        expected: Granularity,
        got: Granularity,
    },

    #[error("price series is empty")]
    EmptySeries,

    /// The rule has no price-bar interpretation (sentiment-threshold rules
    /// are validated through the sentiment path instead).
    #[error("rule cannot be simulated on price bars: {0}")]
    UnsupportedRule(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The append could not be committed. The whole write is retried
    /// transactionally; nothing is ever partially applied.
    #[error("registry write conflict")]
    WriteConflict,

    #[error("candidate not found: {0}")]
    CandidateNotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored record could not be decoded: {0}")]
    Decode(String),
}

/// Rejection of a scraped rule description at the parser boundary,
/// before the candidate ever reaches the simulator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleParseError {
    #[error("unrecognized rule description: {0:?}")]
    Unrecognized(String),

    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid parameter {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },
}
