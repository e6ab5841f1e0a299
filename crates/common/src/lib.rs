pub mod config;
pub mod error;
pub mod provider;
pub mod rule;
pub mod stats;
pub mod types;

pub use config::{Config, DataMode};
pub use error::{BacktestError, Error, ProviderError, RegistryError, Result, RuleParseError};
pub use provider::{MarketDataProvider, SentimentFeed};
pub use rule::{Direction, Indicator, SignalRule, Threshold, ThresholdOp};
pub use types::*;
