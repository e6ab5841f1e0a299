use crate::types::Granularity;

/// Which market data provider to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    /// Live spot klines from the exchange.
    Live,
    /// Deterministic generated series; no network access needed.
    Synthetic,
}

impl std::fmt::Display for DataMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataMode::Live => write!(f, "live"),
            DataMode::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// All configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
///
/// Every validation threshold is tunable here rather than hard-coded; the
/// defaults are deliberately conservative.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub data_mode: DataMode,

    // Validation universe
    pub symbol: String,
    pub lookback_days: i64,
    pub windows: Vec<Granularity>,
    pub sentiment_lags: Vec<u32>,

    // Statistical gates
    pub min_trades: usize,
    pub significance_alpha: f64,
    pub min_sentiment_samples: usize,
    pub min_evaluated_windows: usize,

    // Simulation
    pub gap_tolerance: u32,
    pub fee_rate: f64,

    // Provider limits
    pub max_concurrent_fetches: usize,
    pub fetch_timeout_secs: u64,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let data_mode = match required_env("DATA_MODE").to_lowercase().as_str() {
            "live" => DataMode::Live,
            "synthetic" => DataMode::Synthetic,
            other => panic!("ERROR: DATA_MODE must be 'live' or 'synthetic', got: '{other}'"),
        };

        Config {
            database_url: required_env("DATABASE_URL"),
            data_mode,
            symbol: optional_env("SYMBOL").unwrap_or_else(|| "BTCUSDT".to_string()),
            lookback_days: parsed_env("LOOKBACK_DAYS", 200),
            windows: windows_env("WINDOWS"),
            sentiment_lags: lags_env("SENTIMENT_LAGS"),
            min_trades: parsed_env("MIN_TRADES", 20),
            significance_alpha: parsed_env("SIGNIFICANCE_ALPHA", 0.05),
            min_sentiment_samples: parsed_env("MIN_SENTIMENT_SAMPLES", 30),
            min_evaluated_windows: parsed_env("MIN_EVALUATED_WINDOWS", 3),
            gap_tolerance: parsed_env("GAP_TOLERANCE", 2),
            fee_rate: parsed_env("FEE_RATE", 0.001),
            max_concurrent_fetches: parsed_env("MAX_CONCURRENT_FETCHES", 4),
            fetch_timeout_secs: parsed_env("FETCH_TIMEOUT_SECS", 30),
        }
    }
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    optional_env(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Comma-separated bar sizes in minutes, e.g. "15,30,60,120,240,1440".
fn windows_env(key: &str) -> Vec<Granularity> {
    match optional_env(key) {
        None => Granularity::ALL.to_vec(),
        Some(raw) => raw
            .split(',')
            .map(|s| {
                s.trim().parse::<Granularity>().unwrap_or_else(|e| {
                    panic!("{key} contains an unsupported window '{}': {e}", s.trim())
                })
            })
            .collect(),
    }
}

/// Comma-separated forward-return lags in minutes.
fn lags_env(key: &str) -> Vec<u32> {
    match optional_env(key) {
        None => Granularity::ALL.iter().map(|g| g.minutes()).collect(),
        Some(raw) => raw
            .split(',')
            .map(|s| {
                s.trim().parse::<u32>().unwrap_or_else(|_| {
                    panic!("{key} contains a non-numeric lag: '{}'", s.trim())
                })
            })
            .collect(),
    }
}
