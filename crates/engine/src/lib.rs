pub mod cache;
pub mod providers;
pub mod runner;

pub use cache::{SeriesCache, SeriesKey};
pub use providers::{BinanceProvider, SyntheticProvider};
pub use runner::{Runner, RunnerConfig, ValidationConfig};
