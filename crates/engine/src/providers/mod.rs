pub mod binance;
pub mod synthetic;

pub use binance::BinanceProvider;
pub use synthetic::SyntheticProvider;
