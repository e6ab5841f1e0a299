pub mod rsi;
pub mod sma;

pub use rsi::RollingRsi;
pub use sma::RollingSma;
