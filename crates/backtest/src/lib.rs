pub mod comparator;
pub mod indicators;
pub mod metrics;
pub mod simulator;

pub use comparator::{compare, ComparatorConfig};
pub use metrics::compute;
pub use simulator::{simulate, SimulatorConfig};
