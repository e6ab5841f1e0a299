//! Verdict engine: folds per-window benchmark outcomes and the optional
//! sentiment dimension into a single validated/rejected decision.

pub mod engine;

pub use engine::{decide, VerdictConfig};
