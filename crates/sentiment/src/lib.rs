//! Sentiment correlation validator.
//!
//! Aligns a scored sentiment series with forward market returns at a set of
//! candidate lags and scores how reliably the signal leads price. One
//! result per configured lag; picking a "best" lag is the verdict engine's
//! call, not ours.

pub mod correlation;

pub use correlation::{validate, CorrelationConfig};
