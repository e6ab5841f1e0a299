//! Strategy registry: the persisted, append-only store of candidates and
//! their verdict history. The single source of truth for candidate status.

pub mod store;

pub use store::Registry;
