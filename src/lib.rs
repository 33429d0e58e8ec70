//! dipranker: multi-factor dip candidate ranking with a walk-forward
//! backtest and a simulated portfolio driven by the same score.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], and [`pipeline`] wiring them
//! together. The library logs through `tracing` and never installs a
//! subscriber.

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod pipeline;
