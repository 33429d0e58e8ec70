//! Core domain types and logic.

pub mod backtest;
pub mod calibration;
pub mod code_data;
pub mod config;
pub mod config_validation;
pub mod error;
pub mod execution;
pub mod factor;
pub mod indicator;
pub mod instrument;
pub mod metrics;
pub mod ohlcv;
pub mod portfolio;
pub mod position;
pub mod quote;
pub mod ranking;
pub mod scoring;
pub mod universe;
pub mod validation;
pub mod weights;
