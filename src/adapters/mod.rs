//! Concrete adapter implementations for ports.

pub mod bar_price_feed;
pub mod csv_adapter;
pub mod file_config_adapter;
pub mod json_store;
