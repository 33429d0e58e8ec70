//! Port traits the domain depends on; adapters implement them.

pub mod config_port;
pub mod data_port;
pub mod price_port;
pub mod state_port;
