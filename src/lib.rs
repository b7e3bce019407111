// Health records, timezone conversion and line protocol
pub mod record;

// OAuth credential persistence
pub mod credentials;

// Configuration (TOML file + environment)
pub mod config;

// Time-series sinks (InfluxDB 1.x / 2.x)
pub mod sink;

pub use record::{FieldValue, Record};
