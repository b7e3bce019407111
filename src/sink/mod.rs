//! Time-series sink.
//!
//! A sink accepts a batch of [`Record`]s through a single write call. The
//! caller owns the failure policy; sinks only report success or failure.

mod influx;

pub use influx::{InfluxV1Sink, InfluxV2Sink};

use crate::config::{InfluxConfig, InfluxVersion};
use crate::record::Record;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Destination for collected records.
#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    /// Short backend name for logging ("influxdb-v1", ...)
    fn name(&self) -> &str;

    /// Writes the whole batch. An empty batch is a no-op.
    async fn write(&self, records: &[Record]) -> Result<()>;
}

/// Builds the sink selected by `config.version`.
pub fn build_sink(config: &InfluxConfig) -> Result<Arc<dyn TimeSeriesSink>> {
    let sink: Arc<dyn TimeSeriesSink> = match config.version {
        InfluxVersion::V1 => Arc::new(InfluxV1Sink::from_config(config)?),
        InfluxVersion::V2 => Arc::new(InfluxV2Sink::from_config(config)?),
    };
    Ok(sink)
}
