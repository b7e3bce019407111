//! Collector Manager - Resilient Fitbit to time-series sync engine.
//!
//! Pulls health metrics from the Fitbit Web API, normalizes them into
//! [`vitalsync::Record`]s and writes them to InfluxDB. The engine survives
//! rate limits, token expiry, server errors and network drops without
//! losing its place.
//!
//! # Architecture
//!
//! ```text
//!      Fitbit Web API
//!          ↑
//! ┌─────────────────────────────────────────┐
//! │       ResilientClient                    │
//! │  - Retry state machine (429/401/5xx/net) │
//! │  - TokenManager (refresh + persist)      │
//! └─────────────────────────────────────────┘
//!          ↑
//! ┌─────────────────────────────────────────┐
//! │       Collectors (implement trait)       │
//! │  - Fetch one window per call             │
//! │  - Append records to the buffer          │
//! └─────────────────────────────────────────┘
//!          ↑
//! ┌─────────────────────────────────────────┐
//! │       SyncOrchestrator                   │
//! │  - Incremental / bulk / recurring modes  │
//! │  - Window planning, flush after cycle    │
//! └─────────────────────────────────────────┘
//!          ↓
//!     TimeSeriesSink (InfluxDB 1.x / 2.x)
//! ```
//!
//! # Core Types
//!
//! - [`Collector`] - Trait every metric family implements
//! - [`CollectContext`] - Client, buffer and timezone lent to a collector
//! - [`SyncOrchestrator`] - Owns the client and buffer, runs the modes
//! - [`client::SyncError`] - Engine error taxonomy
//!
//! Everything runs on one control path: collectors and HTTP calls are
//! awaited in sequence, and backoff sleeps block that path.

mod collector;
pub mod buffer;
pub mod client;
pub mod collectors;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod window;

#[cfg(test)]
mod testing;

// Re-export public types
pub use collector::{Cadence, CollectContext, Collector, WindowSpec};
pub use orchestrator::{SyncOrchestrator, SyncSettings};
