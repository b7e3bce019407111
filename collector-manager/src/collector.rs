use crate::buffer::RecordBuffer;
use crate::client::ResilientClient;
use crate::window::{MaxSpan, Window};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::time::Duration;

/// Everything a collector may touch during one run.
///
/// The client and buffer are lent for the duration of the call; collectors
/// hold no state of their own between runs.
pub struct CollectContext<'a> {
    pub client: &'a mut ResilientClient,
    pub buffer: &'a mut RecordBuffer,
    /// User's local timezone, used to interpret naive API timestamps
    pub timezone: Tz,
    /// Written as the `Device` tag
    pub device: &'a str,
    /// Wall-clock time of the run, for snapshot records
    pub now: DateTime<Utc>,
}

/// Which dates a recurring task hands to its collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSpec {
    /// The configured trailing window ending today
    Trailing,
    Today,
    Yesterday,
}

/// One recurring schedule entry for a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub window: WindowSpec,
    pub every: Duration,
}

impl Cadence {
    pub fn trailing(every: Duration) -> Self {
        Self {
            window: WindowSpec::Trailing,
            every,
        }
    }
}

/// A metric family fetched from the remote API.
///
/// # Lifecycle
/// 1. The orchestrator plans windows no longer than `max_span()`
/// 2. `collect()` runs once per window and appends records to the buffer
/// 3. The orchestrator flushes the buffer to the sink
///
/// # Example
/// ```no_run
/// use collector_manager::{Cadence, CollectContext, Collector};
/// use collector_manager::window::{MaxSpan, Window};
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use std::time::Duration;
///
/// struct RestingHeartRate;
///
/// #[async_trait]
/// impl Collector for RestingHeartRate {
///     fn name(&self) -> &str {
///         "resting_hr"
///     }
///
///     fn max_span(&self) -> MaxSpan {
///         MaxSpan::Days(365)
///     }
///
///     fn cadences(&self) -> Vec<Cadence> {
///         vec![Cadence::trailing(Duration::from_secs(6 * 3600))]
///     }
///
///     async fn collect(&self, ctx: &mut CollectContext<'_>, window: &Window) -> Result<()> {
///         // Fetch with ctx.client, push records into ctx.buffer
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Collector: Send + Sync {
    /// Unique lowercase identifier, used for task names and logging.
    fn name(&self) -> &str;

    /// Longest date range a single `collect()` call may receive.
    fn max_span(&self) -> MaxSpan;

    /// Recurring schedule entries, in registration order.
    fn cadences(&self) -> Vec<Cadence>;

    /// Whether bulk backfill runs this collector. Snapshot metrics
    /// (current battery, goals, lifetime totals) have no history to fill.
    fn backfills(&self) -> bool {
        true
    }

    /// Fetches `window` and appends normalized records to `ctx.buffer`.
    ///
    /// A skipped request ("no data") is not an error. Errors that wrap a
    /// fatal [`crate::client::SyncError`] stop the process.
    async fn collect(&self, ctx: &mut CollectContext<'_>, window: &Window) -> Result<()>;
}
