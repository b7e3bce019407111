//! Sync orchestration.
//!
//! [`SyncOrchestrator`] owns the API client, the record buffer and the
//! collector list, and drives them in one of three modes:
//! - incremental: one pass over the trailing window
//! - bulk: a user-supplied range, flushed per planned window
//! - recurring: the [`TaskTable`] loop, one tick per poll interval

use crate::buffer::RecordBuffer;
use crate::client::{ResilientClient, Sleeper, SyncError};
use crate::collector::{CollectContext, Collector, WindowSpec};
use crate::scheduler::{Clock, TaskAction, TaskTable, TOKEN_REFRESH_EVERY};
use crate::window::{plan, Window};
use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use vitalsync::sink::TimeSeriesSink;

/// Run-wide settings.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Written as the `Device` tag
    pub device: String,
    pub timezone: Tz,
    /// Days before today included in the trailing window
    pub trailing_days: u32,
    /// Sleep between scheduler ticks
    pub poll_interval: Duration,
}

/// True for errors that must stop the process (auth and credential storage).
pub fn is_fatal(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<SyncError>()
        .map_or(false, SyncError::is_fatal)
}

pub struct SyncOrchestrator {
    client: ResilientClient,
    sink: Arc<dyn TimeSeriesSink>,
    buffer: RecordBuffer,
    collectors: Vec<Arc<dyn Collector>>,
    settings: SyncSettings,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    last_refresh: DateTime<Utc>,
}

impl SyncOrchestrator {
    /// The token is assumed fresh at construction; the next proactive
    /// refresh is one hour later.
    pub fn new(
        client: ResilientClient,
        sink: Arc<dyn TimeSeriesSink>,
        collectors: Vec<Arc<dyn Collector>>,
        settings: SyncSettings,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let last_refresh = clock.now();
        Self {
            client,
            sink,
            buffer: RecordBuffer::new(),
            collectors,
            settings,
            clock,
            sleeper,
            last_refresh,
        }
    }

    pub fn buffer(&self) -> &RecordBuffer {
        &self.buffer
    }

    pub fn client(&self) -> &ResilientClient {
        &self.client
    }

    /// Today's date in the configured timezone.
    pub fn today(&self) -> NaiveDate {
        self.clock
            .now()
            .with_timezone(&self.settings.timezone)
            .date_naive()
    }

    /// `trailing_days` before today through today.
    pub fn trailing_window(&self) -> Window {
        let today = self.today();
        let start = today - ChronoDuration::days(i64::from(self.settings.trailing_days));
        Window::new(start, today)
    }

    fn resolve(&self, which: WindowSpec, trailing: Window) -> Window {
        match which {
            WindowSpec::Trailing => trailing,
            WindowSpec::Today => Window::single(trailing.end),
            WindowSpec::Yesterday => Window::single(trailing.end - ChronoDuration::days(1)),
        }
    }

    /// Runs every collector once over the trailing window, then flushes.
    pub async fn run_incremental(&mut self) -> Result<()> {
        let window = self.trailing_window();
        info!(window = %window, collectors = self.collectors.len(), "Starting incremental sync");

        for collector in self.collectors.clone() {
            self.run_collector(collector.as_ref(), window).await?;
        }
        self.flush().await;
        Ok(())
    }

    /// Backfills `range` for every collector with history, flushing after
    /// each window. The token is refreshed hourly between windows.
    pub async fn run_bulk(&mut self, range: Window) -> Result<()> {
        let collectors: Vec<Arc<dyn Collector>> = self
            .collectors
            .iter()
            .filter(|c| c.backfills())
            .cloned()
            .collect();
        info!(range = %range, collectors = collectors.len(), "Starting bulk backfill");

        for collector in collectors {
            let windows = plan(range, collector.max_span());
            info!(
                collector = collector.name(),
                windows = windows.clone().count(),
                "Backfilling"
            );
            for window in windows {
                self.refresh_if_stale().await?;
                self.run_window(collector.as_ref(), &window).await?;
                self.flush().await;
            }
        }

        info!(range = %range, "Bulk backfill complete");
        Ok(())
    }

    /// One scheduler tick: run every due task in registration order, then
    /// flush whatever they collected.
    pub async fn tick(&mut self, table: &mut TaskTable) -> Result<()> {
        let now = self.clock.now();
        let trailing = self.trailing_window();

        for task in table.due(now) {
            match task.action {
                TaskAction::RefreshToken => {
                    info!("Refreshing access token");
                    self.client.refresh_token().await?;
                    self.last_refresh = self.clock.now();
                }
                TaskAction::Collect { collector, window } => {
                    let window = self.resolve(window, trailing);
                    self.run_collector(collector.as_ref(), window).await?;
                }
            }
        }

        if !self.buffer.is_empty() {
            self.flush().await;
        }
        Ok(())
    }

    /// Recurring loop. Returns only on a fatal error.
    pub async fn run_forever(&mut self) -> Result<()> {
        let mut table = TaskTable::for_collectors(&self.collectors, self.clock.now());
        info!(tasks = table.len(), "Scheduler started");

        loop {
            self.tick(&mut table).await?;
            self.sleeper.sleep(self.settings.poll_interval).await;
        }
    }

    /// Runs `collector` over `window`, split by the collector's span.
    async fn run_collector(&mut self, collector: &dyn Collector, window: Window) -> Result<()> {
        for sub in plan(window, collector.max_span()) {
            self.run_window(collector, &sub).await?;
        }
        Ok(())
    }

    /// Contains non-fatal collector errors; fatal ones propagate.
    async fn run_window(&mut self, collector: &dyn Collector, window: &Window) -> Result<()> {
        let mut ctx = CollectContext {
            client: &mut self.client,
            buffer: &mut self.buffer,
            timezone: self.settings.timezone,
            device: &self.settings.device,
            now: self.clock.now(),
        };

        match collector.collect(&mut ctx, window).await {
            Ok(()) => Ok(()),
            Err(e) if is_fatal(&e) => {
                error!(collector = collector.name(), window = %window, error = %e, "Fatal error");
                Err(e)
            }
            Err(e) => {
                warn!(collector = collector.name(), window = %window, error = %e, "Collection failed");
                Ok(())
            }
        }
    }

    async fn refresh_if_stale(&mut self) -> Result<()> {
        let now = self.clock.now();
        let age = (now - self.last_refresh).to_std().unwrap_or_default();
        if age >= TOKEN_REFRESH_EVERY {
            info!("Refreshing access token");
            self.client.refresh_token().await?;
            self.last_refresh = now;
        }
        Ok(())
    }

    /// Writes the buffer to the sink and clears it, whatever the outcome.
    ///
    /// Returns the number of records written (0 on failure).
    pub async fn flush(&mut self) -> usize {
        let batch = self.buffer.take();
        if batch.is_empty() {
            return 0;
        }

        match self.sink.write(&batch).await {
            Ok(()) => {
                info!(sink = self.sink.name(), records = batch.len(), "Flushed records");
                batch.len()
            }
            Err(e) => {
                error!(
                    sink = self.sink.name(),
                    records = batch.len(),
                    error = %e,
                    "Sink write failed, dropping batch"
                );
                0
            }
        }
    }
}
