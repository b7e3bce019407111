//! Cooperative task table for continuous operation.
//!
//! Every recurring job is a [`ScheduledTask`] with a fixed interval. The
//! orchestrator asks the table which tasks are [`due`](TaskTable::due) once
//! per tick and runs them in registration order on its single control path.

use crate::collector::{Collector, WindowSpec};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Proactive token refresh cadence.
pub const TOKEN_REFRESH_EVERY: Duration = Duration::from_secs(3600);

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone)]
pub enum TaskAction {
    RefreshToken,
    Collect {
        collector: Arc<dyn Collector>,
        window: WindowSpec,
    },
}

impl fmt::Debug for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskAction::RefreshToken => write!(f, "RefreshToken"),
            TaskAction::Collect { collector, window } => f
                .debug_struct("Collect")
                .field("collector", &collector.name())
                .field("window", window)
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub name: String,
    pub interval: Duration,
    pub next_due: DateTime<Utc>,
    pub action: TaskAction,
}

impl ScheduledTask {
    /// Moves `next_due` one interval forward; if that is still not in the
    /// future, the next run is one interval from `now`. Missed runs are not
    /// replayed.
    fn advance(&mut self, now: DateTime<Utc>) {
        let step = chrono_interval(self.interval);
        self.next_due = self.next_due + step;
        if self.next_due <= now {
            self.next_due = now + step;
        }
    }
}

fn chrono_interval(interval: Duration) -> ChronoDuration {
    ChronoDuration::milliseconds(i64::try_from(interval.as_millis()).unwrap_or(i64::MAX / 1000))
}

#[derive(Debug, Default)]
pub struct TaskTable {
    tasks: Vec<ScheduledTask>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token refresh first, then every collector cadence in collector order.
    /// Each task first fires one interval after `now`.
    pub fn for_collectors(collectors: &[Arc<dyn Collector>], now: DateTime<Utc>) -> Self {
        let mut table = Self::new();
        table.register("token_refresh", TOKEN_REFRESH_EVERY, TaskAction::RefreshToken, now);

        for collector in collectors {
            for cadence in collector.cadences() {
                let name = match cadence.window {
                    WindowSpec::Trailing => collector.name().to_string(),
                    WindowSpec::Today => format!("{}:today", collector.name()),
                    WindowSpec::Yesterday => format!("{}:yesterday", collector.name()),
                };
                table.register(
                    name,
                    cadence.every,
                    TaskAction::Collect {
                        collector: collector.clone(),
                        window: cadence.window,
                    },
                    now,
                );
            }
        }
        table
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        interval: Duration,
        action: TaskAction,
        now: DateTime<Utc>,
    ) {
        self.tasks.push(ScheduledTask {
            name: name.into(),
            interval,
            next_due: now + chrono_interval(interval),
            action,
        });
    }

    /// Returns the tasks due at `now` in registration order and schedules
    /// their next run.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<ScheduledTask> {
        let mut due = Vec::new();
        for task in self.tasks.iter_mut().filter(|t| t.next_due <= now) {
            due.push(task.clone());
            task.advance(now);
        }
        due
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
