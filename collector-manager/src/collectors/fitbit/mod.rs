pub mod api;
pub mod config;
pub mod transformer;

use crate::buffer::RecordBuffer;
use crate::client::ResilientClient;
use crate::collector::{Cadence, CollectContext, Collector, WindowSpec};
use crate::window::{MaxSpan, Window};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use self::api::FitbitApi;
use self::config::*;
use self::transformer::Scope;

/// Metric families fetched from the Fitbit Web API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    HeartIntraday,
    StepsIntraday,
    Hrv,
    BreathingRate,
    SkinTemperature,
    Spo2Intraday,
    Sleep,
    ActivityMinutes,
    ActivityTotals,
    HeartZones,
    Spo2Daily,
    CardioScore,
    CoreTemperature,
    Ecg,
    Water,
    Food,
    Body,
    Goals,
    ActivitySummary,
    Battery,
    RecentActivities,
    Lifetime,
}

impl Metric {
    /// Every metric, in the order a sync pass runs them.
    pub const ALL: [Metric; 22] = [
        Metric::HeartIntraday,
        Metric::StepsIntraday,
        Metric::Hrv,
        Metric::BreathingRate,
        Metric::SkinTemperature,
        Metric::Spo2Intraday,
        Metric::Sleep,
        Metric::ActivityMinutes,
        Metric::ActivityTotals,
        Metric::HeartZones,
        Metric::Spo2Daily,
        Metric::CardioScore,
        Metric::CoreTemperature,
        Metric::Ecg,
        Metric::Water,
        Metric::Food,
        Metric::Body,
        Metric::Goals,
        Metric::ActivitySummary,
        Metric::Battery,
        Metric::RecentActivities,
        Metric::Lifetime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::HeartIntraday => "heart_intraday",
            Metric::StepsIntraday => "steps_intraday",
            Metric::Hrv => "hrv",
            Metric::BreathingRate => "breathing_rate",
            Metric::SkinTemperature => "skin_temperature",
            Metric::Spo2Intraday => "spo2_intraday",
            Metric::Sleep => "sleep",
            Metric::ActivityMinutes => "activity_minutes",
            Metric::ActivityTotals => "activity_totals",
            Metric::HeartZones => "heart_zones",
            Metric::Spo2Daily => "spo2_daily",
            Metric::CardioScore => "cardio_score",
            Metric::CoreTemperature => "core_temperature",
            Metric::Ecg => "ecg",
            Metric::Water => "water",
            Metric::Food => "food",
            Metric::Body => "body",
            Metric::Goals => "goals",
            Metric::ActivitySummary => "activity_summary",
            Metric::Battery => "battery",
            Metric::RecentActivities => "recent_activities",
            Metric::Lifetime => "lifetime",
        }
    }

    /// Widest date range the endpoint accepts in one request.
    pub fn max_span(self) -> MaxSpan {
        match self {
            Metric::HeartIntraday
            | Metric::StepsIntraday
            | Metric::Food
            | Metric::ActivitySummary => MaxSpan::Days(1),
            Metric::Hrv
            | Metric::BreathingRate
            | Metric::SkinTemperature
            | Metric::Spo2Intraday
            | Metric::CardioScore
            | Metric::CoreTemperature
            | Metric::Water
            | Metric::Body => MaxSpan::Days(30),
            Metric::Sleep => MaxSpan::Days(100),
            Metric::ActivityMinutes | Metric::ActivityTotals | Metric::HeartZones => {
                MaxSpan::Days(365)
            }
            Metric::Spo2Daily
            | Metric::Ecg
            | Metric::RecentActivities
            | Metric::Goals
            | Metric::Battery
            | Metric::Lifetime => MaxSpan::Unbounded,
        }
    }

    pub fn cadences(self) -> Vec<Cadence> {
        let every = match self {
            Metric::HeartIntraday | Metric::StepsIntraday => {
                return vec![
                    Cadence {
                        window: WindowSpec::Today,
                        every: INTRADAY_TODAY_EVERY,
                    },
                    Cadence {
                        window: WindowSpec::Yesterday,
                        every: INTRADAY_YESTERDAY_EVERY,
                    },
                ];
            }
            Metric::ActivitySummary => {
                return vec![Cadence {
                    window: WindowSpec::Today,
                    every: ACTIVITY_SUMMARY_EVERY,
                }];
            }
            Metric::Battery => BATTERY_EVERY,
            Metric::Hrv | Metric::BreathingRate | Metric::SkinTemperature | Metric::Spo2Intraday => {
                MONTHLY_FAMILY_EVERY
            }
            Metric::Sleep => SLEEP_EVERY,
            Metric::ActivityMinutes
            | Metric::ActivityTotals
            | Metric::HeartZones
            | Metric::Spo2Daily => YEARLY_FAMILY_EVERY,
            Metric::RecentActivities
            | Metric::Ecg
            | Metric::Water
            | Metric::Food
            | Metric::Body
            | Metric::Goals => HOURLY_EVERY,
            Metric::CardioScore | Metric::CoreTemperature => CARDIO_TEMPERATURE_EVERY,
            Metric::Lifetime => LIFETIME_EVERY,
        };
        vec![Cadence::trailing(every)]
    }

    /// Current-state readings with no history to backfill.
    pub fn is_snapshot(self) -> bool {
        matches!(self, Metric::Battery | Metric::Goals | Metric::Lifetime)
    }
}

/// Collector for one [`Metric`].
pub struct FitbitCollector {
    metric: Metric,
}

impl FitbitCollector {
    pub fn new(metric: Metric) -> Self {
        Self { metric }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Fetches `window` and appends each request's records to `records` as
    /// soon as it is mapped, so a later failing request keeps what came
    /// before it. A skipped request yields nothing for that endpoint.
    async fn fetch(
        &self,
        api: &mut FitbitApi<'_>,
        scope: &Scope<'_>,
        window: &Window,
        now: DateTime<Utc>,
        records: &mut RecordBuffer,
    ) -> Result<()> {
        match self.metric {
            Metric::HeartIntraday | Metric::StepsIntraday => {
                let (resource, detail, measurement) = match self.metric {
                    Metric::HeartIntraday => ("heart", "1sec", "HeartRate_Intraday"),
                    _ => ("steps", "1min", "Steps_Intraday"),
                };
                for day in window.dates() {
                    let date = day.format("%Y-%m-%d").to_string();
                    if let Some(series) = api.intraday(resource, &date, detail).await? {
                        records.extend(transformer::intraday(measurement, &date, &series, scope)?);
                    }
                }
            }
            Metric::Hrv => {
                if let Some(resp) = api.hrv(window).await? {
                    records.extend(transformer::hrv(&resp, scope)?);
                }
            }
            Metric::BreathingRate => {
                if let Some(resp) = api.breathing_rate(window).await? {
                    records.extend(transformer::breathing_rate(&resp, scope)?);
                }
            }
            Metric::SkinTemperature => {
                if let Some(resp) = api.skin_temperature(window).await? {
                    records.extend(transformer::skin_temperature(&resp, scope)?);
                }
            }
            Metric::Spo2Intraday => {
                if let Some(resp) = api.spo2_intraday(window).await? {
                    records.extend(transformer::spo2_intraday(&resp.into_vec(), scope)?);
                }
            }
            Metric::Sleep => {
                if let Some(resp) = api.sleep(window).await? {
                    records.extend(transformer::sleep(&resp, scope)?);
                }
            }
            Metric::ActivityMinutes => {
                for series in ACTIVITY_MINUTE_SERIES {
                    if let Some(points) = api.tracker_series(series, window).await? {
                        records.extend(transformer::activity_minutes(series, &points, scope)?);
                    }
                }
            }
            Metric::ActivityTotals => {
                for (series, measurement) in ACTIVITY_TOTAL_SERIES {
                    if let Some(points) = api.tracker_series(series, window).await? {
                        records.extend(transformer::activity_totals(measurement, &points, scope)?);
                    }
                }
            }
            Metric::HeartZones => {
                if let Some(resp) = api.heart(window).await? {
                    records.extend(transformer::heart_zones(&resp, scope)?);
                }
            }
            Metric::Spo2Daily => {
                if let Some(resp) = api.spo2_daily(window).await? {
                    records.extend(transformer::spo2_daily(&resp.into_vec(), scope)?);
                }
            }
            Metric::CardioScore => {
                if let Some(resp) = api.cardio_score(window).await? {
                    records.extend(transformer::cardio_score(&resp, scope)?);
                }
            }
            Metric::CoreTemperature => {
                if let Some(resp) = api.core_temperature(window).await? {
                    records.extend(transformer::core_temperature(&resp, scope)?);
                }
            }
            Metric::Ecg => {
                let before = window.end_str();
                let mut offset = 0;
                loop {
                    let Some(page) = api.ecg_page(&before, offset).await? else {
                        break;
                    };
                    if page.ecg_readings.is_empty() {
                        break;
                    }
                    let mapped = transformer::ecg_page(&page.ecg_readings, window.start, scope)?;
                    records.extend(mapped.records);
                    if mapped.reached_start || page.ecg_readings.len() < ECG_PAGE_SIZE {
                        break;
                    }
                    offset += ECG_PAGE_SIZE;
                    api.pause(ECG_PAGE_DELAY).await;
                }
            }
            Metric::Water => {
                if let Some(resp) = api.water(window).await? {
                    records.extend(transformer::water(&resp, scope)?);
                }
            }
            Metric::Food => {
                for day in window.dates() {
                    let date = day.format("%Y-%m-%d").to_string();
                    if let Some(resp) = api.food_log(&date).await? {
                        records.extend(transformer::food_log(&date, &resp, scope)?);
                    }
                }
            }
            Metric::Body => {
                if let Some(resp) = api.weight(window).await? {
                    records.extend(transformer::weight(&resp, scope)?);
                }
                if let Some(resp) = api.body_fat(window).await? {
                    records.extend(transformer::body_fat(&resp, scope)?);
                }
            }
            Metric::Goals => {
                for period in ["daily", "weekly"] {
                    if let Some(goals) = api.goals(period).await?.and_then(|r| r.goals) {
                        records.push(transformer::goals(period, &goals, now, scope));
                    }
                }
            }
            Metric::ActivitySummary => {
                for day in window.dates() {
                    let date = day.format("%Y-%m-%d").to_string();
                    if let Some(summary) = api.activity_summary(&date).await?.and_then(|r| r.summary) {
                        records.push(transformer::activity_summary(&date, &summary, scope)?);
                    }
                }
            }
            Metric::Battery => {
                let devices = api.devices().await?.unwrap_or_default();
                match devices.first() {
                    Some(device) => records.extend(transformer::battery(device, scope)?),
                    None => debug!("No paired devices reported"),
                }
            }
            Metric::RecentActivities => {
                // beforeDate is exclusive
                let before = (window.end + Duration::days(1)).format("%Y-%m-%d").to_string();
                if let Some(resp) = api.recent_activities(&before).await? {
                    records.extend(transformer::activities(&resp, scope)?);
                }
            }
            Metric::Lifetime => {
                if let Some(lifetime) = api.lifetime().await?.and_then(|r| r.lifetime) {
                    records.extend(transformer::lifetime(&lifetime, now, scope));
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Collector for FitbitCollector {
    fn name(&self) -> &str {
        self.metric.name()
    }

    fn max_span(&self) -> MaxSpan {
        self.metric.max_span()
    }

    fn cadences(&self) -> Vec<Cadence> {
        self.metric.cadences()
    }

    fn backfills(&self) -> bool {
        !self.metric.is_snapshot()
    }

    async fn collect(&self, ctx: &mut CollectContext<'_>, window: &Window) -> Result<()> {
        let scope = Scope::new(ctx.timezone, ctx.device);
        let mut api = FitbitApi::new(&mut *ctx.client);
        let before = ctx.buffer.len();
        let result = self
            .fetch(&mut api, &scope, window, ctx.now, &mut *ctx.buffer)
            .await;

        info!(
            collector = self.name(),
            window = %window,
            records = ctx.buffer.len() - before,
            "Recorded"
        );
        result
    }
}

/// Looks up the account timezone from the user profile.
pub async fn resolve_timezone(client: &mut ResilientClient) -> Result<Tz> {
    let profile = FitbitApi::new(client)
        .profile()
        .await?
        .ok_or_else(|| anyhow!("profile request was skipped after repeated server errors"))?;
    profile
        .user
        .timezone
        .parse::<Tz>()
        .map_err(|e| anyhow!("unknown profile timezone '{}': {}", profile.user.timezone, e))
}
