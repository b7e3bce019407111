use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use vitalsync::record::{parse_local_timestamp, Record};

use super::api::{
    ActivityListResponse, ActivitySummary, BreathingRateResponse, CardioScoreResponse,
    CoreTemperatureResponse, DailyEntry, Device, EcgReading, FatResponse, FoodLogResponse, Goals,
    HeartResponse, HrvResponse, IntradaySeries, Lifetime, SkinTemperatureResponse, SleepResponse,
    Spo2DailyValue, Spo2IntradayDay, TrackerPoint, Vo2Max, WaterResponse, WeightResponse,
};
use super::config::HEART_ZONE_FIELDS;

/// Timezone and device name shared by every record of a run.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub timezone: Tz,
    pub device: &'a str,
}

impl<'a> Scope<'a> {
    pub fn new(timezone: Tz, device: &'a str) -> Self {
        Self { timezone, device }
    }

    /// Parses a local API timestamp (or bare date) into UTC.
    pub fn at(&self, raw: &str) -> Result<DateTime<Utc>> {
        parse_local_timestamp(raw, self.timezone).map_err(Into::into)
    }

    /// New record tagged with the device name.
    fn record(&self, measurement: &str, raw_time: &str) -> Result<Record> {
        Ok(Record::new(measurement, self.at(raw_time)?).tag("Device", self.device))
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Numeric code stored for a sleep stage.
pub fn sleep_level_code(level: &str) -> i64 {
    match level {
        "deep" => 0,
        "light" | "asleep" => 1,
        "rem" | "restless" => 2,
        "wake" | "awake" => 3,
        _ => 4,
    }
}

/// Expands a VO2 max reading into `(value, range_low, range_high)`.
///
/// A range such as `"34-38"` is averaged; a plain number is its own range.
pub fn vo2_max_range(vo2: &Vo2Max) -> Result<(f64, f64, f64)> {
    match vo2 {
        Vo2Max::Number(n) => Ok((*n, *n, *n)),
        Vo2Max::Text(text) => match text.split_once('-') {
            Some((low, high)) => {
                let low: f64 = low.trim().parse().context("invalid VO2 max range")?;
                let high: f64 = high.trim().parse().context("invalid VO2 max range")?;
                Ok(((low + high) / 2.0, low, high))
            }
            None => {
                let value: f64 = text.trim().parse().context("invalid VO2 max value")?;
                Ok((value, value, value))
            }
        },
    }
}

/// One day of an intraday dataset; point times are local times of `date`.
pub fn intraday(
    measurement: &str,
    date: &str,
    series: &IntradaySeries,
    scope: &Scope<'_>,
) -> Result<Vec<Record>> {
    series
        .dataset
        .iter()
        .map(|point| {
            Ok(scope
                .record(measurement, &format!("{}T{}", date, point.time))?
                .field("value", point.value.round() as i64))
        })
        .collect()
}

pub fn hrv(response: &HrvResponse, scope: &Scope<'_>) -> Result<Vec<Record>> {
    response
        .hrv
        .iter()
        .map(|day| {
            Ok(scope
                .record("HRV", &day.date_time)?
                .field("dailyRmssd", day.value.daily_rmssd)
                .field("deepRmssd", day.value.deep_rmssd))
        })
        .collect()
}

pub fn breathing_rate(response: &BreathingRateResponse, scope: &Scope<'_>) -> Result<Vec<Record>> {
    response
        .br
        .iter()
        .map(|day| {
            Ok(scope
                .record("BreathingRate", &day.date_time)?
                .field("value", day.value.breathing_rate))
        })
        .collect()
}

pub fn skin_temperature(
    response: &SkinTemperatureResponse,
    scope: &Scope<'_>,
) -> Result<Vec<Record>> {
    response
        .temp_skin
        .iter()
        .map(|day| {
            Ok(scope
                .record("Skin Temperature Variation", &day.date_time)?
                .field("RelativeValue", day.value.nightly_relative))
        })
        .collect()
}

pub fn spo2_intraday(days: &[Spo2IntradayDay], scope: &Scope<'_>) -> Result<Vec<Record>> {
    days.iter()
        .flat_map(|day| day.minutes.iter())
        .map(|sample| {
            Ok(scope
                .record("SPO2_Intraday", &sample.minute)?
                .field("value", sample.value))
        })
        .collect()
}

/// Per sleep log: one summary, one level point per stage, and a wake
/// marker at the end time.
pub fn sleep(response: &SleepResponse, scope: &Scope<'_>) -> Result<Vec<Record>> {
    let mut records = Vec::new();

    for log in &response.sleep {
        let main = log.is_main_sleep.to_string();
        let summary = &log.levels.summary;
        let minutes = |stage: &str| summary.get(stage).map(|s| s.minutes);

        let (light, rem, deep) = match (minutes("light"), minutes("rem"), minutes("deep")) {
            (Some(light), Some(rem), Some(deep)) => (light, rem, deep),
            // Classic logs only report asleep/restless/awake
            _ => (
                minutes("asleep").unwrap_or(0),
                minutes("restless").unwrap_or(0),
                0,
            ),
        };

        records.push(
            scope
                .record("Sleep Summary", &log.start_time)?
                .tag("isMainSleep", main.as_str())
                .field("efficiency", log.efficiency)
                .field("minutesAfterWakeup", log.minutes_after_wakeup)
                .field("minutesAsleep", log.minutes_asleep)
                .field("minutesToFallAsleep", log.minutes_to_fall_asleep)
                .field("minutesInBed", log.time_in_bed)
                .field("minutesAwake", log.minutes_awake)
                .field("minutesLight", light)
                .field("minutesREM", rem)
                .field("minutesDeep", deep),
        );

        for stage in &log.levels.data {
            records.push(
                scope
                    .record("Sleep Levels", &stage.date_time)?
                    .tag("isMainSleep", main.as_str())
                    .field("level", sleep_level_code(&stage.level))
                    .field("duration_seconds", stage.seconds),
            );
        }

        records.push(
            scope
                .record("Sleep Levels", &log.end_time)?
                .tag("isMainSleep", main.as_str())
                .field("level", sleep_level_code("wake"))
                .field("duration_seconds", None::<i64>),
        );
    }

    Ok(records)
}

/// `Activity Minutes` with the series name as the field key.
pub fn activity_minutes(
    series: &str,
    points: &[TrackerPoint],
    scope: &Scope<'_>,
) -> Result<Vec<Record>> {
    points
        .iter()
        .map(|point| {
            Ok(scope
                .record("Activity Minutes", &point.date_time)?
                .field(series, point.value.round() as i64))
        })
        .collect()
}

/// Daily totals stored under their own measurement as `value`.
pub fn activity_totals(
    measurement: &str,
    points: &[TrackerPoint],
    scope: &Scope<'_>,
) -> Result<Vec<Record>> {
    points
        .iter()
        .map(|point| {
            Ok(scope
                .record(measurement, &point.date_time)?
                .field("value", point.value))
        })
        .collect()
}

pub fn heart_zones(response: &HeartResponse, scope: &Scope<'_>) -> Result<Vec<Record>> {
    let mut records = Vec::new();

    for day in &response.days {
        let zones = &day.value.heart_rate_zones;
        let record = HEART_ZONE_FIELDS
            .iter()
            .enumerate()
            .fold(scope.record("HR zones", &day.date_time)?, |record, (i, name)| {
                record.field(*name, zones.get(i).map_or(0, |z| z.minutes))
            });
        records.push(record);

        if let Some(resting) = day.value.resting_heart_rate {
            records.push(
                scope
                    .record("RestingHR", &day.date_time)?
                    .field("value", resting),
            );
        }
    }

    Ok(records)
}

pub fn spo2_daily(days: &[DailyEntry<Spo2DailyValue>], scope: &Scope<'_>) -> Result<Vec<Record>> {
    days.iter()
        .map(|day| {
            Ok(scope
                .record("SPO2", &day.date_time)?
                .field("avg", day.value.avg)
                .field("max", day.value.max)
                .field("min", day.value.min))
        })
        .collect()
}

pub fn cardio_score(response: &CardioScoreResponse, scope: &Scope<'_>) -> Result<Vec<Record>> {
    response
        .scores
        .iter()
        .map(|day| {
            let (value, low, high) = vo2_max_range(&day.value.vo2_max)
                .with_context(|| format!("cardio score for {}", day.date_time))?;
            Ok(scope
                .record("CardioScore", &day.date_time)?
                .field("value", value)
                .field("range_low", low)
                .field("range_high", high))
        })
        .collect()
}

pub fn core_temperature(
    response: &CoreTemperatureResponse,
    scope: &Scope<'_>,
) -> Result<Vec<Record>> {
    response
        .readings
        .iter()
        .map(|day| {
            Ok(scope
                .record("CoreTemperature", &day.date_time)?
                .field("value", day.value.value))
        })
        .collect()
}

pub fn water(response: &WaterResponse, scope: &Scope<'_>) -> Result<Vec<Record>> {
    response
        .days
        .iter()
        .map(|day| {
            Ok(scope
                .record("WaterLog", &day.date_time)?
                .field("amount", day.value))
        })
        .collect()
}

/// Daily nutrition totals plus one record per logged food.
pub fn food_log(date: &str, response: &FoodLogResponse, scope: &Scope<'_>) -> Result<Vec<Record>> {
    let mut records = Vec::new();

    if let Some(summary) = &response.summary {
        records.push(
            scope
                .record("NutritionSummary", date)?
                .field("calories", summary.calories)
                .field("carbs", summary.carbs)
                .field("fat", summary.fat)
                .field("fiber", summary.fiber)
                .field("protein", summary.protein)
                .field("sodium", summary.sodium),
        );
    }

    for entry in &response.foods {
        let time = entry.log_time.as_deref().unwrap_or("00:00:00");
        let food = &entry.logged_food;
        records.push(
            scope
                .record("FoodLog", &format!("{}T{}", entry.log_date, time))?
                .tag("mealType", food.meal_type_id.to_string())
                .tag("foodName", food.name.as_str())
                .field("calories", food.calories)
                .field("amount", food.amount)
                .field("unitId", food.unit.as_ref().map(|u| u.id)),
        );
    }

    Ok(records)
}

pub fn weight(response: &WeightResponse, scope: &Scope<'_>) -> Result<Vec<Record>> {
    response
        .weight
        .iter()
        .map(|log| {
            let time = log.time.as_deref().unwrap_or("00:00:00");
            Ok(scope
                .record("BodyMeasurements", &format!("{}T{}", log.date, time))?
                .tag("source", log.source.as_str())
                .field("weight", log.weight)
                .field("bmi", log.bmi.unwrap_or(0.0)))
        })
        .collect()
}

pub fn body_fat(response: &FatResponse, scope: &Scope<'_>) -> Result<Vec<Record>> {
    response
        .fat
        .iter()
        .map(|log| {
            let time = log.time.as_deref().unwrap_or("00:00:00");
            Ok(scope
                .record("BodyFat", &format!("{}T{}", log.date, time))?
                .tag("source", log.source.as_str())
                .field("fat", log.fat))
        })
        .collect()
}

pub fn activity_summary(
    date: &str,
    summary: &ActivitySummary,
    scope: &Scope<'_>,
) -> Result<Record> {
    Ok(scope
        .record("ActivitySummary", date)?
        .field("caloriesOut", summary.calories_out)
        .field("activityCalories", summary.activity_calories)
        .field("steps", summary.steps)
        .field("floors", summary.floors)
        .field("sedentaryMinutes", summary.sedentary_minutes)
        .field("lightlyActiveMinutes", summary.lightly_active_minutes)
        .field("fairlyActiveMinutes", summary.fairly_active_minutes)
        .field("veryActiveMinutes", summary.very_active_minutes))
}

/// One `Activities` record per logged exercise.
///
/// Durations become minutes, speed km/h, pace min/km; heart-rate zones are
/// stored as a share of the total zone minutes.
pub fn activities(response: &ActivityListResponse, scope: &Scope<'_>) -> Result<Vec<Record>> {
    let mut records = Vec::with_capacity(response.activities.len());

    for activity in &response.activities {
        let time = scope.at(&activity.start_time)?;
        let activity_date = activity.start_time.get(..10).unwrap_or(&activity.start_time);

        let mut record = Record::new("Activities", time)
            .tag(
                "activity_name",
                activity.activity_name.as_deref().unwrap_or("Unknown-Activity"),
            )
            .tag("device", scope.device)
            .tag("log_type", activity.log_type.as_deref().unwrap_or("automatic"))
            .tag("activity_date", activity_date)
            .field(
                "duration_minutes",
                round_to(activity.duration.unwrap_or(0.0) / 60_000.0, 2),
            )
            .field(
                "active_duration_minutes",
                round_to(activity.active_duration.unwrap_or(0.0) / 60_000.0, 2),
            )
            .field("average_heart_rate", activity.average_heart_rate.unwrap_or(0))
            .field("calories", activity.calories.unwrap_or(0))
            .field("steps", activity.steps.unwrap_or(0))
            .field("distance_km", round_to(activity.distance.unwrap_or(0.0), 3));

        if let Some(speed) = activity.speed {
            record = record.field("speed_kmh", round_to(speed * 3.6, 2));
        }
        if let Some(pace) = activity.pace {
            record = record.field("pace_min_km", round_to(pace / 60.0, 2));
        }
        if let Some(gain) = activity.elevation_gain {
            record = record.field("elevation_gain_meters", gain);
        }

        let zone_total: i64 = activity.heart_rate_zones.iter().map(|z| z.minutes).sum();
        if zone_total > 0 {
            for zone in &activity.heart_rate_zones {
                let key = format!("hr_zone_{}_pct", zone.name.to_lowercase().replace(' ', "_"));
                let share = zone.minutes as f64 / zone_total as f64 * 100.0;
                record = record.field(key, round_to(share, 1));
            }
        }

        records.push(record);
    }

    Ok(records)
}

/// Records from one page of ECG readings (newest first).
#[derive(Debug, Default)]
pub struct EcgPage {
    pub records: Vec<Record>,
    /// A reading older than the window start was seen; later pages are older still.
    pub reached_start: bool,
}

/// ECG start times carry a `Z` but are local wall-clock times.
pub fn ecg_page(readings: &[EcgReading], start: NaiveDate, scope: &Scope<'_>) -> Result<EcgPage> {
    let mut page = EcgPage::default();

    for reading in readings {
        let Some(start_time) = reading.start_time.as_deref() else {
            tracing::warn!("ECG reading without startTime, skipping");
            continue;
        };
        let local = start_time.trim_end_matches('Z');
        let date = NaiveDate::parse_from_str(local.get(..10).unwrap_or(local), "%Y-%m-%d")
            .with_context(|| format!("invalid ECG startTime '{}'", start_time))?;
        if date < start {
            page.reached_start = true;
            break;
        }

        let mut record = scope.record("ECG", local)?.tag(
            "classification",
            reading.result_classification.as_deref().unwrap_or("unknown"),
        );
        if let Some(hr) = reading.average_heart_rate {
            record = record.field("averageHeartRate", hr);
        }
        if let Some(lead) = reading.lead_number {
            record = record.field("leadNumber", lead);
        }
        if let Some(hz) = reading.sampling_frequency_hz {
            record = record.field("samplingFrequencyHz", hz);
        }
        if let Some(samples) = &reading.waveform_samples {
            record = record.field("numberOfSamples", samples.len());
        }
        page.records.push(record);
    }

    Ok(page)
}

/// Battery level at the device's last sync. Untagged.
pub fn battery(device: &Device, scope: &Scope<'_>) -> Result<Option<Record>> {
    let Some(level) = device.battery_level else {
        return Ok(None);
    };
    Ok(Some(
        Record::new("DeviceBatteryLevel", scope.at(&device.last_sync_time)?)
            .field("value", level as f64),
    ))
}

/// Current goals stamped at `now`. `period` is "daily" or "weekly".
pub fn goals(period: &str, goals: &Goals, now: DateTime<Utc>, scope: &Scope<'_>) -> Record {
    let mut record = Record::new("ActivityGoals", now)
        .tag("Device", scope.device)
        .tag("type", period);
    if period == "daily" {
        record = record.field("caloriesOut", goals.calories_out.unwrap_or(0));
    }
    record = record
        .field("distance", goals.distance.unwrap_or(0.0))
        .field("floors", goals.floors.unwrap_or(0))
        .field("steps", goals.steps.unwrap_or(0))
        .field("activeMinutes", goals.active_minutes.unwrap_or(0));
    if period == "daily" {
        record = record.field("activeZoneMinutes", goals.active_zone_minutes.unwrap_or(0));
    }
    record
}

/// Tracker-only and all-source lifetime totals stamped at `now`.
pub fn lifetime(lifetime: &Lifetime, now: DateTime<Utc>, scope: &Scope<'_>) -> Vec<Record> {
    [("tracker", &lifetime.tracker), ("total", &lifetime.total)]
        .into_iter()
        .filter_map(|(source, totals)| {
            totals.as_ref().map(|t| {
                Record::new("LifetimeStats", now)
                    .tag("Device", scope.device)
                    .tag("source", source)
                    .field("distance", t.distance)
                    .field("floors", t.floors)
                    .field("steps", t.steps)
            })
        })
        .collect()
}
