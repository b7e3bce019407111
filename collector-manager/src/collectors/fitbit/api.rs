//! Typed payloads and endpoint calls for the Fitbit Web API.
//!
//! Optional fields are `Option` or `#[serde(default)]`; anything the
//! transformers rely on is required, so a renamed key surfaces as
//! [`SyncError::InvalidPayload`] instead of silently producing no data.

use crate::client::{ResilientClient, SyncError};
use crate::window::Window;
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use std::collections::HashMap;

use super::config::{ECG_PAGE_SIZE, PROFILE_PATH, RECENT_ACTIVITY_LIMIT};

/// Accepts `12`, `12.5` or `"12.5"`.
fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn opt_number_or_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "number_or_string")] f64);
    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(v)| v))
}

/// Some summary endpoints return an object for a single day and an array
/// for a range (and `{}` when there is nothing).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
    Empty(EmptyObject),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmptyObject {}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
            OneOrMany::Empty(_) => Vec::new(),
        }
    }
}

/// `{"dateTime": "...", "value": {...}}`, the shape of most daily series.
#[derive(Debug, Deserialize)]
pub struct DailyEntry<V> {
    #[serde(rename = "dateTime")]
    pub date_time: String,
    pub value: V,
}

#[derive(Debug, Deserialize)]
pub struct IntradayPoint {
    pub time: String,
    pub value: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct IntradaySeries {
    #[serde(default)]
    pub dataset: Vec<IntradayPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HrvValue {
    pub daily_rmssd: Option<f64>,
    pub deep_rmssd: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct HrvResponse {
    #[serde(default)]
    pub hrv: Vec<DailyEntry<HrvValue>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreathingRateValue {
    pub breathing_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct BreathingRateResponse {
    #[serde(default)]
    pub br: Vec<DailyEntry<BreathingRateValue>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkinTemperatureValue {
    pub nightly_relative: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SkinTemperatureResponse {
    #[serde(rename = "tempSkin", default)]
    pub temp_skin: Vec<DailyEntry<SkinTemperatureValue>>,
}

#[derive(Debug, Deserialize)]
pub struct Spo2Minute {
    pub minute: String,
    pub value: f64,
}

#[derive(Debug, Deserialize)]
pub struct Spo2IntradayDay {
    #[serde(rename = "dateTime")]
    pub date_time: String,
    #[serde(default)]
    pub minutes: Vec<Spo2Minute>,
}

#[derive(Debug, Deserialize)]
pub struct Spo2DailyValue {
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LevelSummary {
    #[serde(default)]
    pub minutes: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepStage {
    pub date_time: String,
    pub level: String,
    pub seconds: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct SleepLevels {
    #[serde(default)]
    pub summary: HashMap<String, LevelSummary>,
    #[serde(default)]
    pub data: Vec<SleepStage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepLog {
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub is_main_sleep: bool,
    pub efficiency: Option<i64>,
    pub minutes_after_wakeup: Option<i64>,
    pub minutes_asleep: Option<i64>,
    pub minutes_to_fall_asleep: Option<i64>,
    pub time_in_bed: Option<i64>,
    pub minutes_awake: Option<i64>,
    #[serde(default)]
    pub levels: SleepLevels,
}

#[derive(Debug, Deserialize)]
pub struct SleepResponse {
    #[serde(default)]
    pub sleep: Vec<SleepLog>,
}

/// Tracker and water series report values as strings.
#[derive(Debug, Deserialize)]
pub struct TrackerPoint {
    #[serde(rename = "dateTime")]
    pub date_time: String,
    #[serde(deserialize_with = "number_or_string")]
    pub value: f64,
}

#[derive(Debug, Deserialize)]
pub struct HeartZone {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub minutes: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartDay {
    #[serde(default)]
    pub heart_rate_zones: Vec<HeartZone>,
    pub resting_heart_rate: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HeartResponse {
    #[serde(rename = "activities-heart", default)]
    pub days: Vec<DailyEntry<HeartDay>>,
}

/// VO2 max comes as a number or as a range like `"34-38"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Vo2Max {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardioValue {
    pub vo2_max: Vo2Max,
}

#[derive(Debug, Deserialize)]
pub struct CardioScoreResponse {
    #[serde(rename = "cardioScore", default)]
    pub scores: Vec<DailyEntry<CardioValue>>,
}

#[derive(Debug, Deserialize)]
pub struct CoreTemperatureValue {
    pub value: f64,
}

#[derive(Debug, Deserialize)]
pub struct CoreTemperatureResponse {
    #[serde(rename = "tempCore", default)]
    pub readings: Vec<DailyEntry<CoreTemperatureValue>>,
}

#[derive(Debug, Deserialize)]
pub struct WaterResponse {
    #[serde(rename = "foods-log-water", default)]
    pub days: Vec<TrackerPoint>,
}

#[derive(Debug, Deserialize)]
pub struct FoodUnit {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedFood {
    pub meal_type_id: i64,
    pub name: String,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub amount: f64,
    pub unit: Option<FoodUnit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodEntry {
    pub log_date: String,
    pub log_time: Option<String>,
    pub logged_food: LoggedFood,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NutritionSummary {
    pub calories: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub protein: f64,
    pub sodium: f64,
}

#[derive(Debug, Deserialize)]
pub struct FoodLogResponse {
    #[serde(default)]
    pub foods: Vec<FoodEntry>,
    pub summary: Option<NutritionSummary>,
}

#[derive(Debug, Deserialize)]
pub struct WeightLog {
    pub date: String,
    pub time: Option<String>,
    pub weight: f64,
    pub bmi: Option<f64>,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Deserialize)]
pub struct WeightResponse {
    #[serde(default)]
    pub weight: Vec<WeightLog>,
}

#[derive(Debug, Deserialize)]
pub struct FatLog {
    pub date: String,
    pub time: Option<String>,
    pub fat: f64,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Deserialize)]
pub struct FatResponse {
    #[serde(default)]
    pub fat: Vec<FatLog>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivitySummary {
    pub calories_out: i64,
    pub activity_calories: i64,
    pub steps: i64,
    pub floors: i64,
    pub sedentary_minutes: i64,
    pub lightly_active_minutes: i64,
    pub fairly_active_minutes: i64,
    pub very_active_minutes: i64,
}

#[derive(Debug, Deserialize)]
pub struct DailyActivityResponse {
    pub summary: Option<ActivitySummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub start_time: String,
    pub activity_name: Option<String>,
    pub log_type: Option<String>,
    /// Milliseconds
    pub duration: Option<f64>,
    /// Milliseconds
    pub active_duration: Option<f64>,
    pub average_heart_rate: Option<i64>,
    pub calories: Option<i64>,
    pub steps: Option<i64>,
    /// Kilometres
    pub distance: Option<f64>,
    /// Metres per second
    pub speed: Option<f64>,
    /// Seconds per kilometre
    pub pace: Option<f64>,
    pub elevation_gain: Option<f64>,
    #[serde(default)]
    pub heart_rate_zones: Vec<HeartZone>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityListResponse {
    #[serde(default)]
    pub activities: Vec<ActivityLog>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcgReading {
    pub start_time: Option<String>,
    pub average_heart_rate: Option<i64>,
    pub lead_number: Option<i64>,
    #[serde(default, deserialize_with = "opt_number_or_string")]
    pub sampling_frequency_hz: Option<f64>,
    pub waveform_samples: Option<Vec<serde_json::Value>>,
    pub result_classification: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcgListResponse {
    #[serde(default)]
    pub ecg_readings: Vec<EcgReading>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub battery_level: Option<i64>,
    pub last_sync_time: String,
    pub device_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goals {
    pub calories_out: Option<i64>,
    pub distance: Option<f64>,
    pub floors: Option<i64>,
    pub steps: Option<i64>,
    pub active_minutes: Option<i64>,
    pub active_zone_minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GoalsResponse {
    pub goals: Option<Goals>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LifetimeTotals {
    pub distance: f64,
    pub floors: i64,
    pub steps: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct Lifetime {
    pub tracker: Option<LifetimeTotals>,
    pub total: Option<LifetimeTotals>,
}

#[derive(Debug, Deserialize)]
pub struct LifetimeResponse {
    pub lifetime: Option<Lifetime>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUser {
    pub timezone: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileResponse {
    pub user: ProfileUser,
}

fn range(window: &Window) -> String {
    format!("{}/{}", window.start_str(), window.end_str())
}

/// Endpoint calls on top of a borrowed [`ResilientClient`].
///
/// Every method returns `Ok(None)` when the request was skipped after
/// repeated server errors.
pub struct FitbitApi<'a> {
    client: &'a mut ResilientClient,
}

impl<'a> FitbitApi<'a> {
    pub fn new(client: &'a mut ResilientClient) -> Self {
        Self { client }
    }

    async fn get<T: DeserializeOwned>(&mut self, path: &str) -> Result<Option<T>, SyncError> {
        self.client.get_json(path, &[]).await
    }

    /// Reads a series stored under a resource-dependent key such as
    /// `activities-heart-intraday`.
    async fn get_keyed<T: DeserializeOwned>(
        &mut self,
        path: &str,
        key: &str,
    ) -> Result<Option<T>, SyncError> {
        let mut body: HashMap<String, serde_json::Value> = match self.get(path).await? {
            Some(b) => b,
            None => return Ok(None),
        };
        let invalid = |reason: String| SyncError::InvalidPayload {
            url: self.client.url(path),
            reason,
        };
        let value = body
            .remove(key)
            .ok_or_else(|| invalid(format!("missing key `{}`", key)))?;
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| invalid(e.to_string()))
    }

    /// One day of an intraday series (`resource` is "heart" or "steps").
    pub async fn intraday(
        &mut self,
        resource: &str,
        date: &str,
        detail: &str,
    ) -> Result<Option<IntradaySeries>, SyncError> {
        let path = format!(
            "/1/user/-/activities/{}/date/{}/1d/{}.json",
            resource, date, detail
        );
        let key = format!("activities-{}-intraday", resource);
        self.get_keyed(&path, &key).await
    }

    pub async fn hrv(&mut self, window: &Window) -> Result<Option<HrvResponse>, SyncError> {
        self.get(&format!("/1/user/-/hrv/date/{}.json", range(window)))
            .await
    }

    pub async fn breathing_rate(
        &mut self,
        window: &Window,
    ) -> Result<Option<BreathingRateResponse>, SyncError> {
        self.get(&format!("/1/user/-/br/date/{}.json", range(window)))
            .await
    }

    pub async fn skin_temperature(
        &mut self,
        window: &Window,
    ) -> Result<Option<SkinTemperatureResponse>, SyncError> {
        self.get(&format!("/1/user/-/temp/skin/date/{}.json", range(window)))
            .await
    }

    pub async fn spo2_intraday(
        &mut self,
        window: &Window,
    ) -> Result<Option<OneOrMany<Spo2IntradayDay>>, SyncError> {
        self.get(&format!("/1/user/-/spo2/date/{}/all.json", range(window)))
            .await
    }

    pub async fn spo2_daily(
        &mut self,
        window: &Window,
    ) -> Result<Option<OneOrMany<DailyEntry<Spo2DailyValue>>>, SyncError> {
        self.get(&format!("/1/user/-/spo2/date/{}.json", range(window)))
            .await
    }

    pub async fn sleep(&mut self, window: &Window) -> Result<Option<SleepResponse>, SyncError> {
        self.get(&format!("/1.2/user/-/sleep/date/{}.json", range(window)))
            .await
    }

    /// Daily tracker series such as `minutesSedentary` or `steps`.
    pub async fn tracker_series(
        &mut self,
        series: &str,
        window: &Window,
    ) -> Result<Option<Vec<TrackerPoint>>, SyncError> {
        let path = format!(
            "/1/user/-/activities/tracker/{}/date/{}.json",
            series,
            range(window)
        );
        let key = format!("activities-tracker-{}", series);
        self.get_keyed(&path, &key).await
    }

    pub async fn heart(&mut self, window: &Window) -> Result<Option<HeartResponse>, SyncError> {
        self.get(&format!("/1/user/-/activities/heart/date/{}.json", range(window)))
            .await
    }

    pub async fn cardio_score(
        &mut self,
        window: &Window,
    ) -> Result<Option<CardioScoreResponse>, SyncError> {
        self.get(&format!("/1/user/-/cardioscore/date/{}.json", range(window)))
            .await
    }

    pub async fn core_temperature(
        &mut self,
        window: &Window,
    ) -> Result<Option<CoreTemperatureResponse>, SyncError> {
        self.get(&format!("/1/user/-/temp/core/date/{}.json", range(window)))
            .await
    }

    pub async fn water(&mut self, window: &Window) -> Result<Option<WaterResponse>, SyncError> {
        self.get(&format!("/1/user/-/foods/log/water/date/{}.json", range(window)))
            .await
    }

    pub async fn food_log(&mut self, date: &str) -> Result<Option<FoodLogResponse>, SyncError> {
        self.get(&format!("/1/user/-/foods/log/date/{}.json", date))
            .await
    }

    pub async fn weight(&mut self, window: &Window) -> Result<Option<WeightResponse>, SyncError> {
        self.get(&format!("/1/user/-/body/log/weight/date/{}.json", range(window)))
            .await
    }

    pub async fn body_fat(&mut self, window: &Window) -> Result<Option<FatResponse>, SyncError> {
        self.get(&format!("/1/user/-/body/log/fat/date/{}.json", range(window)))
            .await
    }

    pub async fn activity_summary(
        &mut self,
        date: &str,
    ) -> Result<Option<DailyActivityResponse>, SyncError> {
        self.get(&format!("/1/user/-/activities/date/{}.json", date))
            .await
    }

    /// Most recent activities logged before `before_date` (exclusive).
    pub async fn recent_activities(
        &mut self,
        before_date: &str,
    ) -> Result<Option<ActivityListResponse>, SyncError> {
        let query = [
            ("beforeDate", before_date.to_string()),
            ("sort", "desc".to_string()),
            ("limit", RECENT_ACTIVITY_LIMIT.to_string()),
            ("offset", "0".to_string()),
        ];
        self.client
            .get_json("/1/user/-/activities/list.json", &query)
            .await
    }

    pub async fn ecg_page(
        &mut self,
        before_date: &str,
        offset: usize,
    ) -> Result<Option<EcgListResponse>, SyncError> {
        let query = [
            ("beforeDate", before_date.to_string()),
            ("sort", "desc".to_string()),
            ("limit", ECG_PAGE_SIZE.to_string()),
            ("offset", offset.to_string()),
        ];
        self.client.get_json("/1/user/-/ecg/list.json", &query).await
    }

    pub async fn devices(&mut self) -> Result<Option<Vec<Device>>, SyncError> {
        self.get("/1/user/-/devices.json").await
    }

    /// `period` is "daily" or "weekly".
    pub async fn goals(&mut self, period: &str) -> Result<Option<GoalsResponse>, SyncError> {
        self.get(&format!("/1/user/-/activities/goals/{}.json", period))
            .await
    }

    pub async fn lifetime(&mut self) -> Result<Option<LifetimeResponse>, SyncError> {
        self.get("/1/user/-/activities.json").await
    }

    pub async fn profile(&mut self) -> Result<Option<ProfileResponse>, SyncError> {
        self.get(PROFILE_PATH).await
    }

    /// Delay between paged requests.
    pub async fn pause(&self, duration: std::time::Duration) {
        self.client.pause(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_point_accepts_string_values() {
        let point: TrackerPoint =
            serde_json::from_str(r#"{"dateTime":"2024-01-01","value":"1043"}"#).unwrap();
        assert_eq!(point.value, 1043.0);

        let point: TrackerPoint =
            serde_json::from_str(r#"{"dateTime":"2024-01-01","value":2.5}"#).unwrap();
        assert_eq!(point.value, 2.5);

        assert!(serde_json::from_str::<TrackerPoint>(
            r#"{"dateTime":"2024-01-01","value":"n/a"}"#
        )
        .is_err());
    }

    #[test]
    fn test_one_or_many_shapes() {
        let many: OneOrMany<DailyEntry<Spo2DailyValue>> = serde_json::from_str(
            r#"[{"dateTime":"2024-01-01","value":{"avg":95.2,"min":91.0,"max":99.0}}]"#,
        )
        .unwrap();
        assert_eq!(many.into_vec().len(), 1);

        let one: OneOrMany<DailyEntry<Spo2DailyValue>> = serde_json::from_str(
            r#"{"dateTime":"2024-01-01","value":{"avg":95.2,"min":91.0,"max":99.0}}"#,
        )
        .unwrap();
        assert_eq!(one.into_vec()[0].date_time, "2024-01-01");

        let empty: OneOrMany<DailyEntry<Spo2DailyValue>> = serde_json::from_str("{}").unwrap();
        assert!(empty.into_vec().is_empty());
    }

    #[test]
    fn test_ecg_sampling_frequency_string_or_number() {
        let reading: EcgReading = serde_json::from_str(
            r#"{"startTime":"2024-01-01T10:00:00","samplingFrequencyHz":"250"}"#,
        )
        .unwrap();
        assert_eq!(reading.sampling_frequency_hz, Some(250.0));

        let reading: EcgReading =
            serde_json::from_str(r#"{"startTime":"2024-01-01T10:00:00"}"#).unwrap();
        assert_eq!(reading.sampling_frequency_hz, None);
    }

    #[test]
    fn test_sleep_log_requires_start_time() {
        let result = serde_json::from_str::<SleepResponse>(
            r#"{"sleep":[{"endTime":"2024-01-02T07:00:00.000"}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_vo2_max_variants() {
        let range: CardioValue = serde_json::from_str(r#"{"vo2Max":"41-45"}"#).unwrap();
        assert!(matches!(range.vo2_max, Vo2Max::Text(ref s) if s == "41-45"));
        let number: CardioValue = serde_json::from_str(r#"{"vo2Max":47.3}"#).unwrap();
        assert!(matches!(number.vo2_max, Vo2Max::Number(n) if n == 47.3));
    }
}
