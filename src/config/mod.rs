pub mod env;
pub use env::{apply_env, apply_vars};

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Complete sync configuration.
///
/// Every section has defaults, so an empty TOML file (or no file at all) is a
/// valid starting point; environment variables are layered on top with
/// [`apply_env`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub fitbit: FitbitConfig,
    #[serde(default)]
    pub influxdb: InfluxConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote API access and user locale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitbitConfig {
    /// OAuth client id (personal application)
    #[serde(default)]
    pub client_id: String,
    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,
    /// JSON file holding the access/refresh token pair
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    /// Sent as `Accept-Language`
    #[serde(default = "default_language")]
    pub language: String,
    /// Written as the `Device` tag on every record
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// IANA timezone name, or "Automatic" to read it from the user profile
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_token_file() -> PathBuf {
    PathBuf::from("/app/tokens/tokens.json")
}

fn default_language() -> String {
    "en_US".to_string()
}

fn default_device_name() -> String {
    "Pixel Watch 3".to_string()
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_api_base_url() -> String {
    "https://api.fitbit.com".to_string()
}

impl Default for FitbitConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_file: default_token_file(),
            language: default_language(),
            device_name: default_device_name(),
            timezone: default_timezone(),
            api_base_url: default_api_base_url(),
        }
    }
}

/// How the local timezone is determined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimezoneSetting {
    /// Looked up from the user's profile at startup
    Automatic,
    Fixed(Tz),
}

impl FitbitConfig {
    pub fn timezone_setting(&self) -> Result<TimezoneSetting> {
        if self.timezone.eq_ignore_ascii_case("automatic") {
            return Ok(TimezoneSetting::Automatic);
        }
        let tz = Tz::from_str(self.timezone.trim())
            .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {}", self.timezone, e))?;
        Ok(TimezoneSetting::Fixed(tz))
    }

    /// OAuth token endpoint derived from the API base URL.
    pub fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.api_base_url.trim_end_matches('/'))
    }
}

/// Time-series store schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InfluxVersion {
    #[serde(rename = "1")]
    V1,
    #[serde(rename = "2")]
    V2,
}

impl FromStr for InfluxVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1" => Ok(InfluxVersion::V1),
            "2" => Ok(InfluxVersion::V2),
            other => bail!(
                "Unsupported InfluxDB version '{}': supported values are 1 and 2",
                other
            ),
        }
    }
}

/// Sink connection settings for both schema versions.
///
/// Only the fields of the selected `version` are used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    #[serde(default = "default_influx_version")]
    pub version: InfluxVersion,

    // 1.x
    #[serde(default = "default_influx_host")]
    pub host: String,
    #[serde(default = "default_influx_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_influx_database")]
    pub database: String,

    // 2.x
    #[serde(default = "default_influx_url")]
    pub url: String,
    #[serde(default = "default_influx_org")]
    pub org: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_influx_bucket")]
    pub bucket: String,
}

fn default_influx_version() -> InfluxVersion {
    InfluxVersion::V2
}

fn default_influx_host() -> String {
    "influxdb".to_string()
}

fn default_influx_port() -> u16 {
    8086
}

fn default_influx_database() -> String {
    "fitbit".to_string()
}

fn default_influx_url() -> String {
    "http://influxdb:8086".to_string()
}

fn default_influx_org() -> String {
    "home".to_string()
}

fn default_influx_bucket() -> String {
    "health_data".to_string()
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            version: default_influx_version(),
            host: default_influx_host(),
            port: default_influx_port(),
            username: String::new(),
            password: String::new(),
            database: default_influx_database(),
            url: default_influx_url(),
            org: default_influx_org(),
            token: String::new(),
            bucket: default_influx_bucket(),
        }
    }
}

/// Retry ceilings for the resilient client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts after which a 5xx response is no longer retried
    #[serde(default = "default_server_error_max_retry")]
    pub server_error_max_retry: u32,
    /// Attempts after which a 401 response is fatal
    #[serde(default = "default_expired_token_max_retry")]
    pub expired_token_max_retry: u32,
    /// Return "no data" instead of failing once the 5xx ceiling is hit
    #[serde(default = "default_skip_request_on_server_error")]
    pub skip_request_on_server_error: bool,
}

fn default_server_error_max_retry() -> u32 {
    3
}

fn default_expired_token_max_retry() -> u32 {
    5
}

fn default_skip_request_on_server_error() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            server_error_max_retry: default_server_error_max_retry(),
            expired_token_max_retry: default_expired_token_max_retry(),
            skip_request_on_server_error: default_skip_request_on_server_error(),
        }
    }
}

/// Run mode selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// true: incremental update over a trailing window; false: bulk backfill
    #[serde(default = "default_auto_date_range")]
    pub auto_date_range: bool,
    /// Size of the trailing window in days
    #[serde(default = "default_trailing_days")]
    pub trailing_days: u32,
    /// Keep running the recurring scheduler after the first pass.
    /// Defaults to `auto_date_range` when unset.
    #[serde(default)]
    pub continuous: Option<bool>,
    /// Sleep between scheduler ticks (seconds)
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
}

fn default_auto_date_range() -> bool {
    true
}

fn default_trailing_days() -> u32 {
    1
}

fn default_poll_interval_seconds() -> u64 {
    30
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            auto_date_range: default_auto_date_range(),
            trailing_days: default_trailing_days(),
            continuous: None,
            poll_interval_seconds: default_poll_interval_seconds(),
        }
    }
}

impl ScheduleConfig {
    pub fn continuous(&self) -> bool {
        self.continuous.unwrap_or(self.auto_date_range)
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log file, truncated at startup. `None` logs to stdout only.
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("/app/logs/fitbit.log"))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<SyncConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
    let config: SyncConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config {}", path))?;
    Ok(config)
}
