use super::SyncConfig;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;

/// Overlays process environment variables onto `config`.
///
/// Variable names match the ones used by existing deployments
/// (`FITBIT_*`, `INFLUXDB_*`, `AUTO_DATE_RANGE`, ...). Unset variables leave
/// the current value untouched; set but unparseable values are an error.
pub fn apply_env(config: &mut SyncConfig) -> Result<()> {
    apply_vars(config, |key| std::env::var(key).ok())
}

/// Same as [`apply_env`] with an explicit variable lookup.
pub fn apply_vars<F>(config: &mut SyncConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let fitbit = &mut config.fitbit;
    set_string(&lookup, "FITBIT_CLIENT_ID", &mut fitbit.client_id);
    set_string(&lookup, "FITBIT_CLIENT_SECRET", &mut fitbit.client_secret);
    set_string(&lookup, "FITBIT_LANGUAGE", &mut fitbit.language);
    set_string(&lookup, "FITBIT_DEVICE_NAME", &mut fitbit.device_name);
    set_string(&lookup, "LOCAL_TIMEZONE", &mut fitbit.timezone);
    set_string(&lookup, "FITBIT_API_BASE_URL", &mut fitbit.api_base_url);
    if let Some(path) = lookup("TOKEN_FILE_PATH") {
        fitbit.token_file = PathBuf::from(path);
    }

    let influx = &mut config.influxdb;
    set_parsed(&lookup, "INFLUXDB_VERSION", &mut influx.version)?;
    set_string(&lookup, "INFLUXDB_HOST", &mut influx.host);
    set_parsed(&lookup, "INFLUXDB_PORT", &mut influx.port)?;
    set_string(&lookup, "INFLUXDB_USERNAME", &mut influx.username);
    set_string(&lookup, "INFLUXDB_PASSWORD", &mut influx.password);
    set_string(&lookup, "INFLUXDB_DATABASE", &mut influx.database);
    set_string(&lookup, "INFLUXDB_URL", &mut influx.url);
    set_string(&lookup, "INFLUXDB_ORG", &mut influx.org);
    set_string(&lookup, "INFLUXDB_TOKEN", &mut influx.token);
    set_string(&lookup, "INFLUXDB_BUCKET", &mut influx.bucket);

    let retry = &mut config.retry;
    set_parsed(&lookup, "SERVER_ERROR_MAX_RETRY", &mut retry.server_error_max_retry)?;
    set_parsed(&lookup, "EXPIRED_TOKEN_MAX_RETRY", &mut retry.expired_token_max_retry)?;
    set_bool(
        &lookup,
        "SKIP_REQUEST_ON_SERVER_ERROR",
        &mut retry.skip_request_on_server_error,
    )?;

    let schedule = &mut config.schedule;
    set_bool(&lookup, "AUTO_DATE_RANGE", &mut schedule.auto_date_range)?;
    set_parsed(&lookup, "AUTO_UPDATE_DATE_RANGE", &mut schedule.trailing_days)?;
    if let Some(raw) = lookup("SCHEDULE_AUTO_UPDATE") {
        schedule.continuous = Some(parse_bool("SCHEDULE_AUTO_UPDATE", &raw)?);
    }

    if let Some(path) = lookup("FITBIT_LOG_FILE_PATH") {
        config.logging.file = if path.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        };
    }

    Ok(())
}

fn set_string<F>(lookup: &F, key: &str, target: &mut String)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup(key) {
        *target = v;
    }
}

fn set_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("{} has an invalid value '{}'", key, raw))?;
    }
    Ok(())
}

fn set_bool<F>(lookup: &F, key: &str, target: &mut bool) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = parse_bool(key, &raw)?;
    }
    Ok(())
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => anyhow::bail!("{} has an invalid value '{}': expected true or false", key, raw),
    }
}
