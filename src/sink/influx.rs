//! InfluxDB HTTP write backends (1.x and 2.x), nanosecond precision.

use super::TimeSeriesSink;
use crate::config::InfluxConfig;
use crate::record::{encode_batch, Record};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on one write, connect included.
const WRITE_TIMEOUT: Duration = Duration::from_secs(120);

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent("vitalsync/0.1")
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Encodes the batch, returning `None` when nothing is storable.
fn encode(records: &[Record], backend: &str) -> Option<String> {
    let (body, skipped) = encode_batch(records);
    if skipped > 0 {
        debug!(backend, skipped, "Skipped records without storable fields");
    }
    if body.is_empty() {
        None
    } else {
        Some(body)
    }
}

async fn check_response(response: reqwest::Response, backend: &str) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read body>".to_string());
    warn!(backend, status = status.as_u16(), "Write rejected");
    anyhow::bail!("{} write failed with status {}: {}", backend, status, body)
}

/// InfluxDB 1.x sink (`POST /write?db=...`).
pub struct InfluxV1Sink {
    http_client: Client,
    base_url: String,
    database: String,
    username: String,
    password: String,
}

impl InfluxV1Sink {
    /// `host` may be a bare hostname (combined with `port`) or a full URL.
    pub fn from_config(config: &InfluxConfig) -> Result<Self> {
        let base_url = if config.host.contains("://") {
            config.host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}:{}", config.host, config.port)
        };
        Ok(Self {
            http_client: http_client(WRITE_TIMEOUT)?,
            base_url,
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait]
impl TimeSeriesSink for InfluxV1Sink {
    fn name(&self) -> &str {
        "influxdb-v1"
    }

    async fn write(&self, records: &[Record]) -> Result<()> {
        let body = match encode(records, self.name()) {
            Some(b) => b,
            None => return Ok(()),
        };

        let mut request = self
            .http_client
            .post(format!("{}/write", self.base_url))
            .query(&[("db", self.database.as_str()), ("precision", "ns")])
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body);
        if !self.username.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }

        let response = request
            .send()
            .await
            .context("Failed to send write request to InfluxDB")?;
        check_response(response, self.name()).await?;

        info!(
            backend = self.name(),
            database = %self.database,
            record_count = records.len(),
            "Wrote records"
        );
        Ok(())
    }
}

/// InfluxDB 2.x sink (`POST /api/v2/write?org=...&bucket=...`).
pub struct InfluxV2Sink {
    http_client: Client,
    url: String,
    org: String,
    bucket: String,
    token: String,
}

impl InfluxV2Sink {
    pub fn from_config(config: &InfluxConfig) -> Result<Self> {
        Ok(Self {
            http_client: http_client(WRITE_TIMEOUT)?,
            url: config.url.trim_end_matches('/').to_string(),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl TimeSeriesSink for InfluxV2Sink {
    fn name(&self) -> &str {
        "influxdb-v2"
    }

    async fn write(&self, records: &[Record]) -> Result<()> {
        let body = match encode(records, self.name()) {
            Some(b) => b,
            None => return Ok(()),
        };

        let response = self
            .http_client
            .post(format!("{}/api/v2/write", self.url))
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .context("Failed to send write request to InfluxDB")?;
        check_response(response, self.name()).await?;

        info!(
            backend = self.name(),
            bucket = %self.bucket,
            record_count = records.len(),
            "Wrote records"
        );
        Ok(())
    }
}
