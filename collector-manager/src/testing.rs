//! In-memory doubles for the engine's seams.

use crate::client::{
    ApiRequest, OAuthApp, RawResponse, ResilientClient, RetryPolicy, Sleeper, TokenManager,
    Transport, TransportError,
};
use crate::scheduler::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vitalsync::credentials::{CredentialPair, CredentialStore};
use vitalsync::record::Record;
use vitalsync::sink::TimeSeriesSink;

/// Replays queued outcomes per URL (query string ignored) and records every
/// request it receives. An unscripted URL answers 404.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Result<RawResponse, TransportError>>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: &str, outcome: Result<RawResponse, TransportError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn push_status(&self, url: &str, status: u16, body: &str) {
        self.push(url, Ok(RawResponse::new(status, body)));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url == url)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Ok(RawResponse::new(404, format!("unscripted {}", request.url))))
    }
}

/// Records requested sleeps and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Sleeper that moves a [`ManualClock`] forward by the slept duration.
pub struct AdvancingSleeper {
    clock: Arc<ManualClock>,
    sleeps: Mutex<Vec<Duration>>,
}

impl AdvancingSleeper {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for AdvancingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.clock.advance(duration);
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += ChronoDuration::from_std(by).unwrap();
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Sink that keeps every batch, optionally rejecting writes.
#[derive(Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<Record>>>,
    fail_writes: Mutex<bool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        *sink.fail_writes.lock().unwrap() = true;
        sink
    }

    pub fn batches(&self) -> Vec<Vec<Record>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn records(&self) -> Vec<Record> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl TimeSeriesSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write(&self, records: &[Record]) -> anyhow::Result<()> {
        // Attempts are kept even when rejected so tests can count them
        self.batches.lock().unwrap().push(records.to_vec());
        if *self.fail_writes.lock().unwrap() {
            anyhow::bail!("sink unavailable");
        }
        Ok(())
    }
}

pub const API_BASE: &str = "https://api.example.com";

/// Client over `transport` with the default retry policy and a credential
/// file at `token_file`.
pub fn scripted_client(
    transport: Arc<ScriptedTransport>,
    sleeper: Arc<dyn Sleeper>,
    token_file: PathBuf,
) -> ResilientClient {
    let tokens = TokenManager::new(
        CredentialStore::new(token_file),
        OAuthApp {
            client_id: "client".into(),
            client_secret: "secret".into(),
            token_url: format!("{}/oauth2/token", API_BASE),
        },
        CredentialPair::new("access", "refresh"),
    );
    ResilientClient::new(
        transport,
        sleeper,
        RetryPolicy::default(),
        tokens,
        API_BASE,
        "en_US",
    )
}
