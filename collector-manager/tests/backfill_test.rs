// Integration tests: bulk backfill over real HTTP against mocked Fitbit and InfluxDB servers

use async_trait::async_trait;
use collector_manager::client::{
    HttpTransport, OAuthApp, ResilientClient, RetryPolicy, Sleeper, TokenManager,
};
use collector_manager::collectors::fitbit::{FitbitCollector, Metric};
use collector_manager::scheduler::SystemClock;
use collector_manager::window::Window;
use collector_manager::{Collector, SyncOrchestrator, SyncSettings};
use chrono::NaiveDate;
use mockito::{Matcher, Server, ServerGuard};
use std::sync::Arc;
use std::time::Duration;
use vitalsync::config::{InfluxConfig, InfluxVersion};
use vitalsync::credentials::{CredentialPair, CredentialStore};
use vitalsync::sink::build_sink;

struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn orchestrator(api: &ServerGuard, influx: &ServerGuard, store: CredentialStore) -> SyncOrchestrator {
    let tokens = TokenManager::new(
        store,
        OAuthApp {
            client_id: "client".into(),
            client_secret: "secret".into(),
            token_url: format!("{}/oauth2/token", api.url()),
        },
        CredentialPair::new("stale", "r1"),
    );
    let sleeper: Arc<dyn Sleeper> = Arc::new(NoSleep);
    let client = ResilientClient::new(
        Arc::new(HttpTransport::new().unwrap()),
        Arc::clone(&sleeper),
        RetryPolicy::default(),
        tokens,
        api.url(),
        "en_US",
    );

    let sink = build_sink(&InfluxConfig {
        version: InfluxVersion::V2,
        url: influx.url(),
        org: "home".into(),
        token: "influx-token".into(),
        bucket: "health_data".into(),
        ..InfluxConfig::default()
    })
    .unwrap();

    let collectors: Vec<Arc<dyn Collector>> = vec![Arc::new(FitbitCollector::new(Metric::Hrv))];
    SyncOrchestrator::new(
        client,
        sink,
        collectors,
        SyncSettings {
            device: "Pixel Watch 3".into(),
            timezone: chrono_tz::America::New_York,
            trailing_days: 1,
            poll_interval: Duration::from_secs(30),
        },
        Arc::new(SystemClock),
        sleeper,
    )
}

/// A 401 mid-backfill rotates the token, persists it, and the backfill
/// continues with one sink write per planned window.
#[tokio::test]
async fn test_bulk_backfill_recovers_from_expired_token() {
    let mut api = Server::new_async().await;
    let mut influx = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("tokens.json");

    let expired = api
        .mock("GET", "/1/user/-/hrv/date/2024-01-01/2024-01-30.json")
        .match_header("authorization", "Bearer stale")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let grant = api
        .mock("POST", "/oauth2/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "r1".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"access_token":"fresh","refresh_token":"r2"}"#)
        .expect(1)
        .create_async()
        .await;
    let first = api
        .mock("GET", "/1/user/-/hrv/date/2024-01-01/2024-01-30.json")
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_body(
            r#"{"hrv":[
                {"dateTime":"2024-01-01","value":{"dailyRmssd":31.2,"deepRmssd":35.0}},
                {"dateTime":"2024-01-02","value":{"dailyRmssd":29.8,"deepRmssd":33.1}}
            ]}"#,
        )
        .expect(1)
        .create_async()
        .await;
    let second = api
        .mock("GET", "/1/user/-/hrv/date/2024-01-31/2024-01-31.json")
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_body(r#"{"hrv":[{"dateTime":"2024-01-31","value":{"dailyRmssd":30.0,"deepRmssd":34.0}}]}"#)
        .expect(1)
        .create_async()
        .await;
    let writes = influx
        .mock("POST", "/api/v2/write")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("org".into(), "home".into()),
            Matcher::UrlEncoded("bucket".into(), "health_data".into()),
            Matcher::UrlEncoded("precision".into(), "ns".into()),
        ]))
        .match_header("authorization", "Token influx-token")
        .match_body(Matcher::Regex(r"HRV,Device=Pixel\\ Watch\\ 3 ".into()))
        .with_status(204)
        .expect(2)
        .create_async()
        .await;

    let mut orchestrator = orchestrator(&api, &influx, CredentialStore::new(&token_file));
    orchestrator
        .run_bulk(Window::new(date("2024-01-01"), date("2024-01-31")))
        .await
        .unwrap();

    expired.assert_async().await;
    grant.assert_async().await;
    first.assert_async().await;
    second.assert_async().await;
    writes.assert_async().await;
    assert!(orchestrator.buffer().is_empty());

    let stored = CredentialStore::new(&token_file).load().unwrap().unwrap();
    assert_eq!(stored, CredentialPair::new("fresh", "r2"));
}

/// Persistent server errors skip the window: nothing is written and the
/// run still completes.
#[tokio::test]
async fn test_bulk_backfill_skips_failing_window() {
    let mut api = Server::new_async().await;
    let mut influx = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();

    let failing = api
        .mock("GET", "/1/user/-/hrv/date/2024-03-01/2024-03-05.json")
        .with_status(502)
        .with_body("bad gateway")
        .expect(4)
        .create_async()
        .await;
    let writes = influx
        .mock("POST", "/api/v2/write")
        .with_status(204)
        .expect(0)
        .create_async()
        .await;

    let mut orchestrator = orchestrator(
        &api,
        &influx,
        CredentialStore::new(dir.path().join("tokens.json")),
    );
    orchestrator
        .run_bulk(Window::new(date("2024-03-01"), date("2024-03-05")))
        .await
        .unwrap();

    failing.assert_async().await;
    writes.assert_async().await;
    assert!(!dir.path().join("tokens.json").exists());
}
