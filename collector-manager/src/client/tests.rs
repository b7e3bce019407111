use super::*;
use crate::testing::{RecordingSleeper, ScriptedTransport};
use serde::Deserialize;
use vitalsync::credentials::{CredentialPair, CredentialStore};

const BASE: &str = "https://api.example.com";
const TOKEN_URL: &str = "https://api.example.com/oauth2/token";
const DEVICES_URL: &str = "https://api.example.com/1/user/-/devices.json";

struct Harness {
    transport: Arc<ScriptedTransport>,
    sleeper: Arc<RecordingSleeper>,
    dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        Self {
            transport: Arc::new(ScriptedTransport::new()),
            sleeper: Arc::new(RecordingSleeper::new()),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn store(&self) -> CredentialStore {
        CredentialStore::new(self.dir.path().join("tokens.json"))
    }

    fn client(&self, policy: RetryPolicy) -> ResilientClient {
        let tokens = TokenManager::new(
            self.store(),
            OAuthApp {
                client_id: "client".into(),
                client_secret: "secret".into(),
                token_url: TOKEN_URL.into(),
            },
            CredentialPair::new("a0", "r0"),
        );
        let transport: Arc<dyn Transport> = self.transport.clone();
        let sleeper: Arc<dyn Sleeper> = self.sleeper.clone();
        ResilientClient::new(transport, sleeper, policy, tokens, BASE, "en_US")
    }

    fn script_token_grants(&self, count: usize) {
        for i in 1..=count {
            self.transport.push_status(
                TOKEN_URL,
                200,
                &format!(r#"{{"access_token":"a{}","refresh_token":"r{}"}}"#, i, i),
            );
        }
    }

    fn bearer_tokens_sent(&self, url: &str) -> Vec<String> {
        self.transport
            .requests_to(url)
            .iter()
            .filter_map(|r| match &r.auth {
                Auth::Bearer(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }
}

#[tokio::test]
async fn test_success_returns_payload_without_sleeping() {
    let h = Harness::new();
    h.transport.push_status(DEVICES_URL, 200, "[]");
    let mut client = h.client(RetryPolicy::default());

    let body = client.execute(ApiRequest::get(DEVICES_URL)).await.unwrap();
    assert_eq!(body.as_deref(), Some("[]"));
    assert!(h.sleeper.sleeps().is_empty());

    let sent = h.transport.requests();
    assert_eq!(sent.len(), 1);
    assert!(sent[0]
        .headers
        .contains(&("Accept".to_string(), "application/json".to_string())));
    assert!(sent[0]
        .headers
        .contains(&("Accept-Language".to_string(), "en_US".to_string())));
    assert_eq!(sent[0].auth, Auth::Bearer("a0".into()));
}

#[tokio::test]
async fn test_rate_limited_twice_then_success() {
    let h = Harness::new();
    for _ in 0..2 {
        h.transport.push(
            DEVICES_URL,
            Ok(RawResponse::new(429, "").with_header("Fitbit-Rate-Limit-Reset", "5")),
        );
    }
    h.transport.push_status(DEVICES_URL, 200, r#"[{"batteryLevel":80}]"#);
    let mut client = h.client(RetryPolicy::default());

    let body = client.execute(ApiRequest::get(DEVICES_URL)).await.unwrap();
    assert_eq!(body.as_deref(), Some(r#"[{"batteryLevel":80}]"#));
    assert_eq!(
        h.sleeper.sleeps(),
        vec![Duration::from_secs(305), Duration::from_secs(305)]
    );
    assert!(h.transport.requests_to(TOKEN_URL).is_empty());
}

#[tokio::test]
async fn test_three_unauthorized_refresh_three_times_then_succeed() {
    let h = Harness::new();
    for _ in 0..3 {
        h.transport.push_status(DEVICES_URL, 401, "expired_token");
    }
    h.transport.push_status(DEVICES_URL, 200, "[]");
    h.script_token_grants(3);
    let mut client = h.client(RetryPolicy::default());

    let body = client.execute(ApiRequest::get(DEVICES_URL)).await.unwrap();
    assert_eq!(body.as_deref(), Some("[]"));
    assert_eq!(h.transport.requests_to(TOKEN_URL).len(), 3);
    assert_eq!(h.sleeper.sleeps(), vec![Duration::from_secs(30); 3]);

    // Each retry carries the freshly issued token
    assert_eq!(h.bearer_tokens_sent(DEVICES_URL), vec!["a0", "a1", "a2", "a3"]);
}

#[tokio::test]
async fn test_six_unauthorized_exhaust_auth() {
    let h = Harness::new();
    for _ in 0..6 {
        h.transport.push_status(DEVICES_URL, 401, "expired_token");
    }
    h.script_token_grants(6);
    let mut client = h.client(RetryPolicy::default());

    let err = client
        .execute(ApiRequest::get(DEVICES_URL))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SyncError::AuthExhausted {
            url: DEVICES_URL.to_string(),
            attempts: 6
        }
    );
    assert!(err.is_fatal());
    assert_eq!(h.transport.requests_to(TOKEN_URL).len(), 5);
    assert_eq!(h.transport.requests_to(DEVICES_URL).len(), 6);
}

#[tokio::test]
async fn test_refresh_writes_file_that_reloads_to_same_pair() {
    let h = Harness::new();
    h.transport.push_status(DEVICES_URL, 401, "expired_token");
    h.transport.push_status(DEVICES_URL, 200, "[]");
    h.script_token_grants(1);
    let mut client = h.client(RetryPolicy::default());

    client.execute(ApiRequest::get(DEVICES_URL)).await.unwrap();

    let reloaded = h.store().load().unwrap().unwrap();
    assert_eq!(&reloaded, client.tokens().credentials());
    assert_eq!(reloaded, CredentialPair::new("a1", "r1"));
}

#[tokio::test]
async fn test_failed_refresh_during_call_is_fatal() {
    let h = Harness::new();
    h.transport.push_status(DEVICES_URL, 401, "expired_token");
    h.transport.push_status(TOKEN_URL, 400, "invalid_grant");
    let mut client = h.client(RetryPolicy::default());

    let err = client
        .execute(ApiRequest::get(DEVICES_URL))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::AuthFailure(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_server_errors_skip_after_ceiling() {
    let h = Harness::new();
    for status in [500, 502, 503, 504] {
        h.transport.push_status(DEVICES_URL, status, "unavailable");
    }
    let mut client = h.client(RetryPolicy::default());

    let body = client.execute(ApiRequest::get(DEVICES_URL)).await.unwrap();
    assert_eq!(body, None);
    assert_eq!(h.sleeper.sleeps(), vec![Duration::from_secs(120); 3]);
}

#[tokio::test]
async fn test_server_errors_fail_after_ceiling_when_configured() {
    let h = Harness::new();
    for _ in 0..4 {
        h.transport.push_status(DEVICES_URL, 503, "unavailable");
    }
    let mut client = h.client(RetryPolicy {
        skip_on_server_error: false,
        ..RetryPolicy::default()
    });

    let err = client
        .execute(ApiRequest::get(DEVICES_URL))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::ServerErrorExhausted {
            status: 503,
            attempts: 4,
            ..
        }
    ));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_network_failure_is_retried() {
    let h = Harness::new();
    h.transport
        .push(DEVICES_URL, Err(TransportError("connection reset".into())));
    h.transport
        .push(DEVICES_URL, Err(TransportError("connection reset".into())));
    h.transport.push_status(DEVICES_URL, 200, "[]");
    let mut client = h.client(RetryPolicy::default());

    let body = client.execute(ApiRequest::get(DEVICES_URL)).await.unwrap();
    assert_eq!(body.as_deref(), Some("[]"));
    assert_eq!(h.sleeper.sleeps(), vec![Duration::from_secs(30); 2]);
}

#[tokio::test]
async fn test_unexpected_status_fails_without_retry() {
    let h = Harness::new();
    h.transport.push_status(DEVICES_URL, 404, "not found");
    let mut client = h.client(RetryPolicy::default());

    let err = client
        .execute(ApiRequest::get(DEVICES_URL))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UnexpectedStatus { status: 404, .. }));
    assert!(h.sleeper.sleeps().is_empty());
    assert_eq!(h.transport.requests().len(), 1);
}

#[derive(Debug, Deserialize, PartialEq)]
struct Device {
    #[serde(rename = "batteryLevel")]
    battery_level: u8,
}

#[tokio::test]
async fn test_get_json_decodes_and_appends_query() {
    let h = Harness::new();
    h.transport
        .push_status(DEVICES_URL, 200, r#"[{"batteryLevel":64,"type":"TRACKER"}]"#);
    let mut client = h.client(RetryPolicy::default());

    let devices: Option<Vec<Device>> = client
        .get_json("/1/user/-/devices.json", &[("limit", "1".to_string())])
        .await
        .unwrap();
    assert_eq!(devices, Some(vec![Device { battery_level: 64 }]));
    assert_eq!(
        h.transport.requests()[0].query,
        vec![("limit".to_string(), "1".to_string())]
    );
}

#[tokio::test]
async fn test_get_json_schema_drift_is_invalid_payload() {
    let h = Harness::new();
    h.transport
        .push_status(DEVICES_URL, 200, r#"[{"battery":"High"}]"#);
    let mut client = h.client(RetryPolicy::default());

    let err = client
        .get_json::<Vec<Device>>("/1/user/-/devices.json", &[])
        .await
        .unwrap_err();
    match err {
        SyncError::InvalidPayload { url, reason } => {
            assert_eq!(url, DEVICES_URL);
            assert!(reason.contains("batteryLevel"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_get_json_skipped_call_is_none() {
    let h = Harness::new();
    for _ in 0..4 {
        h.transport.push_status(DEVICES_URL, 500, "");
    }
    let mut client = h.client(RetryPolicy::default());

    let devices: Option<Vec<Device>> = client
        .get_json("/1/user/-/devices.json", &[])
        .await
        .unwrap();
    assert!(devices.is_none());
}

#[tokio::test]
async fn test_proactive_refresh_replaces_token() {
    let h = Harness::new();
    h.script_token_grants(1);
    h.transport.push_status(DEVICES_URL, 200, "[]");
    let mut client = h.client(RetryPolicy::default());

    client.refresh_token().await.unwrap();
    client.execute(ApiRequest::get(DEVICES_URL)).await.unwrap();
    assert_eq!(h.bearer_tokens_sent(DEVICES_URL), vec!["a1"]);
}
