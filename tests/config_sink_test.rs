// Integration tests: TOML config plus environment overlay driving a real sink write

use chrono::{TimeZone, Utc};
use mockito::{Matcher, Server};
use std::collections::HashMap;
use std::io::Write;
use vitalsync::config::{apply_vars, load_config, InfluxVersion};
use vitalsync::sink::build_sink;
use vitalsync::Record;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_env_selects_v1_sink_over_file_settings() {
    let mut server = Server::new_async().await;
    let write = server
        .mock("POST", "/write")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("db".into(), "fitbit_env".into()),
            Matcher::UrlEncoded("precision".into(), "ns".into()),
        ]))
        .match_header("authorization", Matcher::Regex("^Basic ".into()))
        .match_body(Matcher::Regex(
            r"^HeartRate_Intraday,Device=Pixel\\ Watch\\ 3 value=61i 1717243200000000000".into(),
        ))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let file = write_config(
        r#"
[influxdb]
version = "2"
url = "http://unused:8086"
database = "fitbit_file"
"#,
    );
    let mut config = load_config(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.influxdb.version, InfluxVersion::V2);

    let vars: HashMap<&str, String> = HashMap::from([
        ("INFLUXDB_VERSION", "1".to_string()),
        ("INFLUXDB_HOST", server.url()),
        ("INFLUXDB_DATABASE", "fitbit_env".to_string()),
        ("INFLUXDB_USERNAME", "writer".to_string()),
        ("INFLUXDB_PASSWORD", "pw".to_string()),
    ]);
    apply_vars(&mut config, |key| vars.get(key).cloned()).unwrap();
    assert_eq!(config.influxdb.version, InfluxVersion::V1);

    let sink = build_sink(&config.influxdb).unwrap();
    assert_eq!(sink.name(), "influxdb-v1");

    let time = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let records = vec![Record::new("HeartRate_Intraday", time)
        .tag("Device", "Pixel Watch 3")
        .field("value", 61i64)];
    sink.write(&records).await.unwrap();

    write.assert_async().await;
}

#[tokio::test]
async fn test_rejected_write_is_an_error() {
    let mut server = Server::new_async().await;
    let write = server
        .mock("POST", "/api/v2/write")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"code":"unauthorized"}"#)
        .expect(1)
        .create_async()
        .await;

    let file = write_config(&format!(
        "[influxdb]\nversion = \"2\"\nurl = \"{}\"\ntoken = \"wrong\"\n",
        server.url()
    ));
    let config = load_config(file.path().to_str().unwrap()).unwrap();
    let sink = build_sink(&config.influxdb).unwrap();

    let time = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let err = sink
        .write(&[Record::new("HRV", time).field("dailyRmssd", 31.5)])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("401"));

    write.assert_async().await;
}

#[test]
fn test_invalid_env_value_is_reported() {
    let mut config = vitalsync::config::SyncConfig::default();
    let err = apply_vars(&mut config, |key| {
        (key == "INFLUXDB_VERSION").then(|| "3".to_string())
    })
    .unwrap_err();
    assert!(format!("{:#}", err).contains("INFLUXDB_VERSION"));
}
