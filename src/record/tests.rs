use super::*;
use chrono::{NaiveDate, TimeZone};
use chrono_tz::Tz;

fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

#[test]
fn test_localize_new_york_summer_time() {
    let tz: Tz = "America/New_York".parse().unwrap();
    let utc = parse_local_timestamp("2024-06-01T08:00:00", tz).unwrap();
    assert_eq!(utc, at(2024, 6, 1, 12, 0, 0));
    assert_eq!(utc.to_rfc3339(), "2024-06-01T12:00:00+00:00");
}

#[test]
fn test_localize_new_york_winter_time() {
    let tz: Tz = "America/New_York".parse().unwrap();
    let utc = parse_local_timestamp("2024-01-15T08:00:00", tz).unwrap();
    assert_eq!(utc, at(2024, 1, 15, 13, 0, 0));
}

#[test]
fn test_date_only_is_local_midnight() {
    let tz: Tz = "Europe/Berlin".parse().unwrap();
    let utc = parse_local_timestamp("2024-06-01", tz).unwrap();
    assert_eq!(utc, at(2024, 5, 31, 22, 0, 0));
    assert_eq!(
        midnight_utc(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), tz),
        utc
    );
}

#[test]
fn test_explicit_offset_is_kept() {
    let tz: Tz = "Asia/Tokyo".parse().unwrap();
    let utc = parse_local_timestamp("2024-03-10T10:00:00.000-05:00", tz).unwrap();
    assert_eq!(utc, at(2024, 3, 10, 15, 0, 0));
}

#[test]
fn test_minutes_precision_and_fraction() {
    let tz: Tz = "UTC".parse().unwrap();
    assert_eq!(
        parse_local_timestamp("2024-03-10T10:07", tz).unwrap(),
        at(2024, 3, 10, 10, 7, 0)
    );
    assert_eq!(
        parse_local_timestamp("2024-03-10T10:07:30.500", tz)
            .unwrap()
            .timestamp_millis(),
        at(2024, 3, 10, 10, 7, 30).timestamp_millis() + 500
    );
}

#[test]
fn test_dst_gap_shifts_forward() {
    let tz: Tz = "America/New_York".parse().unwrap();
    // 02:30 does not exist on 2024-03-10 in New York
    let utc = parse_local_timestamp("2024-03-10T02:30:00", tz).unwrap();
    assert_eq!(utc, at(2024, 3, 10, 7, 30, 0));
}

#[test]
fn test_dst_overlap_takes_earlier_instant() {
    let tz: Tz = "America/New_York".parse().unwrap();
    // 01:30 happens twice on 2024-11-03; first occurrence is EDT (UTC-4)
    let utc = parse_local_timestamp("2024-11-03T01:30:00", tz).unwrap();
    assert_eq!(utc, at(2024, 11, 3, 5, 30, 0));
}

#[test]
fn test_garbage_timestamp_rejected() {
    let tz: Tz = "UTC".parse().unwrap();
    let err = parse_local_timestamp("yesterday", tz).unwrap_err();
    assert!(err.to_string().contains("yesterday"));
}

#[test]
fn test_builder_and_has_values() {
    let record = Record::new("HRV", at(2024, 1, 1, 5, 0, 0))
        .tag("Device", "Pixel Watch 3")
        .field("dailyRmssd", 34.5)
        .field("deepRmssd", None::<f64>);

    assert_eq!(record.tags.get("Device").unwrap(), "Pixel Watch 3");
    assert_eq!(record.fields.get("dailyRmssd"), Some(&FieldValue::Float(34.5)));
    assert!(record.fields.get("deepRmssd").unwrap().is_null());
    assert!(record.has_values());

    let empty = Record::new("HRV", at(2024, 1, 1, 5, 0, 0)).field("x", FieldValue::Null);
    assert!(!empty.has_values());
}

#[test]
fn test_encode_line_escapes_and_types() {
    let record = Record::new("Sleep Summary", at(2024, 6, 1, 12, 0, 0))
        .tag("Device", "Pixel Watch 3")
        .tag("isMainSleep", "true")
        .field("efficiency", 93_i64)
        .field("ratio", 0.5)
        .field("note", "said \"hi\"")
        .field("missing", FieldValue::Null);

    let line = encode_line(&record).unwrap();
    assert_eq!(
        line,
        "Sleep\\ Summary,Device=Pixel\\ Watch\\ 3,isMainSleep=true \
         efficiency=93i,note=\"said \\\"hi\\\"\",ratio=0.5 1717243200000000000"
    );
}

#[test]
fn test_encode_whole_float_keeps_decimal_point() {
    let record = Record::new("WaterLog", at(2024, 6, 1, 0, 0, 0)).field("amount", 1000.0);
    let line = encode_line(&record).unwrap();
    assert!(line.contains("amount=1000.0 "));
}

#[test]
fn test_encode_batch_skips_records_without_values() {
    let records = vec![
        Record::new("a", at(2024, 1, 1, 0, 0, 0)).field("v", 1_i64),
        Record::new("b", at(2024, 1, 1, 0, 0, 0)).field("v", FieldValue::Null),
        Record::new("c", at(2024, 1, 1, 0, 0, 1)).field("v", true),
    ];

    let (body, skipped) = encode_batch(&records);
    assert_eq!(skipped, 1);
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("a v=1i "));
    assert!(lines[1].starts_with("c v=true "));
}

#[test]
fn test_record_serde_roundtrip_keeps_field_types() {
    let record = Record::new("ECG", at(2024, 2, 2, 2, 2, 2))
        .tag("classification", "NSR")
        .field("averageHeartRate", 61_i64)
        .field("samplingFrequencyHz", 250.5);

    let json = serde_json::to_string(&record).unwrap();
    let back: Record = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);
}

#[test]
fn test_time_beyond_nanosecond_range_is_skipped() {
    let far = Record::new("HRV", at(2300, 1, 1, 0, 0, 0)).field("dailyRmssd", 30.0);
    assert_eq!(encode_line(&far), None);

    let (body, skipped) = encode_batch(&[
        far,
        Record::new("HRV", at(2024, 1, 1, 0, 0, 0)).field("dailyRmssd", 31.0),
    ]);
    assert_eq!(skipped, 1);
    assert!(body.starts_with("HRV dailyRmssd=31.0 "));
}
