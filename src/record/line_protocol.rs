//! InfluxDB line protocol encoding.
//!
//! ```text
//! measurement,tag=value field=1.5,count=3i 1717243200000000000
//! ```
//!
//! Both sink backends (1.x and 2.x) accept the same body; only the endpoint
//! and authentication differ.

use super::{FieldValue, Record};

/// Encodes one record, or `None` when it has no storable fields or its
/// time is outside the nanosecond range.
pub fn encode_line(record: &Record) -> Option<String> {
    let fields: Vec<String> = record
        .fields
        .iter()
        .filter_map(|(key, value)| {
            encode_field_value(value).map(|v| format!("{}={}", escape_key(key), v))
        })
        .collect();

    if fields.is_empty() {
        return None;
    }
    let nanos = record.time.timestamp_nanos_opt()?;

    let mut line = escape_measurement(&record.measurement);
    for (key, value) in &record.tags {
        // Influx rejects empty tag values
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }
    line.push(' ');
    line.push_str(&fields.join(","));
    line.push(' ');
    line.push_str(&nanos.to_string());
    Some(line)
}

/// Encodes a batch, one line per storable record, newline separated.
///
/// Returns the body and the number of records skipped for having no values.
pub fn encode_batch(records: &[Record]) -> (String, usize) {
    let mut skipped = 0;
    let lines: Vec<String> = records
        .iter()
        .filter_map(|record| {
            let line = encode_line(record);
            if line.is_none() {
                skipped += 1;
            }
            line
        })
        .collect();
    (lines.join("\n"), skipped)
}

fn encode_field_value(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Integer(i) => Some(format!("{}i", i)),
        FieldValue::Float(f) if f.is_finite() => Some(format_float(*f)),
        FieldValue::Float(_) => None,
        FieldValue::Boolean(b) => Some(b.to_string()),
        FieldValue::Text(s) => Some(format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))),
        FieldValue::Null => None,
    }
}

fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

fn escape_measurement(name: &str) -> String {
    name.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_key(key: &str) -> String {
    key.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
