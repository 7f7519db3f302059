use crate::config::{ResponseConfig, TimestampConfig};
use crate::error::AppError;
use chrono::{DateTime, FixedOffset, LocalResult, NaiveDateTime, TimeZone, Utc};
use jsonpath_lib as jsonpath;
use serde_json::Value;

/// One point as it appeared on the wire, before any validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPoint {
    /// Position in the response; later points win on duplicate timestamps.
    pub index: usize,
    pub time: Option<String>,
    pub value: Option<String>,
}

impl RawPoint {
    pub fn new(index: usize, time: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            index,
            time: Some(time.into()),
            value: Some(value.into()),
        }
    }
}

/// Pull every point object out of a decoded telemetry response.
///
/// Only a broken `values_path` is an error; missing keys inside a point are
/// kept as `None` for the normalizer to report.
pub fn select_raw_points(json: &Value, cfg: &ResponseConfig) -> Result<Vec<RawPoint>, AppError> {
    let selected = jsonpath::select(json, &cfg.values_path)
        .map_err(|e| AppError::Config(format!("values_path {}: {:?}", cfg.values_path, e)))?;

    Ok(selected
        .into_iter()
        .enumerate()
        .map(|(index, v)| RawPoint {
            index,
            time: v.get(&cfg.time_key).and_then(scalar_string),
            value: v.get(&cfg.value_key).and_then(scalar_string),
        })
        .collect())
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse an API timestamp. RFC 3339 strings carry their own offset; anything
/// else is read with `tc.format` as wall-clock time in `offset`, or in the host
/// zone when no offset is configured.
pub fn parse_timestamp(
    raw: &str,
    tc: &TimestampConfig,
    offset: Option<FixedOffset>,
) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(raw, &tc.format)
        .map_err(|e| AppError::Time(format!("{:?} does not match {:?}: {}", raw, tc.format, e)))?;

    let localized = match offset {
        Some(off) => off.from_local_datetime(&naive).map(|dt| dt.with_timezone(&Utc)),
        None => chrono::Local
            .from_local_datetime(&naive)
            .map(|dt| dt.with_timezone(&Utc)),
    };
    resolve_local(localized, raw)
}

/// Pick one instant for a wall-clock reading. The repeated hour at the end of
/// DST resolves to its first occurrence; a skipped hour is an error.
fn resolve_local(
    localized: LocalResult<DateTime<Utc>>,
    raw: &str,
) -> Result<DateTime<Utc>, AppError> {
    match localized {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => Err(AppError::Time(format!(
            "{:?} does not exist in the local time zone",
            raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_flattens_all_series() {
        let payload = json!({
            "measureData": [
                { "values": [
                    { "time": "2024-03-01 10:00:00", "value": "100.5" },
                    { "time": "2024-03-01 10:05:00", "value": "101" }
                ]},
                { "values": [
                    { "time": "2024-03-01 10:10:00", "value": "103.25" }
                ]}
            ]
        });

        let points = select_raw_points(&payload, &ResponseConfig::default()).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0], RawPoint::new(0, "2024-03-01 10:00:00", "100.5"));
        assert_eq!(points[2], RawPoint::new(2, "2024-03-01 10:10:00", "103.25"));
    }

    #[test]
    fn test_extract_keeps_incomplete_points() {
        let payload = json!({
            "measureData": [{ "values": [
                { "time": "2024-03-01 10:00:00" },
                { "value": "5" },
                { "time": "2024-03-01 10:10:00", "value": 42 },
                { "time": "2024-03-01 10:15:00", "value": null }
            ]}]
        });

        let points = select_raw_points(&payload, &ResponseConfig::default()).unwrap();
        assert_eq!(points.len(), 4);
        assert_eq!(points[0].value, None);
        assert_eq!(points[1].time, None);
        assert_eq!(points[2].value.as_deref(), Some("42"));
        assert_eq!(points[3].value, None);
    }

    #[test]
    fn test_extract_empty_and_missing_data() {
        let cfg = ResponseConfig::default();
        assert!(select_raw_points(&json!({ "measureData": [] }), &cfg)
            .unwrap()
            .is_empty());
        assert!(select_raw_points(&json!({}), &cfg).unwrap().is_empty());
    }

    #[test]
    fn test_extract_custom_keys() {
        let cfg = ResponseConfig {
            values_path: "$.readings[*]".into(),
            time_key: "ts".into(),
            value_key: "wh".into(),
        };
        let points = select_raw_points(
            &json!({ "readings": [{ "ts": "2024-03-01 10:00:00", "wh": "12.5" }] }),
            &cfg,
        )
        .unwrap();
        assert_eq!(points, vec![RawPoint::new(0, "2024-03-01 10:00:00", "12.5")]);
    }

    #[test]
    fn test_parse_timestamp_with_offset() {
        let tc = TimestampConfig::default();
        let off = FixedOffset::east_opt(3600);
        let ts = parse_timestamp("2024-03-01 10:00:00", &tc, off).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T09:00:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_rfc3339() {
        let tc = TimestampConfig::default();
        let ts = parse_timestamp("2024-03-01T10:00:00+02:00", &tc, None).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T08:00:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        let tc = TimestampConfig::default();
        assert!(parse_timestamp("yesterday", &tc, FixedOffset::east_opt(0)).is_err());
        assert!(parse_timestamp("", &tc, FixedOffset::east_opt(0)).is_err());
    }

    #[test]
    fn test_parse_timestamp_host_zone() {
        let tc = TimestampConfig::default();
        let naive = NaiveDateTime::parse_from_str("2024-03-01 10:00:00", &tc.format).unwrap();
        let expected = chrono::Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc));

        let ts = parse_timestamp("2024-03-01 10:00:00", &tc, None).ok();
        assert_eq!(ts, expected);
        assert!(ts.is_some());
    }

    #[test]
    fn test_resolve_local_dst_edges() {
        let first = Utc.with_ymd_and_hms(2024, 10, 27, 0, 30, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 10, 27, 1, 30, 0).unwrap();

        assert_eq!(resolve_local(LocalResult::Single(first), "x").unwrap(), first);
        assert_eq!(
            resolve_local(LocalResult::Ambiguous(first, second), "2024-10-27 02:30:00").unwrap(),
            first
        );
        let err = resolve_local(LocalResult::None, "2024-03-31 02:30:00").unwrap_err();
        assert!(matches!(err, AppError::Time(msg) if msg.contains("does not exist")));
    }
}
