use crate::config::TimestampConfig;
use crate::error::DataQualityWarning;
use crate::point::{CumulativeWh, TelemetryPoint};
use crate::response::{parse_timestamp, RawPoint};
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// Strictly ascending by timestamp.
    pub points: Vec<TelemetryPoint>,
    pub warnings: Vec<DataQualityWarning>,
    /// Points that lost to a later-received point with the same timestamp.
    pub duplicates: usize,
}

/// Validate, order and deduplicate one unit's points from one poll.
///
/// Bad points are dropped with a warning and the rest of the batch survives.
/// On an exact timestamp collision the point with the higher receive index
/// wins, since the API re-emits unfinalized intervals with corrected values.
pub fn normalize(
    raw: Vec<RawPoint>,
    tc: &TimestampConfig,
    offset: Option<FixedOffset>,
) -> Normalized {
    let mut warnings = Vec::new();
    let mut by_time: BTreeMap<DateTime<Utc>, (usize, CumulativeWh)> = BTreeMap::new();
    let mut duplicates = 0;

    for p in raw {
        let (time, value) = match (p.time, p.value) {
            (Some(t), Some(v)) => (t, v),
            (None, _) => {
                warnings.push(DataQualityWarning::MalformedPoint {
                    index: p.index,
                    reason: "missing time".into(),
                });
                continue;
            }
            (_, None) => {
                warnings.push(DataQualityWarning::MalformedPoint {
                    index: p.index,
                    reason: "missing value".into(),
                });
                continue;
            }
        };

        let timestamp = match parse_timestamp(&time, tc, offset) {
            Ok(ts) => ts,
            Err(e) => {
                warnings.push(DataQualityWarning::MalformedPoint {
                    index: p.index,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let Some(value) = value.trim().parse::<f64>().ok().and_then(CumulativeWh::new) else {
            warnings.push(DataQualityWarning::InvalidValue {
                timestamp: timestamp.to_rfc3339(),
                raw: value,
            });
            continue;
        };

        let seen_later = by_time.get(&timestamp).map(|(seen, _)| *seen > p.index);
        if seen_later.is_some() {
            duplicates += 1;
        }
        if seen_later != Some(true) {
            by_time.insert(timestamp, (p.index, value));
        }
    }

    let points = by_time
        .into_iter()
        .map(|(timestamp, (_, value))| TelemetryPoint { timestamp, value })
        .collect();

    Normalized {
        points,
        warnings,
        duplicates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn utc() -> Option<FixedOffset> {
        FixedOffset::east_opt(0)
    }

    fn values(n: &Normalized) -> Vec<f64> {
        n.points.iter().map(|p| p.value.get()).collect()
    }

    #[test]
    fn test_sorts_ascending() {
        let raw = vec![
            RawPoint::new(0, "2024-03-01 10:10:00", "300"),
            RawPoint::new(1, "2024-03-01 10:00:00", "100"),
            RawPoint::new(2, "2024-03-01 10:05:00", "200"),
        ];
        let n = normalize(raw, &TimestampConfig::default(), utc());
        assert_eq!(values(&n), vec![100.0, 200.0, 300.0]);
        assert!(n.points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(n.warnings.is_empty());
    }

    #[test]
    fn test_duplicate_keeps_later_received() {
        let raw = vec![
            RawPoint::new(0, "2024-03-01 10:00:00", "100"),
            RawPoint::new(1, "2024-03-01 10:05:00", "150"),
            RawPoint::new(2, "2024-03-01 10:05:00", "180"),
        ];
        let n = normalize(raw, &TimestampConfig::default(), utc());
        assert_eq!(values(&n), vec![100.0, 180.0]);
        assert_eq!(n.duplicates, 1);
    }

    #[test]
    fn test_duplicate_order_independent_of_iteration() {
        // Receive index decides, not the order the points are handed in.
        let raw = vec![
            RawPoint::new(5, "2024-03-01 10:05:00", "180"),
            RawPoint::new(1, "2024-03-01 10:05:00", "150"),
        ];
        let n = normalize(raw, &TimestampConfig::default(), utc());
        assert_eq!(values(&n), vec![180.0]);
        assert_eq!(n.duplicates, 1);
    }

    #[test]
    fn test_drops_invalid_values_with_warning() {
        let raw = vec![
            RawPoint::new(0, "2024-03-01 10:00:00", "100"),
            RawPoint::new(1, "2024-03-01 10:05:00", "abc"),
            RawPoint::new(2, "2024-03-01 10:10:00", "-5"),
            RawPoint::new(3, "2024-03-01 10:15:00", "NaN"),
            RawPoint::new(4, "2024-03-01 10:20:00", "inf"),
            RawPoint::new(5, "2024-03-01 10:25:00", " 120.5 "),
        ];
        let n = normalize(raw, &TimestampConfig::default(), utc());
        assert_eq!(values(&n), vec![100.0, 120.5]);
        assert_eq!(n.warnings.len(), 4);
        assert!(n
            .warnings
            .iter()
            .all(|w| matches!(w, DataQualityWarning::InvalidValue { .. })));
    }

    #[test]
    fn test_drops_malformed_points() {
        let raw = vec![
            RawPoint {
                index: 0,
                time: None,
                value: Some("1".into()),
            },
            RawPoint {
                index: 1,
                time: Some("2024-03-01 10:00:00".into()),
                value: None,
            },
            RawPoint::new(2, "not a time", "1"),
            RawPoint::new(3, "2024-03-01 10:00:00", "7"),
        ];
        let n = normalize(raw, &TimestampConfig::default(), utc());
        assert_eq!(values(&n), vec![7.0]);
        assert_eq!(n.warnings.len(), 3);
        assert_eq!(
            n.warnings[0],
            DataQualityWarning::MalformedPoint {
                index: 0,
                reason: "missing time".into()
            }
        );
    }

    #[test]
    fn test_empty_input() {
        let n = normalize(Vec::new(), &TimestampConfig::default(), utc());
        assert_eq!(n, Normalized::default());
    }
}
