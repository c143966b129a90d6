use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// One environmental observation ready to be written for a device.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub co2: Option<i32>,
    pub temp: Option<f64>,
    pub humidity: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Diagnostic message reported by a device.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub device: String,
    pub event_type: String,
    pub message: String,
    pub uptime_seconds: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReadingRow {
    pub co2: Option<i32>,
    pub temp: Option<f64>,
    pub humidity: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub event_type: Option<String>,
    pub message: Option<String>,
    pub uptime_seconds: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Aggregates over the lookback window, one column per SQL aggregate.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct StatsRow {
    pub count: i64,
    pub avg_co2: Option<f64>,
    pub min_co2: Option<i32>,
    pub max_co2: Option<i32>,
    pub avg_temp: Option<f64>,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub min_humidity: Option<f64>,
    pub max_humidity: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored: Option<usize>,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            stored: None,
        }
    }

    pub fn stored(count: usize) -> Self {
        Self {
            status: "ok",
            stored: Some(count),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ReadingView {
    pub co2: Option<i32>,
    pub temp: Option<f64>,
    pub humidity: Option<f64>,
    pub ts: Option<String>,
}

impl From<ReadingRow> for ReadingView {
    fn from(row: ReadingRow) -> Self {
        Self {
            co2: row.co2,
            temp: row.temp,
            humidity: row.humidity,
            ts: row.created_at.map(format_ts),
        }
    }
}

/// `heap` and `total_measurements` are always null; dashboards still read them.
#[derive(Debug, Serialize, PartialEq)]
pub struct EventView {
    pub event_type: Option<String>,
    pub message: Option<String>,
    pub uptime: Option<i64>,
    pub heap: Option<i64>,
    pub total_measurements: Option<i64>,
    pub ts: Option<String>,
}

impl From<EventRow> for EventView {
    fn from(row: EventRow) -> Self {
        Self {
            event_type: row.event_type,
            message: row.message,
            uptime: row.uptime_seconds,
            heap: None,
            total_measurements: None,
            ts: row.created_at.map(format_ts),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CalibrationResponse {
    pub date: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct MetricSummary<T> {
    pub avg: Option<f64>,
    pub min: Option<T>,
    pub max: Option<T>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct StatsResponse {
    pub count: i64,
    pub co2: Option<MetricSummary<i32>>,
    pub temp: Option<MetricSummary<f64>>,
    pub humidity: Option<MetricSummary<f64>>,
}

/// Only SQL NULL aggregates become null. A zero average or extreme (for
/// example 0.0 °C) is reported as 0, never collapsed to null.
impl From<StatsRow> for StatsResponse {
    fn from(row: StatsRow) -> Self {
        if row.count <= 0 {
            return Self {
                count: 0,
                co2: None,
                temp: None,
                humidity: None,
            };
        }

        Self {
            count: row.count,
            co2: Some(MetricSummary {
                avg: row.avg_co2,
                min: row.min_co2,
                max: row.max_co2,
            }),
            temp: Some(MetricSummary {
                avg: row.avg_temp,
                min: row.min_temp,
                max: row.max_temp,
            }),
            humidity: Some(MetricSummary {
                avg: row.avg_humidity,
                min: row.min_humidity,
                max: row.max_humidity,
            }),
        }
    }
}

/// ISO-8601 with a numeric offset; fractional seconds only when present.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    let format = if ts.timestamp_subsec_nanos() == 0 {
        SecondsFormat::Secs
    } else {
        SecondsFormat::Micros
    };
    ts.to_rfc3339_opts(format, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_format_ts_whole_seconds() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 16, 12, 0, 0).unwrap();
        assert_eq!(format_ts(ts), "2026-01-16T12:00:00+00:00");
    }

    #[test]
    fn test_format_ts_keeps_micros() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 16, 12, 0, 0).unwrap()
            + chrono::Duration::microseconds(250);
        assert_eq!(format_ts(ts), "2026-01-16T12:00:00.000250+00:00");
    }

    #[test]
    fn test_empty_stats_have_null_groups() {
        let stats = StatsResponse::from(StatsRow::default());
        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            json!({"count": 0, "co2": null, "temp": null, "humidity": null})
        );
    }

    #[test]
    fn test_stats_groups_keep_metric_types() {
        let row = StatsRow {
            count: 2,
            avg_co2: Some(750.0),
            min_co2: Some(700),
            max_co2: Some(800),
            avg_temp: Some(21.5),
            min_temp: Some(21.0),
            max_temp: Some(22.0),
            avg_humidity: None,
            min_humidity: None,
            max_humidity: None,
        };

        let value = serde_json::to_value(StatsResponse::from(row)).unwrap();
        assert_eq!(value["count"], json!(2));
        assert_eq!(value["co2"], json!({"avg": 750.0, "min": 700, "max": 800}));
        assert_eq!(value["temp"], json!({"avg": 21.5, "min": 21.0, "max": 22.0}));
        assert_eq!(value["humidity"], json!({"avg": null, "min": null, "max": null}));
    }

    #[test]
    fn test_zero_valued_aggregates_are_not_nulled() {
        let row = StatsRow {
            count: 1,
            avg_temp: Some(0.0),
            min_temp: Some(0.0),
            max_temp: Some(0.0),
            ..StatsRow::default()
        };

        let stats = StatsResponse::from(row);
        assert_eq!(
            stats.temp,
            Some(MetricSummary {
                avg: Some(0.0),
                min: Some(0.0),
                max: Some(0.0),
            })
        );
    }

    #[test]
    fn test_event_view_has_legacy_nulls() {
        let view = EventView::from(EventRow {
            event_type: Some("warning".to_string()),
            message: Some("Low heap".to_string()),
            uptime_seconds: Some(3600),
            created_at: Some(Utc.with_ymd_and_hms(2026, 1, 16, 12, 0, 0).unwrap()),
        });

        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({
                "event_type": "warning",
                "message": "Low heap",
                "uptime": 3600,
                "heap": null,
                "total_measurements": null,
                "ts": "2026-01-16T12:00:00+00:00"
            })
        );
    }

    #[test]
    fn test_status_response_omits_stored_for_single_writes() {
        assert_eq!(
            serde_json::to_value(StatusResponse::ok()).unwrap(),
            json!({"status": "ok"})
        );
        assert_eq!(
            serde_json::to_value(StatusResponse::stored(2)).unwrap(),
            json!({"status": "ok", "stored": 2})
        );
    }
}
