use crate::model::NewReading;
use crate::validate::BatchEntry;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

// Each offset form is tried with and without a colon in the offset.
const OFFSET_FORMATS: [&str; 10] = [
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%d %H:%M%z",
    "%Y%m%dT%H%M%S%:z",
    "%Y%m%dT%H%M%S%z",
];

const NAIVE_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y%m%dT%H%M%S",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y%m%d"];

/// Parses a client-supplied ISO-8601 timestamp in extended or basic form, to
/// minute or sub-second precision. `Z` means `+00:00`; naive values are read
/// as UTC.
pub fn parse_client_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    let raw = raw.replace('Z', "+00:00");
    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(&raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(&raw, format) {
            return Some(ts.and_utc());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&raw, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

/// Turns a validated batch into rows. Entries whose `ts` is missing or
/// unparseable get `now`; nothing in the batch is rejected for it.
pub fn prepare_batch(entries: &[BatchEntry], now: DateTime<Utc>) -> Vec<NewReading> {
    entries
        .iter()
        .map(|entry| NewReading {
            co2: entry.co2,
            temp: entry.temp,
            humidity: entry.humidity,
            created_at: entry
                .ts
                .as_deref()
                .and_then(parse_client_timestamp)
                .unwrap_or(now),
        })
        .collect()
}
