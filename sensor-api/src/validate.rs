use crate::errors::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

pub const NO_JSON_DATA: &str = "No JSON data";
pub const MISSING_DEVICE_NAME: &str = "Missing device name";
pub const MISSING_DEVICE_PARAMETER: &str = "Missing device parameter";
pub const NO_READINGS_PROVIDED: &str = "No readings provided";

pub const DEFAULT_HOURS: i64 = 24;
pub const DEFAULT_EVENT_LIMIT: i64 = 50;
pub const DEFAULT_EVENT_TYPE: &str = "info";

/// Body of `POST /api/sensor`.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleReadingPayload {
    pub device: String,
    pub co2: Option<i32>,
    pub temp: Option<f64>,
    pub humidity: Option<f64>,
}

/// One entry of a batch upload. `ts` is kept raw; see `batching`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub co2: Option<i32>,
    pub temp: Option<f64>,
    pub humidity: Option<f64>,
    pub ts: Option<String>,
}

/// Body of `POST /api/sensor/batch`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPayload {
    pub device: String,
    pub readings: Vec<BatchEntry>,
}

/// Body of `POST /api/sensor/log`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPayload {
    pub device: String,
    pub event_type: String,
    pub message: String,
    pub uptime: Option<i64>,
}

/// Query string shared by the read endpoints. Everything stays a string until
/// validated so that bad values produce JSON errors instead of extractor
/// rejections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadParams {
    pub device: Option<String>,
    pub hours: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
}

/// Parses a request body that must be a non-empty JSON object, whatever the
/// declared content type.
pub fn parse_json_object(body: &[u8]) -> Result<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) if !map.is_empty() => Ok(map),
        _ => Err(Error::bad_request(NO_JSON_DATA)),
    }
}

impl SingleReadingPayload {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let map = parse_json_object(body)?;
        Ok(Self {
            device: require_device(&map)?,
            co2: co2_field(&map)?,
            temp: optional_field(&map, "temp")?,
            humidity: optional_field(&map, "humidity")?,
        })
    }
}

impl BatchPayload {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let map = parse_json_object(body)?;
        let device = require_device(&map)?;

        let entries = match map.get("readings") {
            None | Some(Value::Null) => return Err(Error::bad_request(NO_READINGS_PROVIDED)),
            Some(Value::Array(entries)) if entries.is_empty() => {
                return Err(Error::bad_request(NO_READINGS_PROVIDED))
            }
            Some(Value::Array(entries)) => entries,
            Some(_) => return Err(Error::bad_request("Invalid readings value: expected an array")),
        };

        let readings = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| match entry {
                Value::Object(fields) => BatchEntry::from_fields(fields),
                _ => Err(Error::bad_request(format!(
                    "Invalid reading at index {}: expected an object",
                    index
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { device, readings })
    }
}

impl BatchEntry {
    fn from_fields(fields: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            co2: co2_field(fields)?,
            temp: optional_field(fields, "temp")?,
            humidity: optional_field(fields, "humidity")?,
            // Non-string timestamps are treated like unparseable ones.
            ts: fields.get("ts").and_then(Value::as_str).map(str::to_string),
        })
    }
}

impl EventPayload {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let map = parse_json_object(body)?;
        Ok(Self {
            device: require_device(&map)?,
            event_type: optional_field(&map, "event_type")?
                .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
            message: optional_field(&map, "message")?.unwrap_or_default(),
            uptime: optional_field(&map, "uptime")?,
        })
    }
}

impl ReadParams {
    pub fn device(&self) -> Result<&str> {
        match self.device.as_deref() {
            Some(device) if !device.is_empty() => Ok(device),
            _ => Err(Error::bad_request(MISSING_DEVICE_PARAMETER)),
        }
    }

    pub fn hours(&self) -> Result<i64> {
        int_param("hours", self.hours.as_deref(), DEFAULT_HOURS)
    }

    pub fn limit(&self) -> Result<i64> {
        let limit = int_param("limit", self.limit.as_deref(), DEFAULT_EVENT_LIMIT)?;
        if limit < 0 {
            return Err(Error::bad_request("Invalid limit parameter"));
        }
        Ok(limit)
    }

    /// An empty `type` means no filter.
    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref().filter(|t| !t.is_empty())
    }

    /// Start of the `[now - hours, now]` lookback window.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let hours = self.hours()?;
        Duration::try_hours(hours)
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| Error::bad_request("Invalid hours parameter"))
    }
}

fn require_device(map: &Map<String, Value>) -> Result<String> {
    match map.get("device") {
        Some(Value::String(device)) if !device.is_empty() => Ok(device.clone()),
        _ => Err(Error::bad_request(MISSING_DEVICE_NAME)),
    }
}

fn optional_field<T: DeserializeOwned>(map: &Map<String, Value>, key: &str) -> Result<Option<T>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => T::deserialize(value)
            .map(Some)
            .map_err(|e| Error::bad_request(format!("Invalid {} value: {}", key, e))),
    }
}

/// CO2 is stored as an integer; fractional ppm values are rounded the way the
/// database would on assignment.
fn co2_field(map: &Map<String, Value>) -> Result<Option<i32>> {
    let invalid = || Error::bad_request("Invalid co2 value: expected an integer");
    match map.get("co2") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => {
            if let Some(value) = number.as_i64() {
                return i32::try_from(value).map(Some).map_err(|_| invalid());
            }
            match number.as_f64() {
                Some(value) if value.is_finite() && value.abs() <= i32::MAX as f64 => {
                    Ok(Some(value.round() as i32))
                }
                _ => Err(invalid()),
            }
        }
        Some(_) => Err(invalid()),
    }
}

fn int_param(name: &str, raw: Option<&str>, default: i64) -> Result<i64> {
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::bad_request(format!("Invalid {} parameter", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(err: Error) -> String {
        assert!(err.is_client_error());
        err.to_string()
    }

    #[test]
    fn test_valid_single_reading() {
        let payload = SingleReadingPayload::parse(
            br#"{"device":"office","co2":800,"temp":22.0,"humidity":45.0}"#,
        )
        .unwrap();

        assert_eq!(
            payload,
            SingleReadingPayload {
                device: "office".to_string(),
                co2: Some(800),
                temp: Some(22.0),
                humidity: Some(45.0),
            }
        );
    }

    #[test]
    fn test_single_reading_measurements_are_optional() {
        let payload = SingleReadingPayload::parse(br#"{"device":"office","co2":null}"#).unwrap();
        assert_eq!(payload.co2, None);
        assert_eq!(payload.temp, None);
        assert_eq!(payload.humidity, None);
    }

    #[test]
    fn test_integer_temperature_is_accepted() {
        let payload = SingleReadingPayload::parse(br#"{"device":"office","temp":22}"#).unwrap();
        assert_eq!(payload.temp, Some(22.0));
    }

    #[test]
    fn test_fractional_co2_is_rounded() {
        let payload = SingleReadingPayload::parse(br#"{"device":"office","co2":800.6}"#).unwrap();
        assert_eq!(payload.co2, Some(801));
    }

    #[test]
    fn test_invalid_json_body() {
        let bodies: [&[u8]; 6] = [b"", b"not json", b"{}", b"[1,2]", b"null", b"42"];
        for body in bodies {
            let err = SingleReadingPayload::parse(body).unwrap_err();
            assert_eq!(message(err), NO_JSON_DATA);
        }
    }

    #[test]
    fn test_missing_or_empty_device() {
        let bodies: [&[u8]; 4] = [
            br#"{"co2":800}"#,
            br#"{"device":""}"#,
            br#"{"device":null}"#,
            br#"{"device":7}"#,
        ];
        for body in bodies {
            let err = SingleReadingPayload::parse(body).unwrap_err();
            assert_eq!(message(err), MISSING_DEVICE_NAME);
        }
    }

    #[test]
    fn test_wrongly_typed_measurement() {
        let err = SingleReadingPayload::parse(br#"{"device":"office","co2":"high"}"#).unwrap_err();
        assert!(message(err).starts_with("Invalid co2 value"));

        let err = SingleReadingPayload::parse(br#"{"device":"office","temp":"warm"}"#).unwrap_err();
        assert!(message(err).starts_with("Invalid temp value"));
    }

    #[test]
    fn test_batch_keeps_entry_order_and_raw_ts() {
        let payload = BatchPayload::parse(
            br#"{"device":"office","readings":[{"co2":700,"ts":"2026-01-16T12:00:00Z"},{"co2":710},{"co2":720,"ts":12345}]}"#,
        )
        .unwrap();

        assert_eq!(payload.device, "office");
        assert_eq!(payload.readings.len(), 3);
        assert_eq!(payload.readings[0].co2, Some(700));
        assert_eq!(payload.readings[0].ts.as_deref(), Some("2026-01-16T12:00:00Z"));
        assert_eq!(payload.readings[1].ts, None);
        assert_eq!(payload.readings[2].ts, None);
    }

    #[test]
    fn test_batch_device_checked_before_readings() {
        let err = BatchPayload::parse(br#"{"readings":[]}"#).unwrap_err();
        assert_eq!(message(err), MISSING_DEVICE_NAME);
    }

    #[test]
    fn test_batch_without_readings() {
        let bodies: [&[u8]; 3] = [
            br#"{"device":"office"}"#,
            br#"{"device":"office","readings":null}"#,
            br#"{"device":"office","readings":[]}"#,
        ];
        for body in bodies {
            let err = BatchPayload::parse(body).unwrap_err();
            assert_eq!(message(err), NO_READINGS_PROVIDED);
        }
    }

    #[test]
    fn test_batch_rejects_malformed_entries() {
        let err = BatchPayload::parse(br#"{"device":"office","readings":"lots"}"#).unwrap_err();
        assert!(message(err).starts_with("Invalid readings value"));

        let err = BatchPayload::parse(br#"{"device":"office","readings":[{"co2":1},5]}"#).unwrap_err();
        assert_eq!(message(err), "Invalid reading at index 1: expected an object");
    }

    #[test]
    fn test_event_defaults() {
        let payload = EventPayload::parse(br#"{"device":"office"}"#).unwrap();
        assert_eq!(
            payload,
            EventPayload {
                device: "office".to_string(),
                event_type: "info".to_string(),
                message: String::new(),
                uptime: None,
            }
        );
    }

    #[test]
    fn test_event_fields() {
        let payload = EventPayload::parse(
            br#"{"device":"office","event_type":"critical","message":"Sensor not found","uptime":12345}"#,
        )
        .unwrap();
        assert_eq!(payload.event_type, "critical");
        assert_eq!(payload.message, "Sensor not found");
        assert_eq!(payload.uptime, Some(12345));
    }

    #[test]
    fn test_event_type_is_not_restricted() {
        let payload = EventPayload::parse(br#"{"device":"office","event_type":"debug"}"#).unwrap();
        assert_eq!(payload.event_type, "debug");
    }

    #[test]
    fn test_read_params_defaults() {
        let params = ReadParams {
            device: Some("office".to_string()),
            ..ReadParams::default()
        };
        assert_eq!(params.device().unwrap(), "office");
        assert_eq!(params.hours().unwrap(), DEFAULT_HOURS);
        assert_eq!(params.limit().unwrap(), DEFAULT_EVENT_LIMIT);
        assert_eq!(params.event_type(), None);
    }

    #[test]
    fn test_read_params_missing_device() {
        for device in [None, Some(String::new())] {
            let params = ReadParams {
                device,
                ..ReadParams::default()
            };
            assert_eq!(message(params.device().unwrap_err()), MISSING_DEVICE_PARAMETER);
        }
    }

    #[test]
    fn test_read_params_invalid_numbers() {
        let params = ReadParams {
            hours: Some("a day".to_string()),
            limit: Some("-1".to_string()),
            ..ReadParams::default()
        };
        assert_eq!(message(params.hours().unwrap_err()), "Invalid hours parameter");
        assert_eq!(message(params.limit().unwrap_err()), "Invalid limit parameter");
    }

    #[test]
    fn test_empty_type_filter_is_ignored() {
        let params = ReadParams {
            event_type: Some(String::new()),
            ..ReadParams::default()
        };
        assert_eq!(params.event_type(), None);
    }

    #[test]
    fn test_cutoff_uses_lookback_hours() {
        let now = Utc.with_ymd_and_hms(2026, 1, 16, 12, 0, 0).unwrap();
        let params = ReadParams {
            hours: Some("6".to_string()),
            ..ReadParams::default()
        };
        assert_eq!(
            params.cutoff(now).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 16, 6, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_cutoff_rejects_overflowing_window() {
        let params = ReadParams {
            hours: Some(i64::MAX.to_string()),
            ..ReadParams::default()
        };
        assert!(params.cutoff(Utc::now()).is_err());
    }
}
