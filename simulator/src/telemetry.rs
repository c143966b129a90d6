use serde::Serialize;

/// One buffered measurement, as a device uploads it in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub co2: i32,
    pub temp: f64,
    pub humidity: f64,
    pub ts: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Batch<'a> {
    pub device: &'a str,
    pub readings: &'a [Reading],
}

#[derive(Debug, Clone, Serialize)]
pub struct Event<'a> {
    pub device: &'a str,
    pub event_type: &'a str,
    pub message: String,
    pub uptime: u64,
}
