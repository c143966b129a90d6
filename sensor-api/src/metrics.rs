use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref READINGS_STORED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "sensor_api_readings_stored_total",
        "Total readings persisted (single and batch)"
    ))
    .unwrap();
    pub static ref EVENTS_STORED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "sensor_api_events_stored_total",
        "Total sensor events persisted"
    ))
    .unwrap();
    pub static ref CLIENT_ERRORS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "sensor_api_client_errors_total",
        "Total requests rejected as client errors"
    ))
    .unwrap();
    pub static ref DB_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "sensor_api_db_failures_total",
        "Total failed database statements"
    ))
    .unwrap();
    pub static ref BATCH_SIZE: Histogram = Histogram::with_opts(
        HistogramOpts::new("sensor_api_batch_size", "Readings per accepted batch upload")
            .buckets(vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 250.0, 500.0])
    )
    .unwrap();
    pub static ref QUERY_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "sensor_api_query_latency_seconds",
            "Time taken by a single database statement"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
}

pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(READINGS_STORED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EVENTS_STORED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CLIENT_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DB_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BATCH_SIZE.clone()))?;
    REGISTRY.register(Box::new(QUERY_LATENCY_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("[ERROR] Encoding metrics failed: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
