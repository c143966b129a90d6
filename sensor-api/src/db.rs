use crate::errors::{Error, Result};
use crate::metrics::{DB_FAILURES_TOTAL, QUERY_LATENCY_SECONDS};
use crate::model::{EventRow, NewEvent, NewReading, ReadingRow, StatsRow};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::info;

/// Builds the pool without connecting. Connections are opened on first use
/// and each statement below holds one only for its own duration.
pub fn make_pool(database_url: &str, max_connections: u32, acquire_timeout: Duration) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect_lazy(database_url)?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Migrations completed");
    Ok(())
}

async fn timed<T, F>(statement: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let start = Instant::now();
    let result = statement.await;
    QUERY_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
    result.map_err(|e| {
        DB_FAILURES_TOTAL.inc();
        Error::from(e)
    })
}

/// Connectivity probe.
pub async fn ping(pool: &PgPool) -> Result<()> {
    timed(sqlx::query("SELECT 1").execute(pool)).await?;
    Ok(())
}

/// Single reading; `created_at` is left to the database clock.
pub async fn insert_reading(
    pool: &PgPool,
    device: &str,
    co2: Option<i32>,
    temp: Option<f64>,
    humidity: Option<f64>,
) -> Result<()> {
    let query = r#"
        INSERT INTO readings (device, co2, temp, humidity)
        VALUES ($1, $2, $3, $4)
        "#;

    timed(
        sqlx::query(query)
            .bind(device)
            .bind(co2)
            .bind(temp)
            .bind(humidity)
            .execute(pool),
    )
    .await?;
    Ok(())
}

/// Writes every reading of one device in a single multi-row statement, so
/// the batch commits or fails as a whole.
pub async fn insert_batch(pool: &PgPool, device: &str, batch: &[NewReading]) -> Result<u64> {
    if batch.is_empty() {
        return Ok(0);
    }

    let co2: Vec<Option<i32>> = batch.iter().map(|r| r.co2).collect();
    let temps: Vec<Option<f64>> = batch.iter().map(|r| r.temp).collect();
    let humidities: Vec<Option<f64>> = batch.iter().map(|r| r.humidity).collect();
    let timestamps: Vec<DateTime<Utc>> = batch.iter().map(|r| r.created_at).collect();

    let query = r#"
        INSERT INTO readings (device, co2, temp, humidity, created_at)
        SELECT $1, u.co2, u.temp, u.humidity, u.created_at
        FROM UNNEST($2::int4[], $3::float8[], $4::float8[], $5::timestamptz[])
            AS u(co2, temp, humidity, created_at)
        "#;

    let result = timed(
        sqlx::query(query)
            .bind(device)
            .bind(&co2)
            .bind(&temps)
            .bind(&humidities)
            .bind(&timestamps)
            .execute(pool),
    )
    .await?;

    Ok(result.rows_affected())
}

pub async fn insert_event(pool: &PgPool, event: &NewEvent) -> Result<()> {
    let query = r#"
        INSERT INTO sensor_events (device, event_type, message, uptime_seconds)
        VALUES ($1, $2, $3, $4)
        "#;

    timed(
        sqlx::query(query)
            .bind(&event.device)
            .bind(&event.event_type)
            .bind(&event.message)
            .bind(event.uptime_seconds)
            .execute(pool),
    )
    .await?;
    Ok(())
}

/// Readings at or after `cutoff`, oldest first.
pub async fn fetch_readings(
    pool: &PgPool,
    device: &str,
    cutoff: DateTime<Utc>,
) -> Result<Vec<ReadingRow>> {
    let query = r#"
        SELECT co2::int4 AS co2, temp::float8 AS temp, humidity::float8 AS humidity, created_at
        FROM readings
        WHERE device = $1 AND created_at >= $2
        ORDER BY created_at ASC
        "#;

    timed(
        sqlx::query_as::<_, ReadingRow>(query)
            .bind(device)
            .bind(cutoff)
            .fetch_all(pool),
    )
    .await
}

/// Events at or after `cutoff`, newest first, optionally restricted to one
/// exact `event_type`.
pub async fn fetch_events(
    pool: &PgPool,
    device: &str,
    cutoff: DateTime<Utc>,
    event_type: Option<&str>,
    limit: i64,
) -> Result<Vec<EventRow>> {
    let mut conditions = vec!["device = $1", "created_at >= $2"];
    if event_type.is_some() {
        conditions.push("event_type = $4");
    }

    let query = format!(
        "SELECT event_type, message, uptime_seconds::int8 AS uptime_seconds, created_at
         FROM sensor_events
         WHERE {}
         ORDER BY created_at DESC
         LIMIT $3",
        conditions.join(" AND ")
    );

    let mut query_builder = sqlx::query_as::<_, EventRow>(&query)
        .bind(device)
        .bind(cutoff)
        .bind(limit);
    if let Some(event_type) = event_type {
        query_builder = query_builder.bind(event_type);
    }

    timed(query_builder.fetch_all(pool)).await
}

/// Timestamp of the newest event whose message mentions calibration.
pub async fn last_calibration(pool: &PgPool, device: &str) -> Result<Option<DateTime<Utc>>> {
    let query = r#"
        SELECT created_at
        FROM sensor_events
        WHERE device = $1 AND LOWER(message) LIKE $2
        ORDER BY created_at DESC
        LIMIT 1
        "#;

    let row: Option<(Option<DateTime<Utc>>,)> = timed(
        sqlx::query_as(query)
            .bind(device)
            .bind("%calibrat%")
            .fetch_optional(pool),
    )
    .await?;

    Ok(row.and_then(|(created_at,)| created_at))
}

pub async fn reading_stats(pool: &PgPool, device: &str, cutoff: DateTime<Utc>) -> Result<StatsRow> {
    let query = r#"
        SELECT
            COUNT(*) AS count,
            AVG(co2)::float8 AS avg_co2,
            MIN(co2)::int4 AS min_co2,
            MAX(co2)::int4 AS max_co2,
            AVG(temp)::float8 AS avg_temp,
            MIN(temp)::float8 AS min_temp,
            MAX(temp)::float8 AS max_temp,
            AVG(humidity)::float8 AS avg_humidity,
            MIN(humidity)::float8 AS min_humidity,
            MAX(humidity)::float8 AS max_humidity
        FROM readings
        WHERE device = $1 AND created_at >= $2
        "#;

    timed(
        sqlx::query_as::<_, StatsRow>(query)
            .bind(device)
            .bind(cutoff)
            .fetch_one(pool),
    )
    .await
}
