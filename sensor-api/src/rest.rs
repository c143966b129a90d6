use crate::batching::prepare_batch;
use crate::db;
use crate::errors::Error;
use crate::metrics::{BATCH_SIZE, CLIENT_ERRORS_TOTAL, EVENTS_STORED_TOTAL, READINGS_STORED_TOTAL};
use crate::model::{
    format_ts, CalibrationResponse, EventView, HealthResponse, NewEvent, ReadingView, StatsResponse,
    StatusResponse,
};
use crate::validate::{BatchPayload, EventPayload, ReadParams, SingleReadingPayload};
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
struct AppState {
    pool: PgPool,
}

pub fn create_router(pool: PgPool) -> Router {
    let state = AppState { pool };

    Router::new()
        .route("/health", get(health))
        .route("/api/sensor", get(get_readings).post(receive_single))
        .route("/api/sensor/batch", post(receive_batch))
        .route("/api/sensor/log", get(get_events).post(receive_event))
        .route("/api/sensor/calibration", get(get_calibration))
        .route("/api/sensor/stats", get(get_stats))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Response {
    match db::ping(&state.pool).await {
        Ok(()) => Json(HealthResponse {
            status: "ok",
            database: "connected".to_string(),
        })
        .into_response(),
        Err(e) => {
            error!("[ERROR] Health check failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HealthResponse {
                    status: "error",
                    database: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn receive_single(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    let payload = SingleReadingPayload::parse(&body).map_err(failed("Single insert"))?;

    db::insert_reading(
        &state.pool,
        &payload.device,
        payload.co2,
        payload.temp,
        payload.humidity,
    )
    .await
    .map_err(failed("Single insert"))?;

    READINGS_STORED_TOTAL.inc();
    info!(
        "[SINGLE] {}: co2={:?} temp={:?} humidity={:?}",
        payload.device, payload.co2, payload.temp, payload.humidity
    );
    Ok(Json(StatusResponse::ok()))
}

async fn receive_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    let payload = BatchPayload::parse(&body).map_err(failed("Batch insert"))?;
    let rows = prepare_batch(&payload.readings, Utc::now());

    db::insert_batch(&state.pool, &payload.device, &rows)
        .await
        .map_err(failed("Batch insert"))?;

    let stored = rows.len();
    READINGS_STORED_TOTAL.inc_by(stored as f64);
    BATCH_SIZE.observe(stored as f64);
    info!("[BATCH] {}: {} readings stored", payload.device, stored);
    Ok(Json(StatusResponse::stored(stored)))
}

async fn receive_event(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    let payload = EventPayload::parse(&body).map_err(failed("Event insert"))?;
    let event = NewEvent {
        device: payload.device,
        event_type: payload.event_type,
        message: payload.message,
        uptime_seconds: payload.uptime,
    };

    db::insert_event(&state.pool, &event)
        .await
        .map_err(failed("Event insert"))?;

    EVENTS_STORED_TOTAL.inc();
    info!("[EVENT] {} ({}): {}", event.device, event.event_type, event.message);
    Ok(Json(StatusResponse::ok()))
}

async fn get_readings(
    State(state): State<AppState>,
    params: Result<Query<ReadParams>, QueryRejection>,
) -> Result<Json<Vec<ReadingView>>, ApiError> {
    let Query(params) = params.map_err(rejected).map_err(failed("Get readings"))?;
    let device = params.device().map_err(failed("Get readings"))?;
    let cutoff = params.cutoff(Utc::now()).map_err(failed("Get readings"))?;

    let rows = db::fetch_readings(&state.pool, device, cutoff)
        .await
        .map_err(failed("Get readings"))?;

    debug!("{} readings for {} since {}", rows.len(), device, cutoff);
    Ok(Json(rows.into_iter().map(ReadingView::from).collect()))
}

async fn get_events(
    State(state): State<AppState>,
    params: Result<Query<ReadParams>, QueryRejection>,
) -> Result<Json<Vec<EventView>>, ApiError> {
    let Query(params) = params.map_err(rejected).map_err(failed("Get events"))?;
    let device = params.device().map_err(failed("Get events"))?;
    let cutoff = params.cutoff(Utc::now()).map_err(failed("Get events"))?;
    let limit = params.limit().map_err(failed("Get events"))?;

    let rows = db::fetch_events(&state.pool, device, cutoff, params.event_type(), limit)
        .await
        .map_err(failed("Get events"))?;

    debug!("{} events for {} since {}", rows.len(), device, cutoff);
    Ok(Json(rows.into_iter().map(EventView::from).collect()))
}

async fn get_calibration(
    State(state): State<AppState>,
    params: Result<Query<ReadParams>, QueryRejection>,
) -> Result<Json<CalibrationResponse>, ApiError> {
    let Query(params) = params.map_err(rejected).map_err(failed("Get calibration"))?;
    let device = params.device().map_err(failed("Get calibration"))?;

    let last = db::last_calibration(&state.pool, device)
        .await
        .map_err(failed("Get calibration"))?;

    Ok(Json(CalibrationResponse {
        date: last.map(format_ts),
    }))
}

async fn get_stats(
    State(state): State<AppState>,
    params: Result<Query<ReadParams>, QueryRejection>,
) -> Result<Json<StatsResponse>, ApiError> {
    let Query(params) = params.map_err(rejected).map_err(failed("Get stats"))?;
    let device = params.device().map_err(failed("Get stats"))?;
    let cutoff = params.cutoff(Utc::now()).map_err(failed("Get stats"))?;

    let row = db::reading_stats(&state.pool, device, cutoff)
        .await
        .map_err(failed("Get stats"))?;

    Ok(Json(StatsResponse::from(row)))
}

fn rejected(rejection: QueryRejection) -> Error {
    Error::bad_request(rejection.body_text())
}

/// Logs a failed operation and hands the error to the response layer.
fn failed(operation: &'static str) -> impl Fn(Error) -> ApiError {
    move |err| {
        if err.is_client_error() {
            warn!("{} rejected: {}", operation, err);
        } else {
            error!("[ERROR] {} failed: {}", operation, err);
        }
        ApiError(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Client errors become 400, anything else 500; the body always carries the
/// raw error text.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            CLIENT_ERRORS_TOTAL.inc();
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_maps_to_bad_request() {
        let response = ApiError(Error::bad_request("Missing device name")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_database_error_maps_to_server_error() {
        let response = ApiError(Error::from(sqlx::Error::PoolTimedOut)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_body_is_json() {
        tokio_test::block_on(async {
            let response = ApiError(Error::bad_request("No JSON data")).into_response();
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(value, serde_json::json!({"error": "No JSON data"}));
        });
    }
}
