//! HTTP API routes
//!
//! Defines all REST API endpoints for the server.

use crate::engine::IngestReceipt;
use crate::error::Error;
use crate::grid::{Coordinates, Precision};
use crate::observation::{ObjectCounts, Observation};
use crate::query::{latest_per_device, GridEstimate, NeighborhoodEstimate};
use crate::server::state::AppState;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/observations", post(ingest_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/neighborhood", get(neighborhood_handler))
        .route("/api/report", get(report_handler))
        .route("/api/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Ingest request body
///
/// Location is either `lat`/`lon` or the `"lat,lon"` string devices send as
/// `gps`. The device may be named `device_id` or `id`.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub people: u32,
    #[serde(default)]
    pub vehicles: u32,
    #[serde(default)]
    pub noise: f64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub gps: Option<String>,
    /// Capture time; the time of receipt when absent
    pub date: Option<DateTime<Utc>>,
    #[serde(alias = "id")]
    pub device_id: Option<String>,
    /// Idempotency key for retried uploads
    pub observation_id: Option<Uuid>,
}

impl IngestRequest {
    fn coords(&self) -> Result<Coordinates, Error> {
        match (self.lat, self.lon, &self.gps) {
            (Some(lat), Some(lon), _) => Ok(Coordinates::new(lat, lon)),
            (None, None, Some(gps)) => gps.parse(),
            _ => Err(Error::InvalidCoordinate(
                "Expected both lat and lon, or gps as \"lat,lon\"".to_string(),
            )),
        }
    }

    fn into_observation(self) -> Result<Observation, Error> {
        let coords = self.coords()?;
        let obs = Observation::new(
            ObjectCounts::new(self.people, self.vehicles),
            self.noise,
            coords,
            self.date.unwrap_or_else(Utc::now),
            self.device_id.unwrap_or_else(|| "unknown".to_string()),
        );
        Ok(match self.observation_id {
            Some(id) => obs.with_id(id),
            None => obs,
        })
    }
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
    /// Observation the error refers to, for partial ingests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_id: Option<Uuid>,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.code.as_str() {
            "INVALID_COORDINATE" => StatusCode::BAD_REQUEST,
            "NO_DATA" => StatusCode::NOT_FOUND,
            "PARTIAL_INGEST" => StatusCode::MULTI_STATUS,
            "STORE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let (code, observation_id) = match &err {
            Error::InvalidCoordinate(_) | Error::InvalidContribution(_) => {
                ("INVALID_COORDINATE", None)
            }
            Error::NoDataAvailable(_) => ("NO_DATA", None),
            Error::StoreUnavailable(_) => ("STORE_UNAVAILABLE", None),
            Error::PartialIngestFailure { id, .. } => ("PARTIAL_INGEST", Some(*id)),
            _ => ("INTERNAL_ERROR", None),
        };
        ApiError {
            error: err.to_string(),
            code: code.to_string(),
            observation_id,
        }
    }
}

/// Record an observation
///
/// POST /api/observations
async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestReceipt>), ApiError> {
    let obs = req.into_observation()?;
    let receipt = state.engine.record(&obs, state.precision)?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Point query parameters
#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub lat: f64,
    pub lon: f64,
    /// Grid resolution to read. Anchors only exist at the precision the
    /// server ingests with, so any other value finds no data.
    pub precision: Option<f64>,
}

/// Interpolated grid estimate
///
/// GET /api/stats
async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatsParams>,
) -> Result<Json<GridEstimate>, ApiError> {
    let coords = Coordinates::new(params.lat, params.lon);
    let precision = match params.precision {
        Some(value) => Precision::new(value)?,
        None => state.precision,
    };

    state
        .statistics
        .query(coords, precision)?
        .map(Json)
        .ok_or_else(|| {
            let reason = if precision == state.precision {
                format!("No anchor around {} holds data", coords)
            } else {
                format!(
                    "No anchors at precision {}; observations are recorded at precision {}",
                    precision, state.precision
                )
            };
            ApiError::from(Error::NoDataAvailable(reason))
        })
}

/// Neighborhood query parameters
#[derive(Debug, Deserialize)]
pub struct NeighborhoodParams {
    pub lat: f64,
    pub lon: f64,
    pub half_width: Option<f64>,
    pub sigma: Option<f64>,
}

/// Kernel-weighted estimate from raw observations
///
/// GET /api/neighborhood
async fn neighborhood_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NeighborhoodParams>,
) -> Result<Json<NeighborhoodEstimate>, ApiError> {
    let settings = &state.config.neighborhood;
    let estimate = state.neighborhood.query(
        Coordinates::new(params.lat, params.lon),
        params.half_width.unwrap_or(settings.half_width),
        params.sigma.unwrap_or(settings.sigma),
    )?;
    Ok(Json(estimate))
}

/// Report query parameters
#[derive(Debug, Deserialize)]
pub struct ReportParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Report response
#[derive(Debug, Serialize, Deserialize)]
pub struct ReportResponse {
    pub observations: Vec<Observation>,
    pub count: usize,
}

/// Latest observation per device and location
///
/// GET /api/report
async fn report_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReportParams>,
) -> Result<Json<ReportResponse>, ApiError> {
    let from = params.from.unwrap_or(DateTime::<Utc>::MIN_UTC);
    let to = params.to.unwrap_or_else(Utc::now);

    let log = state.engine.log();
    let observations = latest_per_device(log.as_ref(), from, to, state.precision)?;

    Ok(Json(ReportResponse {
        count: observations.len(),
        observations,
    }))
}

/// Status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Server is running
    pub running: bool,
    /// Server version
    pub version: String,
    /// Default grid precision
    pub precision: f64,
    /// Anchors holding data
    pub anchors: usize,
    /// Observations in the log
    pub observations: usize,
    /// Uptime in seconds
    pub uptime_secs: u64,
}

/// Server status endpoint
///
/// GET /api/status
async fn status_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(StatusResponse {
        running: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        precision: state.precision.value(),
        anchors: state.engine.anchors().len()?,
        observations: state.engine.log().len()?,
        uptime_secs: state.uptime_secs(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn create_test_state() -> Arc<AppState> {
        Arc::new(AppState::new(Config::default()).unwrap())
    }

    async fn post_json(
        app: Router,
        uri: &str,
        body: serde_json::Value,
    ) -> axum::response::Response {
        app.oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn get(app: Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let app = create_router(create_test_state());

        let response = get(app, "/api/status").await;
        assert_eq!(response.status(), StatusCode::OK);

        let status: StatusResponse = body_json(response).await;
        assert!(status.running);
        assert_eq!(status.precision, 1000.0);
        assert_eq!(status.anchors, 0);
        assert_eq!(status.observations, 0);
    }

    #[tokio::test]
    async fn test_ingest_then_stats() {
        let state = create_test_state();

        let response = post_json(
            create_router(state.clone()),
            "/api/observations",
            serde_json::json!({
                "people": 4,
                "vehicles": 2,
                "noise": 63.5,
                "lat": 46.00742,
                "lon": 8.95218,
                "device_id": "cam-7"
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let receipt: IngestReceipt = body_json(response).await;
        assert_eq!(receipt.anchors, 4);

        let response = get(
            create_router(state.clone()),
            "/api/stats?lat=46.00742&lon=8.95218",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let estimate: GridEstimate = body_json(response).await;
        assert!((estimate.stats.people - 4.0).abs() < 1e-9);
        assert!((estimate.stats.noise - 63.5).abs() < 1e-9);
        assert_eq!(estimate.anchors_used, 4);

        let response = get(create_router(state), "/api/status").await;
        let status: StatusResponse = body_json(response).await;
        assert_eq!(status.anchors, 4);
        assert_eq!(status.observations, 1);
    }

    #[tokio::test]
    async fn test_ingest_legacy_fields() {
        let state = create_test_state();

        let response = post_json(
            create_router(state.clone()),
            "/api/observations",
            serde_json::json!({
                "people": 1,
                "gps": "10.5,20.5",
                "id": "legacy-device",
                "date": "2024-03-01T12:00:00Z"
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let log = state.engine.log();
        let all = log.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].device_id, "legacy-device");
        assert_eq!(all[0].lat, 10.5);
        assert_eq!(all[0].lon, 20.5);
    }

    #[tokio::test]
    async fn test_ingest_retry_is_idempotent() {
        let state = create_test_state();
        let body = serde_json::json!({
            "people": 10,
            "lat": 1.0,
            "lon": 2.0,
            "device_id": "d",
            "observation_id": "67e55044-10b1-426f-9247-bb680e5fe0c8"
        });

        for _ in 0..3 {
            let response =
                post_json(create_router(state.clone()), "/api/observations", body.clone()).await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        assert_eq!(state.engine.log().len().unwrap(), 1);
        let response = get(create_router(state), "/api/stats?lat=1.0&lon=2.0").await;
        let estimate: GridEstimate = body_json(response).await;
        assert!((estimate.stats.people - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_ingest_invalid_coordinates() {
        let state = create_test_state();

        let response = post_json(
            create_router(state.clone()),
            "/api/observations",
            serde_json::json!({ "people": 1, "lat": 91.0, "lon": 0.0 }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let err: ApiError = body_json(response).await;
        assert_eq!(err.code, "INVALID_COORDINATE");
        assert!(state.engine.anchors().is_empty().unwrap());
        assert!(state.engine.log().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_ingest_missing_location() {
        let app = create_router(create_test_state());

        let response = post_json(
            app,
            "/api/observations",
            serde_json::json!({ "people": 1, "lat": 10.0 }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let err: ApiError = body_json(response).await;
        assert_eq!(err.code, "INVALID_COORDINATE");
    }

    #[tokio::test]
    async fn test_stats_no_data() {
        let app = create_router(create_test_state());

        let response = get(app, "/api/stats?lat=10.0&lon=20.0").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let err: ApiError = body_json(response).await;
        assert_eq!(err.code, "NO_DATA");
    }

    #[tokio::test]
    async fn test_stats_other_precision_names_ingest_precision() {
        let state = create_test_state();
        let response = post_json(
            create_router(state.clone()),
            "/api/observations",
            serde_json::json!({ "people": 3, "lat": 46.0, "lon": 8.95, "device_id": "d" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = get(
            create_router(state),
            "/api/stats?lat=46.0&lon=8.95&precision=500",
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let err: ApiError = body_json(response).await;
        assert_eq!(err.code, "NO_DATA");
        assert!(err.error.contains("recorded at precision 1000"));
    }

    #[tokio::test]
    async fn test_stats_invalid_precision() {
        let app = create_router(create_test_state());

        let response = get(app, "/api/stats?lat=10.0&lon=20.0&precision=0").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_neighborhood_endpoint() {
        let state = create_test_state();
        for (people, lon) in [(10, 8.9500), (20, 8.9510)] {
            let response = post_json(
                create_router(state.clone()),
                "/api/observations",
                serde_json::json!({ "people": people, "lat": 46.0, "lon": lon, "device_id": "d" }),
            )
            .await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = get(
            create_router(state.clone()),
            "/api/neighborhood?lat=46.0&lon=8.9505",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let estimate: NeighborhoodEstimate = body_json(response).await;
        assert_eq!(estimate.observations, 2);
        assert!((estimate.stats.people - 15.0).abs() < 1e-9);

        let response = get(create_router(state), "/api/neighborhood?lat=0.0&lon=0.0").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_neighborhood_rejects_bad_sigma() {
        let app = create_router(create_test_state());

        let response = get(app, "/api/neighborhood?lat=46.0&lon=8.95&sigma=0").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_report_endpoint() {
        let state = create_test_state();
        for (people, date) in [(1, "2024-03-01T08:00:00Z"), (2, "2024-03-01T09:00:00Z")] {
            let response = post_json(
                create_router(state.clone()),
                "/api/observations",
                serde_json::json!({
                    "people": people,
                    "lat": 46.0,
                    "lon": 8.95,
                    "device_id": "cam-1",
                    "date": date
                }),
            )
            .await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = get(
            create_router(state),
            "/api/report?from=2024-03-01T00:00:00Z&to=2024-03-02T00:00:00Z",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let report: ReportResponse = body_json(response).await;
        assert_eq!(report.count, 1);
        assert_eq!(report.observations[0].people, 2);
    }

    #[test]
    fn test_error_codes() {
        let partial = ApiError::from(Error::PartialIngestFailure {
            id: Uuid::nil(),
            aggregated: true,
            logged: false,
            reason: "log down".to_string(),
        });
        assert_eq!(partial.code, "PARTIAL_INGEST");
        assert_eq!(partial.status(), StatusCode::MULTI_STATUS);
        assert_eq!(partial.observation_id, Some(Uuid::nil()));

        let down = ApiError::from(Error::StoreUnavailable("poisoned".to_string()));
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);

        let other = ApiError::from(Error::Server("boom".to_string()));
        assert_eq!(other.code, "INTERNAL_ERROR");
        assert_eq!(other.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
