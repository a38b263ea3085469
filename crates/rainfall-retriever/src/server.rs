//! HTTP presentation API over one [`Orchestrator`] session

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::info;
use ts_rs::TS;

use crate::dataset::{RainfallResponse, TableKind};
use crate::error::{AppError, ErrorKind};
use crate::export::{export_filename, table_to_csv};
use crate::map::{orchestrator_listener, run_map_sync, MapSurface, SceneView};
use crate::orchestrator::{InputMode, Orchestrator, Snapshot, SubmitOutcome};

/// Shared state for the HTTP server
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    pub map: Arc<Mutex<MapSurface<SceneView>>>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    /// Mount a headless map on the orchestrator's current state
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        let map = MapSurface::mount(
            SceneView::new(),
            &orchestrator.snapshot(),
            orchestrator_listener(&orchestrator),
        );
        Self {
            orchestrator,
            map: Arc::new(Mutex::new(map)),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

/// Everything the page renders
#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct SessionView {
    pub latitude: String,
    pub longitude: String,
    pub address: String,
    pub mode: InputMode,
    pub loading: bool,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub data: Option<RainfallResponse>,
}

impl From<&Snapshot> for SessionView {
    fn from(snapshot: &Snapshot) -> Self {
        let failure = snapshot.phase.failure();
        Self {
            latitude: snapshot.form.latitude.clone(),
            longitude: snapshot.form.longitude.clone(),
            address: snapshot.form.address.clone(),
            mode: snapshot.form.mode,
            loading: snapshot.phase.is_loading(),
            error: failure.map(|f| f.user_message()),
            error_kind: failure.map(|f| f.kind),
            data: snapshot.phase.dataset().map(|d| d.to_wire()),
        }
    }
}

/// Partial form edit; absent fields are left alone
#[derive(Debug, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct FormUpdate {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub address: Option<String>,
    pub mode: Option<InputMode>,
}

/// A click or marker drag on the client's map
#[derive(Debug, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MapInteraction {
    pub lat: f64,
    pub lng: f64,
}

/// Create the HTTP router
pub fn create_router(state: SharedState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/session", get(get_session))
        .route("/api/form", put(update_form))
        .route("/api/retrieve", post(retrieve))
        .route("/api/map", get(get_map))
        .route("/api/map/interaction", post(map_interaction))
        .route("/api/export/{kind}", get(export_table))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server, keeping the map in step with the session
pub async fn start_server(state: SharedState, port: u16, cors: CorsLayer) -> std::io::Result<()> {
    tokio::spawn(run_map_sync(
        state.orchestrator.subscribe(),
        state.map.clone(),
    ));

    let router = create_router(state, cors);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

fn session(state: &ServerState) -> Json<SessionView> {
    Json(SessionView::from(&state.orchestrator.snapshot()))
}

async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
    })
}

async fn get_session(State(state): State<SharedState>) -> Json<SessionView> {
    session(&state)
}

async fn update_form(
    State(state): State<SharedState>,
    Json(update): Json<FormUpdate>,
) -> Json<SessionView> {
    let orchestrator = &state.orchestrator;
    if let Some(mode) = update.mode {
        orchestrator.set_mode(mode);
    }
    if let Some(address) = &update.address {
        orchestrator.set_address(address);
    }
    if let Some(latitude) = &update.latitude {
        orchestrator.set_latitude(latitude);
    }
    if let Some(longitude) = &update.longitude {
        orchestrator.set_longitude(longitude);
    }
    session(&state)
}

/// Run one retrieval; failures are part of the session, only a busy orchestrator is an HTTP error
async fn retrieve(State(state): State<SharedState>) -> Result<Json<SessionView>, AppError> {
    match state.orchestrator.submit().await {
        SubmitOutcome::Busy => Err(AppError::Conflict(
            "A retrieval is already in progress".to_string(),
        )),
        SubmitOutcome::Completed(_) | SubmitOutcome::Discarded => Ok(session(&state)),
    }
}

async fn map_interaction(
    State(state): State<SharedState>,
    Json(event): Json<MapInteraction>,
) -> Result<Json<SessionView>, AppError> {
    if !event.lat.is_finite() || !event.lng.is_finite() {
        return Err(AppError::BadRequest("lat and lng must be numbers".to_string()));
    }
    state.map.lock().await.interact(event.lat, event.lng);
    Ok(session(&state))
}

async fn get_map(State(state): State<SharedState>) -> Json<SceneView> {
    let snapshot = state.orchestrator.snapshot();
    let mut map = state.map.lock().await;
    map.sync(&snapshot);
    Json(map.view().clone())
}

async fn export_table(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
) -> Result<Response, AppError> {
    let kind: TableKind = kind.parse().map_err(AppError::BadRequest)?;
    let snapshot = state.orchestrator.snapshot();
    let dataset = snapshot
        .phase
        .dataset()
        .ok_or_else(|| AppError::NotFound("No rainfall data to export".to_string()))?;

    let filename = export_filename(kind, &snapshot.form.latitude, &snapshot.form.longitude);
    let csv = table_to_csv(dataset.table(kind));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv;charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        csv,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::testing::{FakeGeocoder, FakeRainfall};
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tokio::sync::Notify;
    use tower::ServiceExt;

    fn create_test_state(rainfall: FakeRainfall) -> SharedState {
        let orchestrator = Orchestrator::new(
            Arc::new(FakeGeocoder::resolving(39.7392, -104.9903)),
            Arc::new(rainfall),
        );
        Arc::new(ServerState::new(Arc::new(orchestrator)))
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let router = create_router(create_test_state(FakeRainfall::returning(1.0)), CorsLayer::permissive());

        let (status, json) = send(&router, request(Method::GET, "/health", None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["uptimeSecs"].as_u64().is_some());
    }

    #[tokio::test]
    async fn test_initial_session() {
        let router = create_router(create_test_state(FakeRainfall::returning(1.0)), CorsLayer::permissive());

        let (status, json) = send(&router, request(Method::GET, "/api/session", None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["latitude"], "32.2226");
        assert_eq!(json["longitude"], "-110.9747");
        assert_eq!(json["mode"], "coords");
        assert_eq!(json["loading"], false);
        assert!(json["error"].is_null());
        assert!(json["data"].is_null());
    }

    #[tokio::test]
    async fn test_retrieve_success() {
        let router = create_router(create_test_state(FakeRainfall::returning(2.2)), CorsLayer::permissive());

        let (status, json) = send(&router, request(Method::POST, "/api/retrieve", None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["loading"], false);
        assert!(json["error"].is_null());
        assert_eq!(json["data"]["intensityTable"].as_array().unwrap().len(), 8);
        assert_eq!(json["data"]["depthTable"][0]["duration"], "5-min");
        assert_eq!(json["data"]["intensityTable"][0]["100-yr"], 2.2);
    }

    #[tokio::test]
    async fn test_retrieve_validation_failure() {
        let router = create_router(create_test_state(FakeRainfall::returning(2.2)), CorsLayer::permissive());
        send(
            &router,
            request(Method::PUT, "/api/form", Some(json!({ "latitude": "95", "longitude": "-110" }))),
        )
        .await;

        let (status, json) = send(&router, request(Method::POST, "/api/retrieve", None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["errorKind"], "validation");
        assert_eq!(
            json["error"],
            "Invalid coordinates. Please enter a valid latitude (-90 to 90) and longitude (-180 to 180)."
        );
        assert!(json["data"].is_null());
    }

    #[tokio::test]
    async fn test_address_retrieval_updates_form() {
        let router = create_router(create_test_state(FakeRainfall::returning(2.2)), CorsLayer::permissive());
        let (_, json) = send(
            &router,
            request(Method::PUT, "/api/form", Some(json!({ "mode": "address", "address": "Denver, CO" }))),
        )
        .await;
        assert_eq!(json["mode"], "address");

        let (_, json) = send(&router, request(Method::POST, "/api/retrieve", None)).await;

        assert_eq!(json["latitude"], "39.739200");
        assert_eq!(json["longitude"], "-104.990300");
        assert!(json["data"].is_object());
    }

    #[tokio::test]
    async fn test_retrieve_while_loading_conflicts() {
        let gate = Arc::new(Notify::new());
        let state = create_test_state(FakeRainfall::returning(2.2).gated(gate.clone()));
        let mut rx = state.orchestrator.subscribe();
        let router = create_router(state, CorsLayer::permissive());

        let first = tokio::spawn({
            let router = router.clone();
            async move { send(&router, request(Method::POST, "/api/retrieve", None)).await }
        });
        rx.wait_for(|s| s.phase.is_loading()).await.unwrap();

        let (status, json) = send(&router, request(Method::POST, "/api/retrieve", None)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"], "A retrieval is already in progress");

        let (_, json) = send(&router, request(Method::GET, "/api/session", None)).await;
        assert_eq!(json["loading"], true);

        gate.notify_one();
        let (status, _) = first.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_map_interaction_moves_marker() {
        let router = create_router(create_test_state(FakeRainfall::returning(1.0)), CorsLayer::permissive());
        send(&router, request(Method::PUT, "/api/form", Some(json!({ "mode": "address" })))).await;

        let (status, json) = send(
            &router,
            request(Method::POST, "/api/map/interaction", Some(json!({ "lat": 40.0, "lng": -105.0 }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["latitude"], "40.000000");
        assert_eq!(json["longitude"], "-105.000000");
        assert_eq!(json["mode"], "coords");

        let (_, scene) = send(&router, request(Method::GET, "/api/map", None)).await;
        assert_eq!(scene["marker"], json!({ "lat": 40.0, "lng": -105.0 }));
        assert_eq!(scene["zoom"], 13);
    }

    #[tokio::test]
    async fn test_map_shows_affected_area() {
        let router = create_router(create_test_state(FakeRainfall::returning(3.0)), CorsLayer::permissive());
        send(&router, request(Method::POST, "/api/retrieve", None)).await;

        let (_, scene) = send(&router, request(Method::GET, "/api/map", None)).await;

        assert_eq!(scene["overlays"][0]["radiusMeters"], 1500.0);
        assert!(scene["bounds"].is_object());
    }

    #[tokio::test]
    async fn test_export_requires_data() {
        let router = create_router(create_test_state(FakeRainfall::returning(1.0)), CorsLayer::permissive());

        let (status, json) = send(&router, request(Method::GET, "/api/export/intensity", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "No rainfall data to export");

        let (status, _) = send(&router, request(Method::GET, "/api/export/volume", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_export_csv() {
        let router = create_router(create_test_state(FakeRainfall::returning(1.0)), CorsLayer::permissive());
        send(&router, request(Method::POST, "/api/retrieve", None)).await;

        let response = router
            .oneshot(request(Method::GET, "/api/export/depth", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"rainfall_depth_32.2226_-110.9747.csv\""
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let csv = String::from_utf8(body.to_vec()).unwrap();
        assert!(csv.starts_with("Duration,2-yr,5-yr,10-yr,25-yr,50-yr,100-yr\n5-min,"));
        assert_eq!(csv.lines().count(), 9);
    }
}
