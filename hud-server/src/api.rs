//! REST API and SSE routes

use crate::state::{AppState, InputStatus};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures::stream::{Stream, StreamExt as FuturesStreamExt};
use hud_core::model::{PayloadMessage, Target};
use hud_core::{BuoyPlacement, BuoySpeed, FieldMask};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/inputs", get(list_inputs))
        .route("/api/telemetry", get(telemetry_snapshot))
        .route("/api/telemetry/stream", get(telemetry_stream))
        .route("/api/targets", get(list_targets))
        .route("/api/targets/nearest", get(nearest_target))
        .route("/api/targets/buoy", post(drop_buoy))
        .route("/api/targets/messages", post(post_message))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// === Input Endpoints ===

async fn list_inputs(State(state): State<AppState>) -> Json<Vec<InputStatus>> {
    let inputs = state.inputs.read().await;
    Json(inputs.clone())
}

// === Telemetry Endpoints ===

#[derive(Deserialize)]
struct FieldsQuery {
    fields: Option<String>,
}

async fn telemetry_snapshot(
    State(state): State<AppState>,
    Query(query): Query<FieldsQuery>,
) -> Json<serde_json::Value> {
    let mask = query.fields.map(|f| FieldMask::parse(&f));
    let aircraft = state.aircraft.read().await;
    Json(aircraft.to_json_filtered(mask.as_ref()))
}

async fn telemetry_stream(
    State(state): State<AppState>,
    Query(query): Query<FieldsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe();
    let field_mask = query.fields.map(|f| FieldMask::parse(&f));

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let mask = field_mask.clone();
        async move {
            match result {
                Ok(delta) => {
                    let json = delta.to_json_filtered(mask.as_ref());
                    Some(Ok(Event::default().data(json.to_string())))
                }
                Err(e) => {
                    tracing::warn!("Broadcast stream error: {}", e);
                    None
                }
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// === Target Endpoints ===

#[derive(Serialize)]
struct TargetList {
    count: usize,
    ignore_radius: f64,
    targets: Vec<Target>,
    messages: Vec<PayloadMessage>,
}

async fn list_targets(State(state): State<AppState>) -> Json<TargetList> {
    let aircraft = state.aircraft.read().await;
    let set = &aircraft.targets;
    Json(TargetList {
        count: set.count(),
        ignore_radius: set.ignore_radius(),
        targets: set.targets().to_vec(),
        messages: set.messages().cloned().collect(),
    })
}

#[derive(Deserialize)]
struct NearestQuery {
    /// Miles; defaults to the ignore radius
    radius: Option<f64>,
}

async fn nearest_target(
    State(state): State<AppState>,
    Query(query): Query<NearestQuery>,
) -> Result<Json<Target>, (StatusCode, String)> {
    let aircraft = state.aircraft.read().await;
    let radius = query.radius.unwrap_or_else(|| aircraft.targets.ignore_radius());
    aircraft
        .targets
        .get_nearest_within(radius)
        .cloned()
        .map(Json)
        .ok_or((
            StatusCode::NOT_FOUND,
            format!("No target within {} mi", radius),
        ))
}

#[derive(Deserialize)]
struct BuoyRequest {
    #[serde(default = "default_placement")]
    placement: BuoyPlacement,
    /// Miles ahead along ground track
    #[serde(default)]
    distance: f64,
    /// Feet above (or below) own-ship
    #[serde(default)]
    altitude_offset: f64,
    /// mph; -1 means own-ship speed
    speed: Option<f64>,
}

fn default_placement() -> BuoyPlacement {
    BuoyPlacement::Here
}

async fn drop_buoy(
    State(state): State<AppState>,
    Json(request): Json<BuoyRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if request.distance < 0.0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "distance must not be negative".to_string(),
        ));
    }

    let mut aircraft = state.aircraft.write().await;
    let own = aircraft.ownship();
    let buoy = aircraft
        .targets
        .drop_buoy(
            &own,
            request.placement,
            request.distance,
            request.altitude_offset,
            BuoySpeed::from_request(request.speed),
            Utc::now().timestamp(),
        )
        .ok_or((
            StatusCode::CONFLICT,
            "No own-ship position or track to place a buoy".to_string(),
        ))?;

    tracing::info!(buoy = ?buoy.buoy_num, "buoy dropped");
    Ok((StatusCode::CREATED, Json(buoy)))
}

#[derive(Deserialize)]
struct MessageRequest {
    sender_address: Option<u32>,
    sender_callsign: Option<String>,
    recipient_address: Option<u32>,
    text: String,
    /// Unix seconds; defaults to now
    timestamp: Option<i64>,
}

async fn post_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> impl IntoResponse {
    let message = PayloadMessage {
        sender_address: request.sender_address,
        sender_callsign: request.sender_callsign,
        recipient_address: request.recipient_address,
        text: request.text,
        timestamp: request.timestamp.unwrap_or_else(|| Utc::now().timestamp()),
    };
    let mut aircraft = state.aircraft.write().await;
    aircraft.targets.add_payload(message.clone());
    (StatusCode::CREATED, Json(message))
}
