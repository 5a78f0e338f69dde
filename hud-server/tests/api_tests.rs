//! Integration tests for the hud-server HTTP API
//!
//! Uses tower::ServiceExt::oneshot to test routes directly without binding a port.

use axum::body::Body;
use http_body_util::BodyExt;
use hud_adapters::Protocol;
use hud_core::model::{GpsSample, Target};
use hud_core::{DecoderStats, SampleKind, TelemetryUpdate};
use hud_server::{api::create_router, state::AppState};
use hyper::Request;
use tower::ServiceExt;

/// Helper: build a router with fresh AppState (no inputs registered)
fn app() -> axum::Router {
    create_router(AppState::default())
}

/// Helper: build a router with AppState returned for further manipulation
fn app_with_state() -> (axum::Router, AppState) {
    let state = AppState::new(30.0);
    let router = create_router(state.clone());
    (router, state)
}

/// Helper: give the aircraft an own-ship fix
async fn seed_ownship(state: &AppState, lat: f64, lon: f64) {
    let mut aircraft = state.aircraft.write().await;
    let slots = aircraft.register(&[SampleKind::Gps, SampleKind::Traffic]);
    aircraft.apply(
        &slots,
        TelemetryUpdate::Gps(GpsSample {
            lat: Some(lat),
            lon: Some(lon),
            alt: Some(5500.0),
            ground_track: Some(90.0),
            ground_speed: Some(120.0),
            ..Default::default()
        }),
    );
}

/// Helper: collect response body into bytes
async fn body_bytes(body: Body) -> Vec<u8> {
    let collected = body.collect().await.unwrap();
    collected.to_bytes().to_vec()
}

/// Helper: collect response body into parsed JSON
async fn body_json(body: Body) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(body).await).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ==================== GET /api/inputs ====================

#[tokio::test]
async fn test_inputs_empty() {
    let response = app().oneshot(get("/api/inputs")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(body_json(response.into_body()).await, serde_json::json!([]));
}

#[tokio::test]
async fn test_inputs_report_status_and_stats() {
    let (app, state) = app_with_state();
    state
        .register_input("efis", Protocol::G3x, "serial /dev/ttyUSB0 @ 115200".into())
        .await;
    {
        let mut inputs = state.inputs.write().await;
        inputs[0].stats = DecoderStats {
            frames: 12,
            bad: 1,
            ..Default::default()
        };
    }

    let response = app.oneshot(get("/api/inputs")).await.unwrap();
    assert_eq!(response.status(), 200);
    let json = body_json(response.into_body()).await;
    let input = &json[0];
    assert_eq!(input["name"], "efis");
    assert_eq!(input["protocol"], "g3x");
    assert_eq!(input["running"], true);
    assert_eq!(input["stats"]["frames"], 12);
    assert_eq!(input["stats"]["bad"], 1);
    assert!(input.get("must_exit").is_none());
}

// ==================== GET /api/telemetry ====================

#[tokio::test]
async fn test_telemetry_snapshot_groups_collections() {
    let (app, state) = app_with_state();
    seed_ownship(&state, 37.0, -122.0).await;

    let response = app.oneshot(get("/api/telemetry")).await.unwrap();
    assert_eq!(response.status(), 200);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["gps"].as_array().unwrap().len(), 1);
    assert_eq!(json["gps"][0]["lat"], 37.0);
    assert_eq!(json["attitude"], serde_json::json!([]));
    assert_eq!(json["target_count"], 0);
}

#[tokio::test]
async fn test_telemetry_field_filter() {
    let (app, state) = app_with_state();
    seed_ownship(&state, 37.0, -122.0).await;

    let response = app.oneshot(get("/api/telemetry?fields=lat")).await.unwrap();
    assert_eq!(response.status(), 200);
    let json = body_json(response.into_body()).await;
    let gps = json["gps"][0].as_object().unwrap();
    assert!(gps.contains_key("lat"));
    assert!(!gps.contains_key("lon"));
}

// ==================== GET /api/telemetry/stream ====================

#[tokio::test]
async fn test_telemetry_stream_is_sse() {
    let response = app().oneshot(get("/api/telemetry/stream")).await.unwrap();
    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}

// ==================== /api/targets ====================

#[tokio::test]
async fn test_targets_empty() {
    let response = app().oneshot(get("/api/targets")).await.unwrap();
    assert_eq!(response.status(), 200);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["count"], 0);
    assert_eq!(json["ignore_radius"], 30.0);
    assert_eq!(json["targets"], serde_json::json!([]));
}

#[tokio::test]
async fn test_nearest_without_targets_is_404() {
    let response = app().oneshot(get("/api/targets/nearest")).await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_buoy_without_ownship_is_conflict() {
    let response = app()
        .oneshot(post_json(
            "/api/targets/buoy",
            serde_json::json!({ "placement": "here" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn test_buoy_rejects_negative_distance() {
    let (app, state) = app_with_state();
    seed_ownship(&state, 37.0, -122.0).await;

    let response = app
        .oneshot(post_json(
            "/api/targets/buoy",
            serde_json::json!({ "placement": "ahead", "distance": -1.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_buoy_ahead_then_nearest() {
    let (app, state) = app_with_state();
    seed_ownship(&state, 37.0, -122.0).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/targets/buoy",
            serde_json::json!({
                "placement": "ahead",
                "distance": 2.0,
                "altitude_offset": 500.0,
                "speed": -1.0
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let buoy: Target = serde_json::from_slice(&body_bytes(response.into_body()).await).unwrap();
    assert_eq!(buoy.buoy_num, Some(1));
    assert_eq!(buoy.alt, Some(6000.0));
    // own-ship has no airspeed, so ground speed is used
    assert_eq!(buoy.speed, Some(120.0));
    // due east of own-ship
    assert!(buoy.lon.unwrap() > -122.0);
    assert!((buoy.lat.unwrap() - 37.0).abs() < 0.01);

    let response = app
        .clone()
        .oneshot(get("/api/targets/nearest?radius=5"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let nearest: Target = serde_json::from_slice(&body_bytes(response.into_body()).await).unwrap();
    assert_eq!(nearest.buoy_num, Some(1));
    assert!((nearest.distance.unwrap() - 2.0).abs() < 0.05);

    let response = app
        .oneshot(get("/api/targets/nearest?radius=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    assert_eq!(state.aircraft.read().await.targets.count(), 1);
}

#[tokio::test]
async fn test_post_message_attaches_to_recipient() {
    let (app, state) = app_with_state();
    seed_ownship(&state, 37.0, -122.0).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/targets/buoy",
            serde_json::json!({ "placement": "here" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/targets/messages",
            serde_json::json!({
                "sender_address": 42,
                "sender_callsign": "N123AB",
                "recipient_address": 1,
                "text": "turning base"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let json = body_json(response.into_body()).await;
    assert!(json["timestamp"].as_i64().unwrap() > 0);

    let response = app.oneshot(get("/api/targets")).await.unwrap();
    let json = body_json(response.into_body()).await;
    assert_eq!(json["messages"][0]["text"], "turning base");
    assert_eq!(json["targets"][0]["last_payload"]["sender_callsign"], "N123AB");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let response = app().oneshot(get("/api/nope")).await.unwrap();
    assert_eq!(response.status(), 404);
}
