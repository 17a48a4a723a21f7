//! End-to-end scenario
//!
//! Ingest a track, store a 1800-sample EDA recording, and run inference,
//! all through the HTTP surface. Only the external collaborators (fetcher,
//! extractor, model weights) are stubbed; store, pipeline, DSP, and tensor
//! assembly are real.

mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use helpers::*;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn request(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_ingest_then_predict_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(CountingModel::new(0.42, -0.17));
    let state = build_state(
        engine_config(dir.path()),
        Arc::new(StubFetcher::new(source_audio_fixture(2.0))),
        Arc::new(StubExtractor),
        Arc::new(StubLoader::new(model.clone())),
    );
    let app = musemo_engine::build_router(state);

    // Ingest: every stage completes
    let (status, body) = request(
        &app,
        "POST",
        "/ingest",
        Some(json!({"track_id": "abc", "source_url": "http://cdn.fixtures.local/abc.mp3"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "track_id": "abc",
            "mp3": true,
            "wav": true,
            "spectrogram": true,
            "features": true,
        })
    );

    // Store a 1800-sample EDA recording for u1
    let arousal: Vec<f32> = (0..1800).map(|i| (i as f32 * 0.01).sin()).collect();
    let valence: Vec<f32> = (0..1800).map(|i| (i as f32 * 0.02).cos()).collect();
    let (status, body) = request(
        &app,
        "PUT",
        "/tracks/abc/eda/u1",
        Some(json!({"arousal": arousal, "valence": valence})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], true);

    // Predict: gathered modalities, resampled biosignal, one forward pass
    let (status, body) = request(
        &app,
        "POST",
        "/predict",
        Some(json!({"track_id": "abc", "user_id": "u1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["track_id"], "abc");
    assert!((body["arousal"].as_f64().unwrap() - 0.42).abs() < 1e-6);
    assert!((body["valence"].as_f64().unwrap() + 0.17).abs() < 1e-6);
    assert_eq!(model.invocations(), 1);

    // Re-ingest is idempotent and leaves no duplicates
    let (status, body) = request(
        &app,
        "POST",
        "/ingest",
        Some(json!({"track_id": "abc", "source_url": "http://cdn.fixtures.local/abc.mp3"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mp3"], true);
    assert_eq!(body["features"], true);

    let (status, body) = request(&app, "GET", "/tracks/abc/artifacts", None).await;
    assert_eq!(status, StatusCode::OK);
    // Four track-scoped artifacts plus the user's EDA recording
    assert_eq!(body.as_array().unwrap().len(), 5);
}
