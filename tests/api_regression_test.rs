//! HTTP surface regression tests.
//!
//! Each test drives the router in-process with `tower::ServiceExt::oneshot`.
//! Loops are built but not spawned unless a test needs the fast path, and
//! refreshes run directly through the refresher so cache state is exact.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use convergence_engine::adapters::http::{build_router, QueryState};
use convergence_engine::domain::errors::DomainResult;
use convergence_engine::domain::models::{Config, Fragment};
use convergence_engine::domain::ports::EmbeddingProvider;
use convergence_engine::infrastructure::audit::NullSink;
use convergence_engine::infrastructure::collaborators::InMemoryCollaborator;
use convergence_engine::services::{Collaborators, RefreshOutcome, ScoringLoop};

const KEY: &str = "alpha";

struct HangingProvider;

#[async_trait]
impl EmbeddingProvider for HangingProvider {
    async fn fragments(&self, _key: &str) -> DomainResult<Vec<Fragment>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

async fn seeded_memory() -> Arc<InMemoryCollaborator> {
    let memory = InMemoryCollaborator::new();
    memory
        .set_fragments(
            KEY,
            vec![
                Fragment::new("f0", vec![1.0, 0.0, 0.0], 0.9),
                Fragment::new("f1", vec![0.0, 1.0, 0.0], 0.8),
                Fragment::new("f3", vec![0.0, 0.0, 1.0], 0.95),
            ],
        )
        .await;
    memory.push_observations(KEY, [2, 2, 2]).await;
    Arc::new(memory)
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.scoring_loop.refresh_timeout_ms = 100;
    config
}

fn build_loop(
    embeddings: Arc<dyn EmbeddingProvider>,
    memory: Arc<InMemoryCollaborator>,
) -> ScoringLoop {
    ScoringLoop::new(
        KEY,
        &test_config(),
        Collaborators {
            embeddings,
            observations: memory,
            sink: Arc::new(NullSink),
        },
    )
    .unwrap()
}

async fn send(state: &QueryState, request: Request<Body>) -> (StatusCode, Value) {
    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_session_count() {
    let memory = seeded_memory().await;
    let scoring_loop = build_loop(memory.clone(), memory);
    let state = QueryState::new([scoring_loop.handle()]);

    let (status, body) = send(&state, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 1);
}

#[tokio::test]
async fn test_unknown_key_is_not_found() {
    let state = QueryState::default();

    for uri in [
        "/convergence/semantic/missing",
        "/convergence/orient/missing",
        "/convergence/status/missing",
    ] {
        let (status, body) = send(&state, get(uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["code"], "UNKNOWN_KEY");
    }
}

#[tokio::test]
async fn test_semantic_before_first_refresh_is_not_found() {
    let memory = seeded_memory().await;
    let scoring_loop = build_loop(memory.clone(), memory);
    let state = QueryState::new([scoring_loop.handle()]);

    let (status, body) = send(&state, get("/convergence/semantic/alpha")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NO_PAYLOAD");

    let (status, body) = send(&state, get("/convergence/orient/alpha")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NO_DECISION");
}

#[tokio::test]
async fn test_semantic_returns_payload_after_refresh() {
    let memory = seeded_memory().await;
    let scoring_loop = build_loop(memory.clone(), memory);
    assert_eq!(
        scoring_loop.refresher().refresh_once().await,
        RefreshOutcome::Succeeded
    );
    let state = QueryState::new([scoring_loop.handle()]);

    let (status, body) = send(&state, get("/convergence/semantic/alpha")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matroid_rank_current"], 3);
    assert_eq!(body["matroid_rank_delta"], 0);
    assert_eq!(body["estimated_adversary_phase"], "execution");
    assert_eq!(body["secondary_hash"].as_str().unwrap().len(), 64);
    let score = body["semantic_score"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&score));
}

#[tokio::test]
async fn test_timed_out_refresh_without_payload() {
    let memory = seeded_memory().await;
    let scoring_loop = build_loop(Arc::new(HangingProvider), memory);
    assert_eq!(
        scoring_loop.refresher().refresh_once().await,
        RefreshOutcome::TimedOut
    );
    let state = QueryState::new([scoring_loop.handle()]);

    let (status, body) = send(&state, get("/convergence/semantic/alpha")).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body["code"], "REFRESH_TIMED_OUT");

    let (status, body) = send(&state, get("/convergence/status/alpha")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["refresh_timeouts"], 1);
    assert_eq!(body["last_refresh"], "timed_out");
    assert_eq!(body["running"], false);
}

#[tokio::test]
async fn test_failed_refresh_without_payload() {
    // Strict collaborator rejects keys it was never seeded with
    let memory = Arc::new(InMemoryCollaborator::new().strict());
    let scoring_loop = build_loop(memory.clone(), memory);
    assert!(matches!(
        scoring_loop.refresher().refresh_once().await,
        RefreshOutcome::Failed(_)
    ));
    let state = QueryState::new([scoring_loop.handle()]);

    let (status, body) = send(&state, get("/convergence/semantic/alpha")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "REFRESH_FAILED");
}

#[tokio::test]
async fn test_record_events_accepts_times() {
    let memory = seeded_memory().await;
    let scoring_loop = build_loop(memory.clone(), memory);
    let state = QueryState::new([scoring_loop.handle()]);

    let (status, body) = send(
        &state,
        post_json(
            "/convergence/events/alpha",
            &serde_json::json!({ "times": [0.5, 0.75, 1.0] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], 3);
    assert_eq!(body["dropped"], 0);
}

#[tokio::test]
async fn test_record_events_without_body_records_one() {
    let memory = seeded_memory().await;
    let scoring_loop = build_loop(memory.clone(), memory);
    let state = QueryState::new([scoring_loop.handle()]);

    let request = Request::builder()
        .method("POST")
        .uri("/convergence/events/alpha")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&state, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], 1);
}

#[tokio::test]
async fn test_refresh_trigger_publishes_through_running_loop() {
    let memory = seeded_memory().await;
    let mut config = test_config();
    config.scoring_loop.tick_interval_ms = 1;
    config.scoring_loop.refresh_interval_ms = 60_000;
    config.scoring_loop.refresh_timeout_ms = 1_000;
    let running = ScoringLoop::new(
        KEY,
        &config,
        Collaborators {
            embeddings: memory.clone(),
            observations: memory,
            sink: Arc::new(NullSink),
        },
    )
    .unwrap()
    .spawn();
    let handle = running.handle().clone();
    let state = QueryState::new([handle.clone()]);

    let mut rx = handle.subscribe_semantic();
    let (status, _) = send(
        &state,
        Request::builder()
            .method("POST")
            .uri("/convergence/refresh/alpha")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.generation >= 1))
        .await
        .expect("refresh did not complete")
        .unwrap();

    let (status, body) = send(&state, get("/convergence/orient/alpha")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["h1"].as_f64().unwrap() >= 0.0);

    running.shutdown().await;
}
