//! Convergence HTTP Server.
//!
//! Read-mostly endpoints over the scoring loops' caches, plus event ingestion
//! and on-demand refresh triggers. Handlers never block on a refresh.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::domain::models::{ConvergencePayload, OrientResult};
use crate::services::{LoopHandle, LoopStatus, RefreshOutcome};

/// Configuration for the convergence HTTP server.
#[derive(Debug, Clone)]
pub struct ConvergenceHttpConfig {
    pub bind: SocketAddr,
}

impl Default for ConvergenceHttpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8089)),
        }
    }
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Health response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
}

/// Event ingestion request. Without `times`, one event is recorded now.
#[derive(Debug, Default, Deserialize)]
pub struct RecordEventsRequest {
    #[serde(default)]
    pub times: Option<Vec<f64>>,
}

/// Event ingestion response.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordEventsResponse {
    pub accepted: usize,
    pub dropped: usize,
}

/// Loop handles addressable by session key.
#[derive(Clone, Default)]
pub struct QueryState {
    sessions: Arc<HashMap<String, LoopHandle>>,
}

impl QueryState {
    pub fn new(handles: impl IntoIterator<Item = LoopHandle>) -> Self {
        let sessions = handles
            .into_iter()
            .map(|handle| (handle.key().to_string(), handle))
            .collect();
        Self {
            sessions: Arc::new(sessions),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn session(&self, key: &str) -> Result<&LoopHandle, ApiError> {
        self.sessions.get(key).ok_or_else(|| {
            error(
                StatusCode::NOT_FOUND,
                "UNKNOWN_KEY",
                format!("Unknown scoring session: {key}"),
            )
        })
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, code: &str, message: String) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message,
            code: code.to_string(),
        }),
    )
}

/// Build the router.
pub fn build_router(state: QueryState) -> Router {
    Router::new()
        .route("/convergence/semantic/{key}", get(get_semantic))
        .route("/convergence/orient/{key}", get(get_orient))
        .route("/convergence/status/{key}", get(get_status))
        .route("/convergence/events/{key}", post(record_events))
        .route("/convergence/refresh/{key}", post(request_refresh))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Convergence HTTP Server.
pub struct ConvergenceHttpServer {
    config: ConvergenceHttpConfig,
    state: QueryState,
}

impl ConvergenceHttpServer {
    pub fn new(state: QueryState, config: ConvergenceHttpConfig) -> Self {
        Self { config, state }
    }

    /// Start the server with a shutdown signal.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind)
            .await
            .with_context(|| format!("failed to bind {}", self.config.bind))?;
        let local = listener.local_addr()?;
        tracing::info!(
            addr = %local,
            sessions = self.state.len(),
            "convergence HTTP server listening"
        );

        axum::serve(listener, build_router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server failed")?;
        Ok(())
    }
}

// Handler functions

async fn health_check(State(state): State<QueryState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        sessions: state.len(),
    })
}

async fn get_semantic(
    State(state): State<QueryState>,
    Path(key): Path<String>,
) -> Result<Json<ConvergencePayload>, ApiError> {
    let snapshot = state.session(&key)?.semantic();
    if let Some(payload) = snapshot.payload {
        return Ok(Json(payload.as_ref().clone()));
    }

    Err(match snapshot.last_refresh {
        RefreshOutcome::TimedOut => error(
            StatusCode::REQUEST_TIMEOUT,
            "REFRESH_TIMED_OUT",
            format!("Semantic refresh for {key} timed out and no payload exists"),
        ),
        RefreshOutcome::Failed(reason) => error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "REFRESH_FAILED",
            format!("Semantic refresh for {key} failed: {reason}"),
        ),
        RefreshOutcome::Pending | RefreshOutcome::Succeeded => error(
            StatusCode::NOT_FOUND,
            "NO_PAYLOAD",
            format!("No semantic payload produced yet for {key}"),
        ),
    })
}

async fn get_orient(
    State(state): State<QueryState>,
    Path(key): Path<String>,
) -> Result<Json<OrientResult>, ApiError> {
    state.session(&key)?.latest_orient().map(Json).ok_or_else(|| {
        error(
            StatusCode::NOT_FOUND,
            "NO_DECISION",
            format!("No decision produced yet for {key}"),
        )
    })
}

async fn get_status(
    State(state): State<QueryState>,
    Path(key): Path<String>,
) -> Result<Json<LoopStatus>, ApiError> {
    Ok(Json(state.session(&key)?.status()))
}

async fn record_events(
    State(state): State<QueryState>,
    Path(key): Path<String>,
    body: Option<Json<RecordEventsRequest>>,
) -> Result<(StatusCode, Json<RecordEventsResponse>), ApiError> {
    let events = state.session(&key)?.events();
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let outcomes: Vec<bool> = match request.times {
        Some(times) => times.into_iter().map(|t| events.record(t)).collect(),
        None => vec![events.record_now()],
    };
    let accepted = outcomes.iter().filter(|&&ok| ok).count();

    Ok((
        StatusCode::ACCEPTED,
        Json(RecordEventsResponse {
            accepted,
            dropped: outcomes.len() - accepted,
        }),
    ))
}

async fn request_refresh(
    State(state): State<QueryState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.session(&key)?.request_refresh();
    Ok(StatusCode::ACCEPTED)
}
