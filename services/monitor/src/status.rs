//! HTTP status routes.
//!
//! Read-only views over plugin state: discovered topics and consumers from
//! the event log, and the current lag snapshot.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use offwatch_id::{ConsumerGroupId, TopicName};
use offwatch_plugin::LagEntry;
use serde::Serialize;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::plugins::{EventLogPlugin, LagReportPlugin};

/// Router state. Cheap to clone.
#[derive(Clone)]
pub struct StatusState {
    inner: Arc<StatusInner>,
}

struct StatusInner {
    event_log: Arc<EventLogPlugin>,
    lag_report: Arc<LagReportPlugin>,
}

impl StatusState {
    pub fn new(event_log: Arc<EventLogPlugin>, lag_report: Arc<LagReportPlugin>) -> Self {
        Self {
            inner: Arc::new(StatusInner {
                event_log,
                lag_report,
            }),
        }
    }

    pub fn event_log(&self) -> &EventLogPlugin {
        &self.inner.event_log
    }

    pub fn lag_report(&self) -> &LagReportPlugin {
        &self.inner.lag_report
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    /// Current timestamp (RFC 3339).
    pub timestamp: String,
    /// False until the plugins have been launched against the store.
    pub launched: bool,
}

/// Create the status router.
pub fn create_router(state: StatusState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/topics", get(topics))
        .route("/consumers", get(consumers))
        .route("/lag", get(lag))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz(State(state): State<StatusState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "offwatch".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        launched: state.event_log().is_launched(),
    })
}

async fn topics(State(state): State<StatusState>) -> Json<Vec<TopicName>> {
    Json(state.event_log().log().topics())
}

async fn consumers(State(state): State<StatusState>) -> Json<Vec<ConsumerGroupId>> {
    Json(state.event_log().log().consumers())
}

async fn lag(State(state): State<StatusState>) -> Json<Vec<LagEntry>> {
    Json(state.lag_report().snapshot())
}

/// Serve the status routes until shutdown is signalled.
pub async fn serve(
    addr: SocketAddr,
    state: StatusState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind status server to {addr}"))?;
    info!(addr = %addr, "Status server listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await
        .context("Status server failed")?;

    info!("Status server stopped");
    Ok(())
}
