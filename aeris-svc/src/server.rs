//! HTTP server wiring for the AERIS daemon.

use std::sync::Arc;
use std::time::Duration;

use aeris_common::{Error, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post, put};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

use crate::api;
use crate::bus::PushBus;
use crate::dispatch::AlertDispatcher;
use crate::service::AirQualityService;
use crate::subscription::SubscriptionRegistry;

/// Application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AirQualityService>,
    pub registry: Arc<SubscriptionRegistry>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub bus: Arc<PushBus>,
    pub request_deadline: Duration,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Bound a service call by the overall request deadline. A request
    /// never hangs past it; expiry surfaces as unavailable rather than a
    /// hang.
    pub async fn with_deadline<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.request_deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Unavailable),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/api/air-quality/current", get(api::air_quality::current))
        .route("/api/air-quality/forecast", get(api::air_quality::forecast))
        .route(
            "/api/air-quality/forecast/pollutant",
            get(api::air_quality::pollutant_forecast),
        )
        .route(
            "/api/air-quality/forecast/aqi",
            get(api::air_quality::aqi_forecast),
        )
        .route("/api/subscriptions", post(api::subscriptions::subscribe))
        .route(
            "/api/subscriptions/:id",
            delete(api::subscriptions::unsubscribe),
        )
        .route(
            "/api/subscriptions/:id/prefs",
            put(api::subscriptions::update_prefs),
        )
        .route(
            "/api/subscriptions/:id/history",
            get(api::subscriptions::history),
        )
        .route(
            "/api/subscriptions/:id/test",
            post(api::subscriptions::test_alert),
        )
        .route("/api/events", get(api::sse::location_events))
        .route("/api/events/user/:id", get(api::sse::user_events))
        .with_state(state)
}

/// Start the HTTP server; returns when shutdown is signalled.
pub async fn start(
    bind_addr: &str,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("HTTP server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    Ok(())
}

/// Health check endpoint
async fn health() -> StatusCode {
    StatusCode::OK
}

/// Status endpoint
async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "aeris-svc",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
        "subscribers": state.registry.len().await,
        "cached_entries": state.service.cached_entries(),
        "push_clients": state.bus.client_count(),
    }))
}
