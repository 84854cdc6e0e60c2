//! Upstream provider clients.
//!
//! One client per external provider, each behind a capability trait so the
//! construction graph can substitute fakes in tests. Every client follows
//! the same contract: validate before dispatch, honor the context
//! deadline, and absorb transport/parse failures into its configured
//! fallback (deterministic mock or null) rather than propagating them.

pub mod ground_epa;
pub mod ground_openaq;
pub mod mock;
pub mod satellite;
pub mod weather;

use std::time::Duration;

use aeris_common::model::{GeoQuery, Station, WeatherObservation};
use aeris_common::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::time::Instant;

pub use ground_epa::GroundClientA;
pub use ground_openaq::GroundClientB;
pub use satellite::SatelliteClient;
pub use weather::WeatherClient;

/// Cancellation-aware deadline context handed to every fetch.
///
/// Cancellation is cooperative: clients check the shutdown channel at
/// their suspension points (the HTTP round-trip).
#[derive(Debug, Clone)]
pub struct FetchContext {
    deadline: Instant,
    shutdown: watch::Receiver<bool>,
}

impl FetchContext {
    pub fn new(timeout: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            shutdown,
        }
    }

    /// Context that is never cancelled externally; used by tests.
    pub fn detached(timeout: Duration) -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new_with_deadline(Instant::now() + timeout, rx)
    }

    pub fn new_with_deadline(deadline: Instant, shutdown: watch::Receiver<bool>) -> Self {
        Self { deadline, shutdown }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run a future against the deadline and the shutdown signal. Both
    /// expiry and cancellation surface as [`Error::Timeout`] so the
    /// per-client fallback policy applies uniformly.
    pub async fn run<T>(&self, fut: impl std::future::Future<Output = T>) -> Result<T> {
        if self.is_cancelled() {
            return Err(Error::Timeout);
        }
        tokio::select! {
            out = fut => Ok(out),
            _ = tokio::time::sleep_until(self.deadline) => Err(Error::Timeout),
            _ = cancelled(self.shutdown.clone()) => Err(Error::Timeout),
        }
    }
}

/// Resolves only when a cancel is actually signalled. A closed channel
/// (sender dropped without signalling) counts as never-cancelled.
async fn cancelled(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// A raw measurement as reported by a provider, before alias and unit
/// normalization. Pollutant names stay provider-shaped here; the
/// canonicalizer resolves them.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMeasurement {
    pub parameter: String,
    pub value: f64,
    pub unit: String,
    pub station_id: Option<String>,
    pub observed_at: DateTime<Utc>,
    pub distance_meters: Option<f64>,
}

/// Parsed output of one pollutant provider for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPayload {
    pub source: String,
    pub resolution: String,
    pub from_mock: bool,
    pub stations: Vec<Station>,
    pub measurements: Vec<RawMeasurement>,
}

/// Capability interface for the three pollutant providers.
#[async_trait]
pub trait PollutantProvider: Send + Sync {
    /// Canonical source name, e.g. `"EPA"` or `"OpenAQ"`.
    fn source(&self) -> &'static str;

    /// Fetch measurements near the query point.
    ///
    /// `Ok(None)` means the provider produced nothing and its fallback is
    /// null; `Err` is reserved for programmer errors (invalid query).
    async fn fetch(&self, ctx: &FetchContext, query: &GeoQuery)
        -> Result<Option<ProviderPayload>>;

    /// Deterministic fallback payload, `None` for null-fallback clients.
    fn mock_fetch(&self, query: &GeoQuery, now: DateTime<Utc>) -> Option<ProviderPayload>;
}

/// Capability interface for the weather provider.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch(
        &self,
        ctx: &FetchContext,
        query: &GeoQuery,
    ) -> Result<Option<WeatherObservation>>;
}

/// Shared GET-and-parse helper. Maps transport errors and non-2xx to
/// [`Error::Upstream`], deadline expiry to [`Error::Timeout`]; callers
/// convert those into their fallback.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    ctx: &FetchContext,
    url: &str,
    api_key_header: Option<(&str, &str)>,
) -> Result<T> {
    let mut request = client.get(url);
    if let Some((header, key)) = api_key_header {
        request = request.header(header, key);
    }

    let response = ctx
        .run(request.send())
        .await?
        .map_err(|e| {
            if e.is_timeout() {
                Error::Timeout
            } else {
                Error::upstream(e)
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Upstream(format!("status {status}")));
    }

    ctx.run(response.json::<T>())
        .await?
        .map_err(|e| Error::Upstream(format!("parse failure: {e}")))
}
