//! Shared fixtures for integration tests: fake providers wired through
//! the same constructors production uses.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aeris_common::model::{GeoQuery, WeatherObservation};
use aeris_common::Result;
use aeris_svc::clients::{
    FetchContext, PollutantProvider, ProviderPayload, RawMeasurement, WeatherProvider,
};
use aeris_svc::service::{AirQualityService, CachePolicy, ProviderSet};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// Pollutant provider that returns a fixed payload and counts its calls.
pub struct StaticProvider {
    source: &'static str,
    payload: Option<ProviderPayload>,
    pub calls: AtomicUsize,
    delay: Duration,
}

impl StaticProvider {
    pub fn new(source: &'static str, payload: Option<ProviderPayload>) -> Self {
        Self {
            source,
            payload,
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PollutantProvider for StaticProvider {
    fn source(&self) -> &'static str {
        self.source
    }

    async fn fetch(
        &self,
        _ctx: &FetchContext,
        query: &GeoQuery,
    ) -> Result<Option<ProviderPayload>> {
        query.validate()?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.payload.clone())
    }

    fn mock_fetch(&self, _query: &GeoQuery, _now: DateTime<Utc>) -> Option<ProviderPayload> {
        self.payload.clone()
    }
}

/// Weather provider returning a fixed observation.
pub struct StaticWeather(pub Option<WeatherObservation>);

#[async_trait]
impl WeatherProvider for StaticWeather {
    async fn fetch(
        &self,
        _ctx: &FetchContext,
        query: &GeoQuery,
    ) -> Result<Option<WeatherObservation>> {
        query.validate()?;
        Ok(self.0.clone())
    }
}

pub fn ground_payload(source: &str, parameter: &str, value: f64, unit: &str) -> ProviderPayload {
    ProviderPayload {
        source: source.to_string(),
        resolution: "station".to_string(),
        from_mock: false,
        stations: Vec::new(),
        measurements: vec![RawMeasurement {
            parameter: parameter.to_string(),
            value,
            unit: unit.to_string(),
            station_id: Some("it-station".to_string()),
            observed_at: Utc::now(),
            distance_meters: Some(1500.0),
        }],
    }
}

pub fn fast_policy() -> CachePolicy {
    CachePolicy {
        satellite_ttl: Duration::from_secs(900),
        ground_a_ttl: Duration::from_secs(600),
        ground_b_ttl: Duration::from_secs(600),
        weather_ttl: Duration::from_secs(1800),
        satellite_timeout: Duration::from_secs(2),
        ground_a_timeout: Duration::from_secs(2),
        ground_b_timeout: Duration::from_secs(2),
        weather_timeout: Duration::from_secs(2),
    }
}

pub fn service_with(
    satellite: Arc<dyn PollutantProvider>,
    ground_a: Arc<dyn PollutantProvider>,
    ground_b: Arc<dyn PollutantProvider>,
    weather: Arc<dyn WeatherProvider>,
    allow_mock: bool,
) -> AirQualityService {
    let (_tx, rx) = watch::channel(false);
    AirQualityService::new(
        ProviderSet {
            satellite,
            ground_a,
            ground_b,
            weather,
        },
        fast_policy(),
        allow_mock,
        rx,
    )
}
