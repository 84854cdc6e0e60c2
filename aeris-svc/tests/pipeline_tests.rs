//! End-to-end pipeline tests: fan-out, fallback, canonicalization, and
//! forecast generation through the service facade.

mod common;

use std::sync::Arc;
use std::time::Duration;

use aeris_common::config::ProviderEndpoint;
use aeris_common::model::{Confidence, GeoQuery, Pollutant, SourceAvailability};
use aeris_common::Error;
use aeris_svc::aqi;
use aeris_svc::clients::{GroundClientA, SatelliteClient, WeatherClient};
use aeris_svc::service::AirQualityService;
use common::{ground_payload, service_with, StaticProvider, StaticWeather};

fn unroutable(timeout_secs: u64) -> ProviderEndpoint {
    ProviderEndpoint {
        base_url: "http://127.0.0.1:1".to_string(),
        api_key: None,
        timeout_secs,
        ttl_minutes: 10,
    }
}

/// All upstreams dark except the satellite mock: the forecast still
/// succeeds, flags its sources, and reports degraded confidence.
#[tokio::test]
async fn deterministic_fallback_keeps_the_forecast_alive() {
    let service = service_with(
        // Real satellite client against an unroutable endpoint: falls
        // back to its deterministic mock.
        Arc::new(SatelliteClient::new(unroutable(1), true).unwrap()),
        // Real EPA-style client, also dark: null fallback.
        Arc::new(GroundClientA::new(unroutable(1)).unwrap()),
        // OpenAQ-style network producing nothing this round.
        Arc::new(StaticProvider::new("OpenAQ", None)),
        // Weather times out too.
        Arc::new(WeatherTimesOut),
        true,
    );

    let query = GeoQuery::new(40.71, -74.01).with_horizon(24);
    let forecast = service.forecast(&query).await.unwrap();

    assert_eq!(forecast.data_sources.satellite, SourceAvailability::Available);
    assert_eq!(forecast.data_sources.ground, SourceAvailability::Unavailable);
    assert_eq!(forecast.data_sources.weather, SourceAvailability::Unavailable);
    assert_eq!(forecast.aqi.len(), 24);

    let snapshot = service.current(&query).await.unwrap();
    assert_eq!(snapshot.data_quality.confidence, Confidence::Medium);
}

struct WeatherTimesOut;

#[async_trait::async_trait]
impl aeris_svc::clients::WeatherProvider for WeatherTimesOut {
    async fn fetch(
        &self,
        _ctx: &aeris_svc::clients::FetchContext,
        _query: &GeoQuery,
    ) -> aeris_common::Result<Option<aeris_common::model::WeatherObservation>> {
        Ok(None)
    }
}

/// The real weather client against a dead endpoint degrades to null.
#[tokio::test]
async fn dead_weather_endpoint_degrades_to_null() {
    let client = WeatherClient::new(unroutable(1)).unwrap();
    let ctx = aeris_svc::clients::FetchContext::detached(Duration::from_secs(2));
    let query = GeoQuery::new(40.71, -74.01);
    assert_eq!(
        aeris_svc::clients::WeatherProvider::fetch(&client, &ctx, &query)
            .await
            .unwrap(),
        None
    );
}

/// Snapshot AQI equals the max per-pollutant AQI.
#[tokio::test]
async fn snapshot_aqi_is_max_over_pollutants() {
    let service = service_with(
        Arc::new(StaticProvider::new("Satellite", None)),
        Arc::new(StaticProvider::new(
            "EPA",
            Some(ground_payload("EPA", "PM2.5", 20.0, "ug/m3")),
        )),
        Arc::new(StaticProvider::new(
            "OpenAQ",
            Some(ground_payload("OpenAQ", "o3", 80.0, "ppb")),
        )),
        Arc::new(StaticWeather(None)),
        true,
    );

    let query = GeoQuery::new(40.71, -74.01);
    let snapshot = service.current(&query).await.unwrap();

    let expected = snapshot
        .pollutants
        .iter()
        .map(|(p, m)| aqi::aqi(*p, m.concentration))
        .max()
        .unwrap();
    assert_eq!(snapshot.aqi, expected);
    // O3 at 80 ppb (AQI 131) dominates PM2.5 at 20 μg/m³ (AQI 68).
    assert_eq!(snapshot.aqi, aqi::aqi(Pollutant::O3, 80.0));
}

/// Concurrent identical queries coalesce into one provider call.
#[tokio::test]
async fn concurrent_queries_share_one_upstream_fetch() {
    // Paused clock keeps the coalescing window open until every task has
    // issued its claim.
    tokio::time::pause();
    let satellite = Arc::new(
        StaticProvider::new("Satellite", None).with_delay(Duration::from_millis(30)),
    );
    let service = Arc::new(service_with(
        satellite.clone(),
        Arc::new(StaticProvider::new("EPA", None)),
        Arc::new(StaticProvider::new(
            "OpenAQ",
            Some(ground_payload("OpenAQ", "pm25", 12.0, "µg/m³")),
        )),
        Arc::new(StaticWeather(None)),
        true,
    ));

    let query = GeoQuery::new(40.71, -74.01);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let service: Arc<AirQualityService> = service.clone();
        handles.push(tokio::spawn(async move {
            service.current(&query).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(satellite.call_count(), 1);
}

/// Within the TTL the same query is answered from cache.
#[tokio::test]
async fn repeat_queries_within_ttl_hit_the_cache() {
    let satellite = Arc::new(StaticProvider::new("Satellite", None));
    let service = service_with(
        satellite.clone(),
        Arc::new(StaticProvider::new("EPA", None)),
        Arc::new(StaticProvider::new(
            "OpenAQ",
            Some(ground_payload("OpenAQ", "pm25", 12.0, "µg/m³")),
        )),
        Arc::new(StaticWeather(None)),
        true,
    );

    let query = GeoQuery::new(40.71, -74.01);
    service.current(&query).await.unwrap();
    service.current(&query).await.unwrap();
    service.forecast(&query).await.unwrap();
    assert_eq!(satellite.call_count(), 1);
}

/// No data anywhere and mocks disabled: the request surfaces unavailable.
#[tokio::test]
async fn no_data_without_mocks_is_unavailable() {
    let service = service_with(
        Arc::new(StaticProvider::new("Satellite", None)),
        Arc::new(StaticProvider::new("EPA", None)),
        Arc::new(StaticProvider::new("OpenAQ", None)),
        Arc::new(StaticWeather(None)),
        false,
    );
    let query = GeoQuery::new(40.71, -74.01);
    assert!(matches!(
        service.current(&query).await,
        Err(Error::Unavailable)
    ));
}

/// Invalid queries are rejected before any provider is contacted.
#[tokio::test]
async fn invalid_query_never_reaches_providers() {
    let satellite = Arc::new(StaticProvider::new("Satellite", None));
    let service = service_with(
        satellite.clone(),
        Arc::new(StaticProvider::new("EPA", None)),
        Arc::new(StaticProvider::new("OpenAQ", None)),
        Arc::new(StaticWeather(None)),
        true,
    );
    let query = GeoQuery::new(40.71, -74.01).with_horizon(96);
    assert!(matches!(
        service.forecast(&query).await,
        Err(Error::BadRequest(_))
    ));
    assert_eq!(satellite.call_count(), 0);
}

/// Requested locations show up in the hot set for the scheduler.
#[tokio::test]
async fn requests_mark_locations_hot() {
    let service = service_with(
        Arc::new(StaticProvider::new("Satellite", None)),
        Arc::new(StaticProvider::new("EPA", None)),
        Arc::new(StaticProvider::new(
            "OpenAQ",
            Some(ground_payload("OpenAQ", "pm25", 12.0, "µg/m³")),
        )),
        Arc::new(StaticWeather(None)),
        true,
    );

    service.current(&GeoQuery::new(40.71, -74.01)).await.unwrap();
    service.current(&GeoQuery::new(34.05, -118.24)).await.unwrap();
    // Same quantized location twice still counts once.
    service.current(&GeoQuery::new(40.7101, -74.0099)).await.unwrap();

    assert_eq!(service.recent_locations().len(), 2);
}

/// Identical inputs and clock produce identical forecasts end to end.
#[tokio::test]
async fn forecast_is_deterministic_for_a_fixed_clock() {
    let service = service_with(
        Arc::new(StaticProvider::new("Satellite", None)),
        Arc::new(StaticProvider::new("EPA", None)),
        Arc::new(StaticProvider::new(
            "OpenAQ",
            Some(ground_payload("OpenAQ", "pm25", 20.0, "µg/m³")),
        )),
        Arc::new(StaticWeather(None)),
        true,
    );
    let query = GeoQuery::new(40.71, -74.01).with_horizon(24);
    let generated_at = chrono::Utc::now();
    let a = service.forecast_at(&query, generated_at).await.unwrap();
    let b = service.forecast_at(&query, generated_at).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

/// Horizon bounds both succeed end to end.
#[tokio::test]
async fn horizon_extremes_succeed() {
    let service = service_with(
        Arc::new(StaticProvider::new("Satellite", None)),
        Arc::new(StaticProvider::new("EPA", None)),
        Arc::new(StaticProvider::new(
            "OpenAQ",
            Some(ground_payload("OpenAQ", "pm25", 12.0, "µg/m³")),
        )),
        Arc::new(StaticWeather(None)),
        true,
    );
    for horizon in [1, 72] {
        let query = GeoQuery::new(40.71, -74.01).with_horizon(horizon);
        let forecast = service.forecast(&query).await.unwrap();
        assert_eq!(forecast.aqi.len(), horizon as usize);
        assert_eq!(forecast.horizon_hours, horizon);
    }
}
