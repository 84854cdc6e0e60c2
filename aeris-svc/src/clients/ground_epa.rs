//! EPA AirNow-style ground network client (`GroundClientA`).
//!
//! Queries current observations by lat/lng and converts the agency's
//! PascalCase payload into raw measurements. This network has no
//! deterministic fallback: on failure it yields null and the merge simply
//! skips it.

use aeris_common::config::ProviderEndpoint;
use aeris_common::model::{Coordinates, GeoQuery, Station};
use aeris_common::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use super::{get_json, FetchContext, PollutantProvider, ProviderPayload, RawMeasurement};
use crate::geo;

const SOURCE: &str = "EPA";

#[derive(Debug, Deserialize)]
struct AirNowObservation {
    #[serde(rename = "Latitude")]
    latitude: f64,
    #[serde(rename = "Longitude")]
    longitude: f64,
    #[serde(rename = "ParameterName")]
    parameter_name: String,
    #[serde(rename = "Concentration")]
    concentration: f64,
    #[serde(rename = "Unit")]
    unit: String,
    #[serde(rename = "SiteName")]
    site_name: String,
    #[serde(rename = "AgencyName")]
    #[allow(dead_code)]
    agency_name: Option<String>,
    #[serde(rename = "UTC")]
    utc: Option<DateTime<Utc>>,
}

pub struct GroundClientA {
    http: reqwest::Client,
    endpoint: ProviderEndpoint,
}

impl GroundClientA {
    pub fn new(endpoint: ProviderEndpoint) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(endpoint.timeout_secs))
            .build()
            .map_err(Error::internal)?;
        Ok(Self { http, endpoint })
    }

    async fn try_fetch(&self, ctx: &FetchContext, query: &GeoQuery) -> Result<ProviderPayload> {
        let mut url = format!(
            "{}/observation/latLong/current?format=application/json&latitude={:.4}&longitude={:.4}&distance={:.0}",
            self.endpoint.base_url, query.lat, query.lng, query.radius_km
        );
        if let Some(key) = &self.endpoint.api_key {
            url.push_str(&format!("&API_KEY={}", key.expose()));
        }
        let observations: Vec<AirNowObservation> = get_json(&self.http, ctx, &url, None).await?;

        let origin = query.location();
        let mut stations: Vec<Station> = Vec::new();
        let mut measurements = Vec::new();
        for obs in observations {
            if !obs.concentration.is_finite() || obs.concentration < 0.0 {
                continue;
            }
            let distance_meters =
                geo::haversine_km(origin, Coordinates::new(obs.latitude, obs.longitude)) * 1000.0;
            if !stations.iter().any(|s| s.id == obs.site_name) {
                stations.push(Station {
                    id: obs.site_name.clone(),
                    name: obs.site_name.clone(),
                    lat: obs.latitude,
                    lng: obs.longitude,
                    source: SOURCE.to_string(),
                    distance_meters,
                });
            }
            measurements.push(RawMeasurement {
                parameter: obs.parameter_name,
                value: obs.concentration,
                unit: obs.unit,
                station_id: Some(obs.site_name),
                observed_at: obs.utc.unwrap_or_else(Utc::now),
                distance_meters: Some(distance_meters),
            });
        }

        Ok(ProviderPayload {
            source: SOURCE.to_string(),
            resolution: "station".to_string(),
            from_mock: false,
            stations,
            measurements,
        })
    }
}

#[async_trait]
impl PollutantProvider for GroundClientA {
    fn source(&self) -> &'static str {
        SOURCE
    }

    async fn fetch(
        &self,
        ctx: &FetchContext,
        query: &GeoQuery,
    ) -> Result<Option<ProviderPayload>> {
        query.validate()?;
        match self.try_fetch(ctx, query).await {
            Ok(payload) => Ok(Some(payload)),
            Err(err @ Error::BadRequest(_)) | Err(err @ Error::Internal(_)) => Err(err),
            Err(err) => {
                warn!(source = SOURCE, error = %err, "upstream failed, skipping in merge");
                Ok(None)
            }
        }
    }

    /// This network is skipped rather than mocked when it fails.
    fn mock_fetch(&self, _query: &GeoQuery, _now: DateTime<Utc>) -> Option<ProviderPayload> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client() -> GroundClientA {
        GroundClientA::new(ProviderEndpoint {
            base_url: "http://127.0.0.1:1/aq".to_string(),
            api_key: None,
            timeout_secs: 1,
            ttl_minutes: 10,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn failure_yields_null_not_mock() {
        let ctx = FetchContext::detached(Duration::from_secs(2));
        let query = GeoQuery::new(40.71, -74.01);
        assert_eq!(client().fetch(&ctx, &query).await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_query_is_reported() {
        let ctx = FetchContext::detached(Duration::from_secs(2));
        let query = GeoQuery::new(40.71, -74.01).with_radius(250.0);
        assert!(matches!(
            client().fetch(&ctx, &query).await,
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn airnow_payload_parses() {
        let raw = r#"[{
            "Latitude": 40.72,
            "Longitude": -74.0,
            "ParameterName": "PM2.5",
            "Concentration": 15.0,
            "Unit": "UG/M3",
            "SiteName": "Newark Firehouse",
            "AgencyName": "NJDEP",
            "UTC": "2026-08-01T12:00:00Z"
        }]"#;
        let observations: Vec<AirNowObservation> = serde_json::from_str(raw).unwrap();
        assert_eq!(observations[0].parameter_name, "PM2.5");
        assert_eq!(observations[0].concentration, 15.0);
    }
}
