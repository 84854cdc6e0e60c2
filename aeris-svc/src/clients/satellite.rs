//! Satellite column-product client.
//!
//! Fetches trace-gas surface estimates (NO2, O3, SO2, HCHO) from a
//! TEMPO-style level-3 product endpoint. Satellite retrievals carry no
//! ground stations; measurements arrive as grid cells with a per-cell
//! surface estimate. Any failure falls back to the deterministic mock.

use aeris_common::config::ProviderEndpoint;
use aeris_common::model::{Coordinates, GeoQuery, Pollutant};
use aeris_common::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use super::{get_json, mock, FetchContext, PollutantProvider, ProviderPayload, RawMeasurement};
use crate::geo;

const SOURCE: &str = "Satellite";
const RESOLUTION: &str = "2.0 km";

/// Pollutants the column product retrieves.
const SPECIES: [Pollutant; 4] = [
    Pollutant::No2,
    Pollutant::O3,
    Pollutant::So2,
    Pollutant::Hcho,
];

#[derive(Debug, Deserialize)]
struct ColumnProductResponse {
    #[allow(dead_code)]
    product: String,
    observed_at: DateTime<Utc>,
    cells: Vec<ColumnCell>,
}

#[derive(Debug, Deserialize)]
struct ColumnCell {
    species: String,
    lat: f64,
    lng: f64,
    surface_estimate: f64,
    unit: String,
}

pub struct SatelliteClient {
    http: reqwest::Client,
    endpoint: ProviderEndpoint,
    allow_mock: bool,
}

impl SatelliteClient {
    pub fn new(endpoint: ProviderEndpoint, allow_mock: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(endpoint.timeout_secs))
            .build()
            .map_err(Error::internal)?;
        Ok(Self {
            http,
            endpoint,
            allow_mock,
        })
    }

    async fn try_fetch(&self, ctx: &FetchContext, query: &GeoQuery) -> Result<ProviderPayload> {
        let url = format!(
            "{}/surface?lat={:.4}&lng={:.4}&radius_km={:.1}",
            self.endpoint.base_url, query.lat, query.lng, query.radius_km
        );
        let api_key = self
            .endpoint
            .api_key
            .as_ref()
            .map(|key| ("X-Api-Key", key.expose()));
        let response: ColumnProductResponse = get_json(&self.http, ctx, &url, api_key).await?;

        let origin = query.location();
        let measurements = response
            .cells
            .into_iter()
            .filter(|cell| cell.surface_estimate.is_finite() && cell.surface_estimate >= 0.0)
            .map(|cell| RawMeasurement {
                parameter: cell.species,
                value: cell.surface_estimate,
                unit: cell.unit,
                station_id: None,
                observed_at: response.observed_at,
                distance_meters: Some(
                    geo::haversine_km(origin, Coordinates::new(cell.lat, cell.lng)) * 1000.0,
                ),
            })
            .collect();

        Ok(ProviderPayload {
            source: SOURCE.to_string(),
            resolution: RESOLUTION.to_string(),
            from_mock: false,
            stations: Vec::new(),
            measurements,
        })
    }
}

#[async_trait]
impl PollutantProvider for SatelliteClient {
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
                warn!(source = SOURCE, error = %err, "upstream failed, using deterministic fallback");
                Ok(self.mock_fetch(query, Utc::now()))
            }
        }
    }

    fn mock_fetch(&self, query: &GeoQuery, now: DateTime<Utc>) -> Option<ProviderPayload> {
        if !self.allow_mock {
            return None;
        }
        let measurements = SPECIES
            .into_iter()
            .map(|pollutant| RawMeasurement {
                parameter: pollutant.as_str().to_string(),
                value: mock::mock_concentration(pollutant, query, now),
                unit: pollutant.canonical_unit().to_string(),
                station_id: None,
                observed_at: now,
                distance_meters: Some(1000.0),
            })
            .collect();
        Some(ProviderPayload {
            source: SOURCE.to_string(),
            resolution: RESOLUTION.to_string(),
            from_mock: true,
            stations: Vec::new(),
            measurements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client(allow_mock: bool) -> SatelliteClient {
        let endpoint = ProviderEndpoint {
            // Unroutable address: forces the fallback path.
            base_url: "http://127.0.0.1:1/v1".to_string(),
            api_key: None,
            timeout_secs: 1,
            ttl_minutes: 15,
        };
        SatelliteClient::new(endpoint, allow_mock).unwrap()
    }

    #[tokio::test]
    async fn transport_failure_falls_back_to_mock() {
        let ctx = FetchContext::detached(Duration::from_secs(2));
        let query = GeoQuery::new(40.71, -74.01);
        let payload = client(true).fetch(&ctx, &query).await.unwrap().unwrap();
        assert!(payload.from_mock);
        assert_eq!(payload.source, "Satellite");
        assert_eq!(payload.measurements.len(), SPECIES.len());
    }

    #[tokio::test]
    async fn fallback_is_null_when_mocks_disallowed() {
        let ctx = FetchContext::detached(Duration::from_secs(2));
        let query = GeoQuery::new(40.71, -74.01);
        assert_eq!(client(false).fetch(&ctx, &query).await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_query_is_reported_not_mocked() {
        let ctx = FetchContext::detached(Duration::from_secs(2));
        let query = GeoQuery::new(95.0, 0.0);
        let err = client(true).fetch(&ctx, &query).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn mock_is_deterministic() {
        let now = Utc::now();
        let query = GeoQuery::new(40.71, -74.01);
        let c = client(true);
        assert_eq!(c.mock_fetch(&query, now), c.mock_fetch(&query, now));
    }
}
