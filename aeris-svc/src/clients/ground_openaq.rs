//! OpenAQ-style ground network client (`GroundClientB`).
//!
//! Queries the latest measurements within a radius of the query point.
//! OpenAQ parameter names are lowercase (`pm25`, `no2`); the canonicalizer
//! resolves them through the alias table. Failures fall back to the
//! deterministic mock.

use aeris_common::config::ProviderEndpoint;
use aeris_common::model::{Coordinates, GeoQuery, Pollutant, Station};
use aeris_common::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use super::{get_json, mock, FetchContext, PollutantProvider, ProviderPayload, RawMeasurement};
use crate::geo;

const SOURCE: &str = "OpenAQ";

/// Pollutants this network reports.
const PARAMETERS: [Pollutant; 6] = [
    Pollutant::Pm25,
    Pollutant::Pm10,
    Pollutant::O3,
    Pollutant::No2,
    Pollutant::So2,
    Pollutant::Co,
];

#[derive(Debug, Deserialize)]
struct LatestResponse {
    results: Vec<LatestResult>,
}

#[derive(Debug, Deserialize)]
struct LatestResult {
    #[serde(rename = "locationId")]
    location_id: i64,
    location: String,
    parameter: String,
    value: f64,
    unit: String,
    coordinates: Option<OpenAqCoordinates>,
    date: OpenAqDate,
}

#[derive(Debug, Deserialize)]
struct OpenAqCoordinates {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OpenAqDate {
    utc: DateTime<Utc>,
}

pub struct GroundClientB {
    http: reqwest::Client,
    endpoint: ProviderEndpoint,
    allow_mock: bool,
}

impl GroundClientB {
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
            "{}/latest?coordinates={:.4},{:.4}&radius={:.0}&limit=1000",
            self.endpoint.base_url,
            query.lat,
            query.lng,
            query.radius_km * 1000.0
        );
        let api_key = self
            .endpoint
            .api_key
            .as_ref()
            .map(|key| ("X-API-Key", key.expose()));
        let response: LatestResponse = get_json(&self.http, ctx, &url, api_key).await?;

        let origin = query.location();
        let mut stations: Vec<Station> = Vec::new();
        let mut measurements = Vec::new();
        for result in response.results {
            if !result.value.is_finite() || result.value < 0.0 {
                continue;
            }
            let coordinates = match result.coordinates {
                Some(OpenAqCoordinates {
                    latitude: Some(lat),
                    longitude: Some(lng),
                }) => Coordinates::new(lat, lng),
                _ => continue,
            };
            let distance_meters = geo::haversine_km(origin, coordinates) * 1000.0;
            let station_id = result.location_id.to_string();
            if !stations.iter().any(|s| s.id == station_id) {
                stations.push(Station {
                    id: station_id.clone(),
                    name: result.location.clone(),
                    lat: coordinates.lat,
                    lng: coordinates.lng,
                    source: SOURCE.to_string(),
                    distance_meters,
                });
            }
            measurements.push(RawMeasurement {
                parameter: result.parameter,
                value: result.value,
                unit: result.unit,
                station_id: Some(station_id),
                observed_at: result.date.utc,
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
impl PollutantProvider for GroundClientB {
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
        let station = mock::mock_station(SOURCE, query);
        let measurements = PARAMETERS
            .into_iter()
            .map(|pollutant| RawMeasurement {
                // OpenAQ spells parameters lowercase.
                parameter: pollutant.as_str().to_ascii_lowercase(),
                value: mock::mock_concentration(pollutant, query, now),
                unit: pollutant.canonical_unit().to_string(),
                station_id: Some(station.id.clone()),
                observed_at: now,
                distance_meters: Some(station.distance_meters),
            })
            .collect();
        Some(ProviderPayload {
            source: SOURCE.to_string(),
            resolution: "station".to_string(),
            from_mock: true,
            stations: vec![station],
            measurements,
        })
    }
}
