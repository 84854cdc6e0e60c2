//! Weather provider client.
//!
//! Fetches the current observation from an OpenWeather-style endpoint.
//! Weather is an enrichment input: on any failure the client yields null
//! and the forecast proceeds without it.

use aeris_common::config::ProviderEndpoint;
use aeris_common::model::{GeoQuery, WeatherObservation};
use aeris_common::{Error, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::warn;

use super::{get_json, FetchContext, WeatherProvider};

#[derive(Debug, Deserialize)]
struct CurrentWeatherResponse {
    main: WeatherMain,
    wind: WeatherWind,
    clouds: WeatherClouds,
    /// Observation time, unix seconds.
    dt: i64,
}

#[derive(Debug, Deserialize)]
struct WeatherMain {
    temp: f64,
    humidity: f64,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct WeatherWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct WeatherClouds {
    all: f64,
}

pub struct WeatherClient {
    http: reqwest::Client,
    endpoint: ProviderEndpoint,
}

impl WeatherClient {
    pub fn new(endpoint: ProviderEndpoint) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(endpoint.timeout_secs))
            .build()
            .map_err(Error::internal)?;
        Ok(Self { http, endpoint })
    }

    async fn try_fetch(&self, ctx: &FetchContext, query: &GeoQuery) -> Result<WeatherObservation> {
        let mut url = format!(
            "{}/weather?lat={:.4}&lon={:.4}&units=metric",
            self.endpoint.base_url, query.lat, query.lng
        );
        if let Some(key) = &self.endpoint.api_key {
            url.push_str(&format!("&appid={}", key.expose()));
        }
        let response: CurrentWeatherResponse = get_json(&self.http, ctx, &url, None).await?;

        let observed_at = Utc
            .timestamp_opt(response.dt, 0)
            .single()
            .ok_or_else(|| Error::Upstream(format!("bad observation time {}", response.dt)))?;
        Ok(WeatherObservation {
            temperature_c: response.main.temp,
            humidity_pct: response.main.humidity,
            wind_speed_ms: response.wind.speed,
            pressure_hpa: response.main.pressure,
            cloud_cover_pct: response.clouds.all,
            observed_at,
        })
    }
}

#[async_trait]
impl WeatherProvider for WeatherClient {
    async fn fetch(
        &self,
        ctx: &FetchContext,
        query: &GeoQuery,
    ) -> Result<Option<WeatherObservation>> {
        query.validate()?;
        match self.try_fetch(ctx, query).await {
            Ok(observation) => Ok(Some(observation)),
            Err(err @ Error::BadRequest(_)) | Err(err @ Error::Internal(_)) => Err(err),
            Err(err) => {
                warn!(source = "weather", error = %err, "upstream failed, forecast proceeds without weather");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn failure_yields_null() {
        let client = WeatherClient::new(ProviderEndpoint {
            base_url: "http://127.0.0.1:1/data/2.5".to_string(),
            api_key: None,
            timeout_secs: 1,
            ttl_minutes: 30,
        })
        .unwrap();
        let ctx = FetchContext::detached(Duration::from_secs(2));
        let query = GeoQuery::new(40.71, -74.01);
        assert_eq!(client.fetch(&ctx, &query).await.unwrap(), None);
    }

    #[test]
    fn openweather_payload_parses() {
        let raw = r#"{
            "main": {"temp": 24.5, "humidity": 61.0, "pressure": 1018.0},
            "wind": {"speed": 3.2},
            "clouds": {"all": 40.0},
            "dt": 1754049600
        }"#;
        let response: CurrentWeatherResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.main.temp, 24.5);
        assert_eq!(response.clouds.all, 40.0);
    }
}
