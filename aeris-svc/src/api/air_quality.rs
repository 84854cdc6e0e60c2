//! Air-quality query endpoints.

use aeris_common::model::{
    Alert, AqiPrediction, ConfidenceBand, Forecast, ForecastSummary, GeoQuery, HourPrediction,
    Pollutant, Recommendation, Snapshot, DEFAULT_HORIZON_HOURS, DEFAULT_RADIUS_KM,
};
use aeris_common::Error;
use axum::extract::{Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult};
use crate::aqi;
use crate::forecast::{derive_recommendations, summarize};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct LocationParams {
    lat: f64,
    lng: f64,
    radius_km: Option<f64>,
    horizon_hours: Option<u32>,
}

impl LocationParams {
    fn to_query(&self) -> GeoQuery {
        GeoQuery {
            lat: self.lat,
            lng: self.lng,
            radius_km: self.radius_km.unwrap_or(DEFAULT_RADIUS_KM),
            horizon_hours: self.horizon_hours.unwrap_or(DEFAULT_HORIZON_HOURS),
        }
    }
}

/// `GET /api/air-quality/current`
pub async fn current(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> ApiResult<Json<Snapshot>> {
    let query = params.to_query();
    let snapshot = state.with_deadline(state.service.current(&query)).await?;
    Ok(Json(snapshot))
}

/// `GET /api/air-quality/forecast`
pub async fn forecast(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> ApiResult<Json<Forecast>> {
    let query = params.to_query();
    let forecast = state.with_deadline(state.service.forecast(&query)).await?;
    Ok(Json(forecast))
}

#[derive(Debug, Deserialize)]
pub struct PollutantParams {
    lat: f64,
    lng: f64,
    pollutant: String,
    radius_km: Option<f64>,
    horizon_hours: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PollutantForecastResponse {
    pub pollutant: Pollutant,
    pub predictions: Vec<HourPrediction>,
    pub confidence: Vec<ConfidenceBand>,
    pub alerts: Vec<Alert>,
    pub recommendations: Vec<Recommendation>,
}

/// `GET /api/air-quality/forecast/pollutant` — one pollutant's slice of
/// the forecast, with alerts and recommendations attributable to it.
pub async fn pollutant_forecast(
    State(state): State<AppState>,
    Query(params): Query<PollutantParams>,
) -> ApiResult<Json<PollutantForecastResponse>> {
    let pollutant = Pollutant::from_alias(&params.pollutant).ok_or_else(|| {
        ApiError::from(Error::bad_request(format!(
            "unknown pollutant {:?}",
            params.pollutant
        )))
    })?;
    let query = GeoQuery {
        lat: params.lat,
        lng: params.lng,
        radius_km: params.radius_km.unwrap_or(DEFAULT_RADIUS_KM),
        horizon_hours: params.horizon_hours.unwrap_or(DEFAULT_HORIZON_HOURS),
    };
    let forecast = state.with_deadline(state.service.forecast(&query)).await?;

    let predictions = forecast
        .per_pollutant
        .get(&pollutant)
        .cloned()
        .unwrap_or_default();
    let confidence = forecast
        .confidence
        .get(&pollutant)
        .cloned()
        .unwrap_or_default();
    let alerts: Vec<Alert> = forecast
        .alerts
        .iter()
        .filter(|alert| alert.pollutant == Some(pollutant))
        .cloned()
        .collect();
    // Recommendations attributable to this pollutant alone: derive them
    // from its single-pollutant AQI trajectory.
    let single_pollutant_aqi: Vec<AqiPrediction> = predictions
        .iter()
        .map(|p| {
            let value = aqi::aqi(pollutant, p.concentration);
            AqiPrediction {
                hour: p.hour,
                aqi: value,
                level: aqi::level(value),
                at: p.at,
            }
        })
        .collect();
    let recommendations = derive_recommendations(&single_pollutant_aqi);

    Ok(Json(PollutantForecastResponse {
        pollutant,
        predictions,
        confidence,
        alerts,
        recommendations,
    }))
}

#[derive(Debug, Serialize)]
pub struct AqiForecastResponse {
    pub aqi: Vec<AqiPrediction>,
    pub alerts: Vec<Alert>,
    pub recommendations: Vec<Recommendation>,
    pub summary: Option<ForecastSummary>,
}

/// `GET /api/air-quality/forecast/aqi`
pub async fn aqi_forecast(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> ApiResult<Json<AqiForecastResponse>> {
    let query = params.to_query();
    let forecast = state.with_deadline(state.service.forecast(&query)).await?;
    let summary = summarize(&forecast.aqi);
    Ok(Json(AqiForecastResponse {
        aqi: forecast.aqi,
        alerts: forecast.alerts,
        recommendations: forecast.recommendations,
        summary,
    }))
}
