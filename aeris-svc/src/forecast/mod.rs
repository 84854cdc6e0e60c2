//! Forecast engine.
//!
//! Consumes a snapshot, weather, and the assembled feature window and
//! produces the hourly per-pollutant projection, AQI trajectory,
//! confidence bands, alerts, and recommendations. The engine never fails:
//! pollutants missing from the snapshot are projected from their
//! climatological baselines. Output is byte-identical for identical
//! inputs and clock; the only stochastic term is the seeded noise inside
//! the projection model.

pub mod alerts;
pub mod statistical;

use std::collections::BTreeMap;

use aeris_common::model::{
    AqiPrediction, AqiThresholds, ConfidenceBand, Coordinates, DataSources, Forecast, Pollutant,
    Snapshot, WeatherObservation,
};
use chrono::{DateTime, Utc};

use crate::aqi;
use crate::features::FeatureRow;
use statistical::{ProjectionModel, StatisticalBaseline};

pub use alerts::{derive_alerts, derive_recommendations, summarize};

/// Relative half-width of the confidence band around each prediction.
const BAND_SPREAD: f64 = 0.2;
const BAND_CONFIDENCE: f64 = 0.8;

/// Everything the engine needs for one forecast.
#[derive(Debug)]
pub struct ForecastInput<'a> {
    pub location: Coordinates,
    pub horizon_hours: u32,
    pub generated_at: DateTime<Utc>,
    pub snapshot: &'a Snapshot,
    pub weather: Option<&'a WeatherObservation>,
    /// Assembled feature window. The statistical baseline does not read
    /// it; a learned backend would.
    pub features: &'a [FeatureRow],
    pub data_sources: DataSources,
}

pub struct ForecastEngine {
    model: Box<dyn ProjectionModel>,
    thresholds: AqiThresholds,
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ForecastEngine {
    pub fn new() -> Self {
        Self {
            model: Box::new(StatisticalBaseline),
            thresholds: AqiThresholds::default(),
        }
    }

    /// Swap in a different projection backend.
    pub fn with_model(model: Box<dyn ProjectionModel>) -> Self {
        Self {
            model,
            thresholds: AqiThresholds::default(),
        }
    }

    pub fn generate(&self, input: ForecastInput<'_>) -> Forecast {
        let mut per_pollutant = BTreeMap::new();
        let mut confidence = BTreeMap::new();

        for pollutant in Pollutant::ALL {
            let base = input
                .snapshot
                .pollutants
                .get(&pollutant)
                .map(|m| m.concentration)
                .unwrap_or_else(|| pollutant.baseline_concentration());
            let predictions = self.model.project(&input, pollutant, base);
            let bands: Vec<ConfidenceBand> = predictions
                .iter()
                .map(|p| ConfidenceBand {
                    hour: p.hour,
                    lower: (p.concentration * (1.0 - BAND_SPREAD)).max(0.0),
                    upper: p.concentration * (1.0 + BAND_SPREAD),
                    confidence: BAND_CONFIDENCE,
                })
                .collect();
            per_pollutant.insert(pollutant, predictions);
            confidence.insert(pollutant, bands);
        }

        let aqi_trajectory: Vec<AqiPrediction> = (1..=input.horizon_hours)
            .map(|hour| {
                let index = (hour - 1) as usize;
                // Pollutants without a prediction at this hour are skipped,
                // never imputed as zero.
                let worst = per_pollutant
                    .iter()
                    .filter_map(|(pollutant, predictions)| {
                        predictions
                            .get(index)
                            .map(|p| aqi::aqi(*pollutant, p.concentration))
                    })
                    .max()
                    .unwrap_or(0);
                AqiPrediction {
                    hour,
                    aqi: worst,
                    level: aqi::level(worst),
                    at: input.generated_at + chrono::Duration::hours(i64::from(hour)),
                }
            })
            .collect();

        let alerts = alerts::derive_alerts(&aqi_trajectory, &per_pollutant, &self.thresholds);
        let recommendations = alerts::derive_recommendations(&aqi_trajectory);

        Forecast {
            location: input.location,
            horizon_hours: input.horizon_hours,
            generated_at: input.generated_at,
            per_pollutant,
            aqi: aqi_trajectory,
            confidence,
            alerts,
            recommendations,
            data_sources: input.data_sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeris_common::model::{
        AqiLevel, Confidence, Coverage, DataQuality, Measurement, SourceAvailability,
    };
    use crate::features;

    fn snapshot_with_pm25(concentration: f64) -> Snapshot {
        let now = Utc::now();
        let mut pollutants = BTreeMap::new();
        pollutants.insert(
            Pollutant::Pm25,
            Measurement {
                pollutant: Pollutant::Pm25,
                concentration,
                unit: "µg/m³".to_string(),
                source: "OpenAQ".to_string(),
                station_id: None,
                observed_at: now,
                distance_meters: Some(1000.0),
            },
        );
        Snapshot {
            location: Coordinates::new(40.71, -74.01),
            observed_at: now,
            pollutants,
            stations: Vec::new(),
            sources: vec!["OpenAQ".to_string()],
            aqi: 0,
            level: AqiLevel::Good,
            data_quality: DataQuality {
                confidence: Confidence::Medium,
                coverage: Coverage::Partial,
                resolution: "station".to_string(),
            },
        }
    }

    fn sources() -> DataSources {
        DataSources {
            satellite: SourceAvailability::Unavailable,
            ground: SourceAvailability::Available,
            weather: SourceAvailability::Unavailable,
        }
    }

    fn generate(horizon: u32, generated_at: DateTime<Utc>, snapshot: &Snapshot) -> Forecast {
        let rows = features::assemble(snapshot, None, generated_at);
        ForecastEngine::new().generate(ForecastInput {
            location: snapshot.location,
            horizon_hours: horizon,
            generated_at,
            snapshot,
            weather: None,
            features: &rows,
            data_sources: sources(),
        })
    }

    #[test]
    fn trajectory_shape_matches_horizon() {
        let snapshot = snapshot_with_pm25(20.0);
        for horizon in [1, 24, 72] {
            let forecast = generate(horizon, Utc::now(), &snapshot);
            assert_eq!(forecast.aqi.len(), horizon as usize);
            for (i, prediction) in forecast.aqi.iter().enumerate() {
                assert_eq!(prediction.hour, i as u32 + 1);
            }
            let timestamps: Vec<_> = forecast.aqi.iter().map(|p| p.at).collect();
            assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
            for predictions in forecast.per_pollutant.values() {
                assert_eq!(predictions.len(), horizon as usize);
            }
        }
    }

    #[test]
    fn bands_bracket_predictions() {
        let snapshot = snapshot_with_pm25(20.0);
        let forecast = generate(24, Utc::now(), &snapshot);
        for (pollutant, bands) in &forecast.confidence {
            let predictions = &forecast.per_pollutant[pollutant];
            for (band, prediction) in bands.iter().zip(predictions) {
                assert!(band.lower >= 0.0);
                assert!(band.lower <= prediction.concentration);
                assert!(prediction.concentration <= band.upper);
                assert_eq!(band.confidence, BAND_CONFIDENCE);
            }
        }
    }

    #[test]
    fn identical_inputs_yield_identical_forecasts() {
        let snapshot = snapshot_with_pm25(20.0);
        let generated_at = Utc::now();
        let a = generate(24, generated_at, &snapshot);
        let b = generate(24, generated_at, &snapshot);
        assert_eq!(a, b);
    }

    #[test]
    fn missing_pollutants_project_from_baselines() {
        let generated_at = Utc::now();
        let snapshot = snapshot_with_pm25(20.0);
        let forecast = generate(24, generated_at, &snapshot);
        // All seven pollutants are projected even though only PM2.5 was measured.
        assert_eq!(forecast.per_pollutant.len(), Pollutant::ALL.len());
        let o3 = &forecast.per_pollutant[&Pollutant::O3][0];
        let baseline = Pollutant::O3.baseline_concentration();
        // Within trend + noise bounds of the baseline.
        assert!((o3.concentration - baseline).abs() <= baseline * 0.2 + 1e-9);
    }

    #[test]
    fn concentrations_never_negative() {
        let snapshot = snapshot_with_pm25(0.0);
        let forecast = generate(72, Utc::now(), &snapshot);
        for predictions in forecast.per_pollutant.values() {
            assert!(predictions.iter().all(|p| p.concentration >= 0.0));
        }
    }

    #[test]
    fn elevated_snapshot_raises_alerts() {
        // 80 μg/m³ PM2.5 → AQI ≈ 163; the whole day trips critical alerts.
        let snapshot = snapshot_with_pm25(80.0);
        let forecast = generate(24, Utc::now(), &snapshot);
        assert!(!forecast.alerts.is_empty());
        assert!(!forecast.recommendations.is_empty());
        assert!(forecast.aqi.iter().all(|p| p.aqi > 100));
    }
}
