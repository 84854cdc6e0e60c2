//! Feature-window assembly.
//!
//! Builds the fixed 24-row feature matrix the forecast engine consumes.
//! Rows cover hours 23..0 ago (row 0 = 23 h ago, row 23 = now); columns
//! are a stable 12-value contract. Without a history feed, the current
//! weather observation is broadcast to every row — a documented
//! limitation of the assembler, not of its callers.

use aeris_common::model::{Pollutant, Snapshot, WeatherObservation};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

pub const FEATURE_WINDOW_HOURS: usize = 24;

/// One hourly feature row. The field set is a stable contract; adding a
/// column is a breaking change for any trained projection backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRow {
    pub hour_of_day: f64,
    pub day_of_week: f64,
    pub month_of_year: f64,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub wind_speed_ms: f64,
    pub pressure_hpa: f64,
    pub no2: f64,
    pub o3: f64,
    pub so2: f64,
    pub stagnation: f64,
    pub dispersion: f64,
}

/// Neutral mid-latitude weather used when no observation is available.
fn default_weather(observed_at: DateTime<Utc>) -> WeatherObservation {
    WeatherObservation {
        temperature_c: 15.0,
        humidity_pct: 60.0,
        wind_speed_ms: 3.0,
        pressure_hpa: 1013.0,
        cloud_cover_pct: 50.0,
        observed_at,
    }
}

fn concentration_or_baseline(snapshot: &Snapshot, pollutant: Pollutant) -> f64 {
    snapshot
        .pollutants
        .get(&pollutant)
        .map(|m| m.concentration)
        .unwrap_or_else(|| pollutant.baseline_concentration())
}

/// Assemble the 24-row feature matrix for `generated_at`.
pub fn assemble(
    snapshot: &Snapshot,
    weather: Option<&WeatherObservation>,
    generated_at: DateTime<Utc>,
) -> Vec<FeatureRow> {
    let weather = weather
        .cloned()
        .unwrap_or_else(|| default_weather(generated_at));

    let stagnation = (1.0 - weather.wind_speed_ms / 5.0).clamp(0.0, 1.0)
        + if weather.pressure_hpa > 1020.0 { 0.3 } else { 0.0 };
    let dispersion = weather.wind_speed_ms / 10.0 + weather.cloud_cover_pct / 100.0;

    let no2 = concentration_or_baseline(snapshot, Pollutant::No2);
    let o3 = concentration_or_baseline(snapshot, Pollutant::O3);
    let so2 = concentration_or_baseline(snapshot, Pollutant::So2);

    (0..FEATURE_WINDOW_HOURS)
        .map(|row| {
            let at = generated_at - Duration::hours((FEATURE_WINDOW_HOURS - 1 - row) as i64);
            FeatureRow {
                hour_of_day: f64::from(at.hour()),
                day_of_week: f64::from(at.weekday().num_days_from_monday()),
                month_of_year: f64::from(at.month()),
                temperature_c: weather.temperature_c,
                humidity_pct: weather.humidity_pct,
                wind_speed_ms: weather.wind_speed_ms,
                pressure_hpa: weather.pressure_hpa,
                no2,
                o3,
                so2,
                stagnation,
                dispersion,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeris_common::model::{AqiLevel, Confidence, Coordinates, Coverage, DataQuality};
    use std::collections::BTreeMap;

    fn empty_snapshot() -> Snapshot {
        Snapshot {
            location: Coordinates::new(40.71, -74.01),
            observed_at: Utc::now(),
            pollutants: BTreeMap::new(),
            stations: Vec::new(),
            sources: Vec::new(),
            aqi: 0,
            level: AqiLevel::Good,
            data_quality: DataQuality {
                confidence: Confidence::Low,
                coverage: Coverage::Partial,
                resolution: "unknown".to_string(),
            },
        }
    }

    #[test]
    fn matrix_has_24_rows_ending_now() {
        let generated_at = Utc::now();
        let rows = assemble(&empty_snapshot(), None, generated_at);
        assert_eq!(rows.len(), FEATURE_WINDOW_HOURS);
        assert_eq!(rows[23].hour_of_day, f64::from(generated_at.hour()));
        let first_hour = (generated_at - Duration::hours(23)).hour();
        assert_eq!(rows[0].hour_of_day, f64::from(first_hour));
    }

    #[test]
    fn stagnation_formula() {
        let observed_at = Utc::now();
        let weather = WeatherObservation {
            temperature_c: 20.0,
            humidity_pct: 50.0,
            wind_speed_ms: 1.0,
            pressure_hpa: 1025.0,
            cloud_cover_pct: 20.0,
            observed_at,
        };
        let rows = assemble(&empty_snapshot(), Some(&weather), observed_at);
        // clamp(1 - 1/5, 0, 1) + 0.3 for high pressure
        assert!((rows[0].stagnation - 1.1).abs() < 1e-9);
        // 1/10 + 20/100
        assert!((rows[0].dispersion - 0.3).abs() < 1e-9);
    }

    #[test]
    fn calm_high_pressure_caps_stagnation() {
        let observed_at = Utc::now();
        let weather = WeatherObservation {
            temperature_c: 20.0,
            humidity_pct: 50.0,
            wind_speed_ms: 0.0,
            pressure_hpa: 1030.0,
            cloud_cover_pct: 0.0,
            observed_at,
        };
        let rows = assemble(&empty_snapshot(), Some(&weather), observed_at);
        assert!((rows[0].stagnation - 1.3).abs() < 1e-9);
        // Strong wind drives the clamp to zero.
        let windy = WeatherObservation {
            wind_speed_ms: 12.0,
            pressure_hpa: 1000.0,
            ..weather
        };
        let rows = assemble(&empty_snapshot(), Some(&windy), observed_at);
        assert_eq!(rows[0].stagnation, 0.0);
    }

    #[test]
    fn missing_pollutants_use_baselines() {
        let rows = assemble(&empty_snapshot(), None, Utc::now());
        assert_eq!(rows[0].no2, Pollutant::No2.baseline_concentration());
        assert_eq!(rows[0].o3, Pollutant::O3.baseline_concentration());
        assert_eq!(rows[0].so2, Pollutant::So2.baseline_concentration());
    }

    #[test]
    fn weather_is_broadcast_to_all_rows() {
        let observed_at = Utc::now();
        let weather = WeatherObservation {
            temperature_c: 28.5,
            humidity_pct: 40.0,
            wind_speed_ms: 4.0,
            pressure_hpa: 1011.0,
            cloud_cover_pct: 10.0,
            observed_at,
        };
        let rows = assemble(&empty_snapshot(), Some(&weather), observed_at);
        assert!(rows.iter().all(|r| r.temperature_c == 28.5));
    }
}
