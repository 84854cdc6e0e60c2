//! Alert and recommendation derivation from a forecast trajectory.

use std::collections::BTreeMap;

use aeris_common::model::{
    Alert, AlertKind, AqiLevel, AqiPrediction, AqiThresholds, ForecastSummary, HourPrediction,
    Pollutant, PollutantThresholds, Recommendation, Severity, Trend,
};

use crate::aqi;

/// Only predictions within the next day raise alerts.
const ALERT_WINDOW_HOURS: u32 = 24;

/// Default per-pollutant thresholds, derived from the breakpoint tables:
/// warning at the concentration where AQI reaches 101, critical at 151.
pub fn default_pollutant_thresholds(pollutant: Pollutant) -> PollutantThresholds {
    // Every table has 101- and 151-indexed segments.
    let warning = aqi::concentration_at_index(pollutant, 101).unwrap_or(f64::INFINITY);
    let critical = aqi::concentration_at_index(pollutant, 151).unwrap_or(f64::INFINITY);
    PollutantThresholds { warning, critical }
}

fn aqi_alert(prediction: &AqiPrediction, severity: Severity) -> Alert {
    let kind = match severity {
        Severity::Emergency => AlertKind::AqiEmergency,
        Severity::Critical => AlertKind::AqiCritical,
        _ => AlertKind::AqiWarning,
    };
    Alert {
        kind,
        severity,
        pollutant: None,
        aqi: Some(prediction.aqi),
        concentration: None,
        hours_until: prediction.hour,
        at: prediction.at,
        message: format!(
            "AQI forecast to reach {} ({}) in {} h",
            prediction.aqi,
            prediction.level.as_str(),
            prediction.hour
        ),
    }
}

fn pollutant_alert(pollutant: Pollutant, prediction: &HourPrediction, severity: Severity) -> Alert {
    let kind = if severity >= Severity::Critical {
        AlertKind::PollutantCritical
    } else {
        AlertKind::PollutantWarning
    };
    Alert {
        kind,
        severity,
        pollutant: Some(pollutant),
        aqi: None,
        concentration: Some(prediction.concentration),
        hours_until: prediction.hour,
        at: prediction.at,
        message: format!(
            "{} forecast to reach {:.1} {} in {} h",
            pollutant,
            prediction.concentration,
            pollutant.canonical_unit(),
            prediction.hour
        ),
    }
}

/// Derive alerts for the coming 24 hours: one per AQI prediction that
/// crosses a threshold, plus one per pollutant prediction that crosses
/// that pollutant's thresholds.
pub fn derive_alerts(
    aqi_trajectory: &[AqiPrediction],
    per_pollutant: &BTreeMap<Pollutant, Vec<HourPrediction>>,
    thresholds: &AqiThresholds,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    for prediction in aqi_trajectory
        .iter()
        .filter(|p| p.hour <= ALERT_WINDOW_HOURS)
    {
        if let Some(severity) = thresholds.severity_of(prediction.aqi) {
            alerts.push(aqi_alert(prediction, severity));
        }
    }

    for (&pollutant, predictions) in per_pollutant {
        let limits = default_pollutant_thresholds(pollutant);
        for prediction in predictions.iter().filter(|p| p.hour <= ALERT_WINDOW_HOURS) {
            if let Some(severity) = limits.severity_of(prediction.concentration) {
                alerts.push(pollutant_alert(pollutant, prediction, severity));
            }
        }
    }

    alerts
}

/// Canonical advice strings per level. Consecutive hours at the same level
/// repeat their bundle; deduplication is the caller's concern.
fn advice_for(level: AqiLevel) -> Option<&'static [&'static str]> {
    match level {
        AqiLevel::UnhealthySensitive => Some(&[
            "Sensitive groups should reduce prolonged or heavy outdoor exertion.",
            "People with asthma should keep quick-relief medicine handy.",
        ]),
        AqiLevel::Unhealthy => Some(&[
            "Everyone should reduce prolonged or heavy outdoor exertion.",
            "Sensitive groups should avoid outdoor activity.",
            "Consider moving activities indoors.",
        ]),
        AqiLevel::VeryUnhealthy => Some(&[
            "Everyone should avoid prolonged outdoor exertion.",
            "Sensitive groups should remain indoors.",
            "Run an air purifier if one is available.",
        ]),
        AqiLevel::Hazardous => Some(&[
            "Everyone should avoid all outdoor activity.",
            "Keep windows and doors closed.",
            "Wear a fitted respirator if going outside is unavoidable.",
        ]),
        AqiLevel::Good | AqiLevel::Moderate => None,
    }
}

/// One recommendation bundle per forecast hour whose AQI exceeds 100.
pub fn derive_recommendations(aqi_trajectory: &[AqiPrediction]) -> Vec<Recommendation> {
    aqi_trajectory
        .iter()
        .filter(|p| p.aqi > 100)
        .filter_map(|p| {
            advice_for(p.level).map(|advice| Recommendation {
                hour: p.hour,
                at: p.at,
                level: p.level,
                advice: advice.iter().map(|s| s.to_string()).collect(),
            })
        })
        .collect()
}

/// Condense an AQI trajectory. Trend compares last against first with a
/// ±10 dead band.
pub fn summarize(aqi_trajectory: &[AqiPrediction]) -> Option<ForecastSummary> {
    let first = aqi_trajectory.first()?;
    let last = aqi_trajectory.last()?;
    let peak = aqi_trajectory.iter().max_by_key(|p| p.aqi)?;
    let sum: u32 = aqi_trajectory.iter().map(|p| u32::from(p.aqi)).sum();
    let average = (f64::from(sum) / aqi_trajectory.len() as f64).round() as u16;

    let delta = i32::from(last.aqi) - i32::from(first.aqi);
    let trend = if delta > 10 {
        Trend::Increasing
    } else if delta < -10 {
        Trend::Decreasing
    } else {
        Trend::Stable
    };

    Some(ForecastSummary {
        current: first.aqi,
        peak: peak.aqi,
        average,
        trend,
        worst_hour: peak.hour,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn trajectory(values: &[u16]) -> Vec<AqiPrediction> {
        let now = Utc::now();
        values
            .iter()
            .enumerate()
            .map(|(i, &aqi_value)| AqiPrediction {
                hour: i as u32 + 1,
                aqi: aqi_value,
                level: aqi::level(aqi_value),
                at: now + Duration::hours(i as i64 + 1),
            })
            .collect()
    }

    #[test]
    fn aqi_alerts_respect_thresholds() {
        let thresholds = AqiThresholds::default();
        let alerts = derive_alerts(&trajectory(&[50, 120, 160, 210]), &BTreeMap::new(), &thresholds);
        assert_eq!(alerts.len(), 3);
        assert_eq!(alerts[0].kind, AlertKind::AqiWarning);
        assert_eq!(alerts[1].kind, AlertKind::AqiCritical);
        assert_eq!(alerts[2].kind, AlertKind::AqiEmergency);
        assert_eq!(alerts[2].hours_until, 4);
    }

    #[test]
    fn alerts_are_limited_to_24_hours() {
        let thresholds = AqiThresholds::default();
        let values: Vec<u16> = (0..48).map(|_| 180).collect();
        let alerts = derive_alerts(&trajectory(&values), &BTreeMap::new(), &thresholds);
        assert_eq!(alerts.len(), 24);
    }

    #[test]
    fn pollutant_alerts_use_breakpoint_thresholds() {
        let now = Utc::now();
        let predictions = vec![
            HourPrediction {
                hour: 1,
                concentration: 30.0,
                at: now + Duration::hours(1),
                method: aeris_common::model::Method::Statistical,
            },
            HourPrediction {
                hour: 2,
                concentration: 60.0,
                at: now + Duration::hours(2),
                method: aeris_common::model::Method::Statistical,
            },
        ];
        let per_pollutant = BTreeMap::from([(Pollutant::Pm25, predictions)]);
        let alerts = derive_alerts(&[], &per_pollutant, &AqiThresholds::default());
        // 30 μg/m³ is below the 35.5 warning line; 60 crosses critical (55.5).
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::PollutantCritical);
        assert_eq!(alerts[0].pollutant, Some(Pollutant::Pm25));
    }

    #[test]
    fn recommendations_only_above_100() {
        let recommendations = derive_recommendations(&trajectory(&[80, 100, 101, 180, 320]));
        assert_eq!(recommendations.len(), 3);
        assert_eq!(recommendations[0].level, AqiLevel::UnhealthySensitive);
        assert_eq!(recommendations[1].level, AqiLevel::Unhealthy);
        assert_eq!(recommendations[2].level, AqiLevel::Hazardous);
    }

    #[test]
    fn consecutive_hours_repeat_bundles() {
        let recommendations = derive_recommendations(&trajectory(&[120, 120, 120]));
        assert_eq!(recommendations.len(), 3);
        assert_eq!(recommendations[0].advice, recommendations[1].advice);
    }

    #[test]
    fn summary_trend_dead_band() {
        let summary = summarize(&trajectory(&[100, 105, 109])).unwrap();
        assert_eq!(summary.trend, Trend::Stable);
        let summary = summarize(&trajectory(&[100, 105, 111])).unwrap();
        assert_eq!(summary.trend, Trend::Increasing);
        let summary = summarize(&trajectory(&[111, 105, 100])).unwrap();
        assert_eq!(summary.trend, Trend::Decreasing);
    }

    #[test]
    fn summary_peak_and_average() {
        let summary = summarize(&trajectory(&[100, 140, 120])).unwrap();
        assert_eq!(summary.current, 100);
        assert_eq!(summary.peak, 140);
        assert_eq!(summary.worst_hour, 2);
        assert_eq!(summary.average, 120);
    }
}
