//! Canonicalizer: merges raw provider payloads into a [`Snapshot`].
//!
//! Providers disagree on pollutant naming, units, and coverage. The merge
//! policy is fixed: normalize names and units, keep the nearest-station
//! measurement per pollutant (ties broken by newer observation, then
//! alphabetical source), union stations and sources, and derive the
//! overall AQI and data-quality metadata. Canonicalization never fails;
//! empty input yields an empty low-confidence snapshot.

use std::collections::BTreeMap;

use aeris_common::model::{
    AqiLevel, Confidence, Coordinates, Coverage, DataQuality, Measurement, Pollutant, Snapshot,
    Station,
};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::aqi;
use crate::clients::ProviderPayload;

/// Raw inputs for one canonicalization. Any provider may be absent.
#[derive(Debug, Clone, Default)]
pub struct CanonicalInput {
    pub satellite: Option<ProviderPayload>,
    pub ground: Vec<ProviderPayload>,
}

impl CanonicalInput {
    fn payloads(&self) -> impl Iterator<Item = &ProviderPayload> {
        self.satellite.iter().chain(self.ground.iter())
    }
}

/// Convert a provider-reported value into the pollutant's canonical unit.
/// Unrecognized units reject the measurement rather than mislabeling it.
fn normalize_concentration(pollutant: Pollutant, unit: &str, value: f64) -> Option<f64> {
    let folded: String = unit
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '/')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let folded = folded.replace('μ', "µ");
    match pollutant {
        Pollutant::Pm25 | Pollutant::Pm10 => match folded.as_str() {
            "µg/m³" | "µg/m3" | "ug/m3" | "ugm3" => Some(value),
            _ => None,
        },
        Pollutant::Co => match folded.as_str() {
            "ppm" => Some(value),
            "ppb" => Some(value / 1000.0),
            _ => None,
        },
        _ => match folded.as_str() {
            "ppb" => Some(value),
            "ppm" => Some(value * 1000.0),
            _ => None,
        },
    }
}

/// Whether `candidate` beats `incumbent` under the merge policy:
/// smaller distance, then newer observation, then alphabetical source.
fn prefer(candidate: &Measurement, incumbent: &Measurement) -> bool {
    let candidate_distance = candidate.distance_meters.unwrap_or(f64::INFINITY);
    let incumbent_distance = incumbent.distance_meters.unwrap_or(f64::INFINITY);
    if candidate_distance != incumbent_distance {
        return candidate_distance < incumbent_distance;
    }
    if candidate.observed_at != incumbent.observed_at {
        return candidate.observed_at > incumbent.observed_at;
    }
    candidate.source < incumbent.source
}

/// Merge provider payloads into the canonical snapshot for `location`.
pub fn canonicalize(
    location: Coordinates,
    input: CanonicalInput,
    observed_at: DateTime<Utc>,
) -> Snapshot {
    let mut pollutants: BTreeMap<Pollutant, Measurement> = BTreeMap::new();
    let mut stations: Vec<Station> = Vec::new();
    let mut sources: Vec<String> = Vec::new();

    for payload in input.payloads() {
        if !sources.iter().any(|s| s == &payload.source) {
            sources.push(payload.source.clone());
        }
        for station in &payload.stations {
            let seen = stations
                .iter()
                .any(|s| s.id == station.id && s.source == station.source);
            if !seen {
                stations.push(station.clone());
            }
        }
        for raw in &payload.measurements {
            let Some(pollutant) = Pollutant::from_alias(&raw.parameter) else {
                debug!(parameter = %raw.parameter, source = %payload.source, "unknown pollutant name, skipping");
                continue;
            };
            let Some(concentration) =
                normalize_concentration(pollutant, &raw.unit, raw.value)
            else {
                debug!(unit = %raw.unit, pollutant = %pollutant, source = %payload.source, "unrecognized unit, skipping");
                continue;
            };
            if !concentration.is_finite() || concentration < 0.0 {
                continue;
            }
            let candidate = Measurement {
                pollutant,
                concentration,
                unit: pollutant.canonical_unit().to_string(),
                source: payload.source.clone(),
                station_id: raw.station_id.clone(),
                observed_at: raw.observed_at,
                distance_meters: raw.distance_meters,
            };
            match pollutants.get(&pollutant) {
                Some(incumbent) if !prefer(&candidate, incumbent) => {}
                _ => {
                    pollutants.insert(pollutant, candidate);
                }
            }
        }
    }

    let overall_aqi = pollutants
        .iter()
        .map(|(pollutant, m)| aqi::aqi(*pollutant, m.concentration))
        .max()
        .unwrap_or(0);

    let satellite_present = input.satellite.is_some();
    let ground_present = !input.ground.is_empty();
    let confidence = match (satellite_present, ground_present) {
        (true, true) => Confidence::High,
        (true, false) | (false, true) => Confidence::Medium,
        (false, false) => Confidence::Low,
    };
    let coverage = if pollutants.len() >= 5 {
        Coverage::Full
    } else {
        Coverage::Partial
    };
    let resolution = input
        .satellite
        .as_ref()
        .map(|payload| payload.resolution.clone())
        .unwrap_or_else(|| {
            if ground_present {
                "station".to_string()
            } else {
                "unknown".to_string()
            }
        });

    Snapshot {
        location,
        observed_at,
        level: aqi::level(overall_aqi),
        aqi: overall_aqi,
        pollutants,
        stations,
        sources,
        data_quality: DataQuality {
            confidence,
            coverage,
            resolution,
        },
    }
}
