//! Deterministic fallback data generation.
//!
//! When an upstream provider times out, errors, or returns an unparseable
//! body, mock-fallback clients synthesize a payload instead of failing.
//! The generator is fully deterministic: the PRNG seed derives from the
//! query location (rounded to two decimals) and the pollutant, so the same
//! query always yields the same values. An urban-area multiplier and a
//! time-of-day multiplier shape the numbers toward plausibility.

use aeris_common::model::{Coordinates, GeoQuery, Pollutant, Station};
use chrono::{DateTime, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::geo;

/// Major city centers used by the urban-area multiplier. A query within
/// 0.5° of any center scales by a pollutant-specific factor.
const URBAN_CENTERS: &[(&str, f64, f64)] = &[
    ("New York", 40.7128, -74.0060),
    ("Los Angeles", 34.0522, -118.2437),
    ("Chicago", 41.8781, -87.6298),
    ("Houston", 29.7604, -95.3698),
    ("Mexico City", 19.4326, -99.1332),
    ("London", 51.5074, -0.1278),
    ("Paris", 48.8566, 2.3522),
    ("Delhi", 28.6139, 77.2090),
    ("Beijing", 39.9042, 116.4074),
    ("Tokyo", 35.6762, 139.6503),
    ("São Paulo", -23.5505, -46.6333),
    ("Lagos", 6.5244, 3.3792),
];

/// PRNG seed for `(lat 2dp, lng 2dp, pollutant)`: first eight bytes of the
/// SHA-256 of the canonical seed string.
pub fn seed_for(lat: f64, lng: f64, pollutant: Pollutant) -> u64 {
    let (lat_e2, lng_e2) = geo::quantize(Coordinates::new(lat, lng));
    seed_from_parts(&format!("{lat_e2}:{lng_e2}:{pollutant}"))
}

/// Seed derivation shared with the forecast noise component.
pub fn seed_from_parts(parts: &str) -> u64 {
    let digest = Sha256::digest(parts.as_bytes());
    u64::from_be_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ])
}

/// Urban multiplier in [0.8, 1.5]. Traffic-driven pollutants scale up in
/// city cores; ozone scales down (titration by fresh NO).
fn urban_factor(pollutant: Pollutant, lat: f64, lng: f64) -> f64 {
    let in_urban_core = URBAN_CENTERS
        .iter()
        .any(|(_, c_lat, c_lng)| (lat - c_lat).abs() <= 0.5 && (lng - c_lng).abs() <= 0.5);
    if !in_urban_core {
        return 1.0;
    }
    match pollutant {
        Pollutant::No2 => 1.4,
        Pollutant::Co => 1.35,
        Pollutant::Pm25 => 1.3,
        Pollutant::Pm10 => 1.25,
        Pollutant::So2 => 1.2,
        Pollutant::Hcho => 1.1,
        Pollutant::O3 => 0.8,
    }
}

/// Approximate local hour from longitude (15° per hour).
fn local_hour(lng: f64, now: DateTime<Utc>) -> u32 {
    let offset = (lng / 15.0).round() as i64;
    (now.hour() as i64 + offset).rem_euclid(24) as u32
}

/// Diurnal multiplier. NO2 and CO peak at rush hours, O3 peaks midday,
/// particulates rise in the evening.
fn time_of_day_factor(pollutant: Pollutant, hour: u32) -> f64 {
    match pollutant {
        Pollutant::No2 | Pollutant::Co => match hour {
            7..=9 | 17..=19 => 1.3,
            10..=15 => 0.9,
            0..=4 => 0.8,
            _ => 1.0,
        },
        Pollutant::O3 => match hour {
            11..=16 => 1.35,
            17..=20 => 1.1,
            0..=6 => 0.7,
            _ => 1.0,
        },
        Pollutant::Pm25 | Pollutant::Pm10 => match hour {
            18..=23 => 1.15,
            4..=7 => 1.05,
            _ => 1.0,
        },
        Pollutant::So2 | Pollutant::Hcho => 1.0,
    }
}

/// Deterministic mock concentration in the pollutant's canonical unit.
pub fn mock_concentration(pollutant: Pollutant, query: &GeoQuery, now: DateTime<Utc>) -> f64 {
    let mut rng = StdRng::seed_from_u64(seed_for(query.lat, query.lng, pollutant));
    let jitter: f64 = rng.gen_range(-0.1..=0.1);
    let base = pollutant.baseline_concentration();
    let value = base
        * urban_factor(pollutant, query.lat, query.lng)
        * time_of_day_factor(pollutant, local_hour(query.lng, now))
        * (1.0 + jitter);
    value.max(0.0)
}

/// Synthetic station for a mock payload, offset slightly from the query
/// point so distance-based merge logic stays exercised.
pub fn mock_station(source: &str, query: &GeoQuery) -> Station {
    let (lat_e2, lng_e2) = geo::quantize(query.location());
    let lat = query.lat + 0.01;
    let lng = query.lng - 0.01;
    Station {
        id: format!("mock-{lat_e2}-{lng_e2}"),
        name: format!("{source} synthetic station"),
        lat,
        lng,
        source: source.to_string(),
        distance_meters: geo::haversine_km(query.location(), Coordinates::new(lat, lng)) * 1000.0,
    }
}
