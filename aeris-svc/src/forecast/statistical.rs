//! Statistical baseline projection.
//!
//! The only projection backend currently implemented: a deterministic
//! diurnal curve around the measured (or baseline) concentration, with a
//! seeded noise term so nearby locations do not all produce the same
//! series. A learned backend can replace this through [`ProjectionModel`]
//! without touching the engine.

use aeris_common::model::{Coordinates, HourPrediction, Method, Pollutant};
use chrono::{Duration, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::ForecastInput;
use crate::clients::mock::seed_from_parts;
use crate::geo;

/// Projection backend contract. `base` is the anchor concentration in the
/// pollutant's canonical unit (snapshot value or climatological baseline).
pub trait ProjectionModel: Send + Sync {
    fn method(&self) -> Method;

    fn project(
        &self,
        input: &ForecastInput<'_>,
        pollutant: Pollutant,
        base: f64,
    ) -> Vec<HourPrediction>;
}

/// Diurnal-plus-noise baseline.
#[derive(Debug, Default)]
pub struct StatisticalBaseline;

/// Diurnal component for hour offset `h`.
fn trend(hour: u32) -> f64 {
    (f64::from(hour) * std::f64::consts::PI / 12.0).sin() * 0.1
}

/// Noise term in [-0.1, 0.1], seeded on (location, pollutant,
/// hour-of-generation-day). One draw per pollutant per forecast.
fn noise(location: Coordinates, pollutant: Pollutant, generation_hour: u32) -> f64 {
    let (lat_e2, lng_e2) = geo::quantize(location);
    let seed = seed_from_parts(&format!(
        "forecast:{lat_e2}:{lng_e2}:{pollutant}:{generation_hour}"
    ));
    let mut rng = StdRng::seed_from_u64(seed);
    rng.gen_range(-0.1..=0.1)
}

impl ProjectionModel for StatisticalBaseline {
    fn method(&self) -> Method {
        Method::Statistical
    }

    fn project(
        &self,
        input: &ForecastInput<'_>,
        pollutant: Pollutant,
        base: f64,
    ) -> Vec<HourPrediction> {
        let r = noise(input.location, pollutant, input.generated_at.hour());
        (1..=input.horizon_hours)
            .map(|hour| HourPrediction {
                hour,
                concentration: (base * (1.0 + trend(hour) + r)).max(0.0),
                at: input.generated_at + Duration::hours(i64::from(hour)),
                method: self.method(),
            })
            .collect()
    }
}
