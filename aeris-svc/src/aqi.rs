//! EPA AQI breakpoint engine.
//!
//! Pure functions mapping a concentration in the pollutant's canonical
//! unit to an AQI integer in [0, 500] by piecewise-linear interpolation
//! over the EPA breakpoint tables, plus the AQI level bucketing.

use aeris_common::model::{AqiLevel, Pollutant};

/// One piecewise segment of an AQI ↔ concentration map.
#[derive(Debug, Clone, Copy)]
pub struct Breakpoint {
    pub c_low: f64,
    pub c_high: f64,
    pub i_low: u16,
    pub i_high: u16,
}

const fn bp(c_low: f64, c_high: f64, i_low: u16, i_high: u16) -> Breakpoint {
    Breakpoint {
        c_low,
        c_high,
        i_low,
        i_high,
    }
}

const PM25_BREAKPOINTS: [Breakpoint; 7] = [
    bp(0.0, 12.0, 0, 50),
    bp(12.1, 35.4, 51, 100),
    bp(35.5, 55.4, 101, 150),
    bp(55.5, 150.4, 151, 200),
    bp(150.5, 250.4, 201, 300),
    bp(250.5, 350.4, 301, 400),
    bp(350.5, 500.4, 401, 500),
];

const PM10_BREAKPOINTS: [Breakpoint; 7] = [
    bp(0.0, 54.0, 0, 50),
    bp(55.0, 154.0, 51, 100),
    bp(155.0, 254.0, 101, 150),
    bp(255.0, 354.0, 151, 200),
    bp(355.0, 424.0, 201, 300),
    bp(425.0, 504.0, 301, 400),
    bp(505.0, 604.0, 401, 500),
];

const O3_BREAKPOINTS: [Breakpoint; 5] = [
    bp(0.0, 54.0, 0, 50),
    bp(55.0, 70.0, 51, 100),
    bp(71.0, 85.0, 101, 150),
    bp(86.0, 105.0, 151, 200),
    bp(106.0, 200.0, 201, 300),
];

const NO2_BREAKPOINTS: [Breakpoint; 7] = [
    bp(0.0, 53.0, 0, 50),
    bp(54.0, 100.0, 51, 100),
    bp(101.0, 360.0, 101, 150),
    bp(361.0, 649.0, 151, 200),
    bp(650.0, 1249.0, 201, 300),
    bp(1250.0, 1649.0, 301, 400),
    bp(1650.0, 2049.0, 401, 500),
];

const SO2_BREAKPOINTS: [Breakpoint; 5] = [
    bp(0.0, 35.0, 0, 50),
    bp(36.0, 75.0, 51, 100),
    bp(76.0, 185.0, 101, 150),
    bp(186.0, 304.0, 151, 200),
    bp(305.0, 604.0, 201, 300),
];

const CO_BREAKPOINTS: [Breakpoint; 7] = [
    bp(0.0, 4.4, 0, 50),
    bp(4.5, 9.4, 51, 100),
    bp(9.5, 12.4, 101, 150),
    bp(12.5, 15.4, 151, 200),
    bp(15.5, 30.4, 201, 300),
    bp(30.5, 40.4, 301, 400),
    bp(40.5, 50.4, 401, 500),
];

const HCHO_BREAKPOINTS: [Breakpoint; 5] = [
    bp(0.0, 10.0, 0, 50),
    bp(11.0, 20.0, 51, 100),
    bp(21.0, 50.0, 101, 150),
    bp(51.0, 100.0, 151, 200),
    bp(101.0, 200.0, 201, 300),
];

/// Breakpoint table for a pollutant, ordered by concentration.
pub fn breakpoints(pollutant: Pollutant) -> &'static [Breakpoint] {
    match pollutant {
        Pollutant::Pm25 => &PM25_BREAKPOINTS,
        Pollutant::Pm10 => &PM10_BREAKPOINTS,
        Pollutant::O3 => &O3_BREAKPOINTS,
        Pollutant::No2 => &NO2_BREAKPOINTS,
        Pollutant::So2 => &SO2_BREAKPOINTS,
        Pollutant::Co => &CO_BREAKPOINTS,
        Pollutant::Hcho => &HCHO_BREAKPOINTS,
    }
}

/// AQI for a concentration in the pollutant's canonical unit.
///
/// EPA convention: `c == c_high` belongs to its segment, so a value
/// exactly on a boundary maps to that segment's upper index. Anything
/// beyond the last segment is capped at 500; non-positive concentrations
/// are 0.
pub fn aqi(pollutant: Pollutant, concentration: f64) -> u16 {
    if !concentration.is_finite() || concentration <= 0.0 {
        return 0;
    }
    for segment in breakpoints(pollutant) {
        if concentration <= segment.c_high {
            let span_i = f64::from(segment.i_high - segment.i_low);
            let span_c = segment.c_high - segment.c_low;
            let scaled =
                span_i / span_c * (concentration - segment.c_low) + f64::from(segment.i_low);
            return scaled.round().clamp(0.0, 500.0) as u16;
        }
    }
    500
}

/// AQI level bucket.
pub fn level(aqi: u16) -> AqiLevel {
    match aqi {
        0..=50 => AqiLevel::Good,
        51..=100 => AqiLevel::Moderate,
        101..=150 => AqiLevel::UnhealthySensitive,
        151..=200 => AqiLevel::Unhealthy,
        201..=300 => AqiLevel::VeryUnhealthy,
        _ => AqiLevel::Hazardous,
    }
}

/// Concentration at which a pollutant's AQI first reaches `index`, taken
/// from the lower bound of the matching segment. Used to derive default
/// per-pollutant alert thresholds.
pub fn concentration_at_index(pollutant: Pollutant, index: u16) -> Option<f64> {
    breakpoints(pollutant)
        .iter()
        .find(|segment| segment.i_low >= index)
        .map(|segment| segment.c_low)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_concentration_is_zero_for_all_pollutants() {
        for pollutant in Pollutant::ALL {
            assert_eq!(aqi(pollutant, 0.0), 0, "{pollutant}");
        }
    }

    #[test]
    fn pm25_spot_check() {
        // 20.0 μg/m³ falls in 12.1–35.4 → 51–100:
        // (100-51)/(35.4-12.1)*(20.0-12.1) + 51 = 67.61 → 68
        assert_eq!(aqi(Pollutant::Pm25, 20.0), 68);
    }

    #[test]
    fn pm10_caps_at_500() {
        assert_eq!(aqi(Pollutant::Pm10, 700.0), 500);
        assert_eq!(aqi(Pollutant::Pm10, 604.0), 500);
    }

    #[test]
    fn boundary_concentration_maps_to_segment_upper_index() {
        assert_eq!(aqi(Pollutant::Pm25, 12.0), 50);
        assert_eq!(aqi(Pollutant::Pm25, 35.4), 100);
        assert_eq!(aqi(Pollutant::O3, 54.0), 50);
        assert_eq!(aqi(Pollutant::O3, 70.0), 100);
        assert_eq!(aqi(Pollutant::Co, 4.4), 50);
    }

    #[test]
    fn aqi_is_monotone_in_concentration() {
        for pollutant in Pollutant::ALL {
            let mut last = 0;
            let mut c = 0.0;
            while c < 700.0 {
                let value = aqi(pollutant, c);
                assert!(
                    value >= last,
                    "{pollutant}: aqi({c}) = {value} < previous {last}"
                );
                last = value;
                c += 0.25;
            }
        }
    }

    #[test]
    fn aqi_is_bounded() {
        for pollutant in Pollutant::ALL {
            for c in [0.0, 0.1, 5.0, 50.0, 500.0, 5000.0, f64::MAX] {
                let value = aqi(pollutant, c);
                assert!(value <= 500, "{pollutant}: aqi({c}) = {value}");
            }
        }
        assert_eq!(aqi(Pollutant::Pm25, f64::NAN), 0);
        assert_eq!(aqi(Pollutant::Pm25, -3.0), 0);
    }

    #[test]
    fn level_buckets() {
        assert_eq!(level(0), AqiLevel::Good);
        assert_eq!(level(50), AqiLevel::Good);
        assert_eq!(level(51), AqiLevel::Moderate);
        assert_eq!(level(100), AqiLevel::Moderate);
        assert_eq!(level(101), AqiLevel::UnhealthySensitive);
        assert_eq!(level(150), AqiLevel::UnhealthySensitive);
        assert_eq!(level(200), AqiLevel::Unhealthy);
        assert_eq!(level(300), AqiLevel::VeryUnhealthy);
        assert_eq!(level(301), AqiLevel::Hazardous);
        assert_eq!(level(500), AqiLevel::Hazardous);
    }

    #[test]
    fn default_threshold_concentrations() {
        assert_eq!(concentration_at_index(Pollutant::Pm25, 101), Some(35.5));
        assert_eq!(concentration_at_index(Pollutant::Pm25, 151), Some(55.5));
        assert_eq!(concentration_at_index(Pollutant::O3, 101), Some(71.0));
        // HCHO's table tops out at 300; there is no 301 segment.
        assert_eq!(concentration_at_index(Pollutant::Hcho, 301), None);
    }
}
