//! Geographic helpers: great-circle distance, coordinate quantization,
//! push-bus room naming, and cache keys.

use aeris_common::model::{Coordinates, GeoQuery};

/// Mean earth radius for the spherical-earth haversine distance.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine great-circle distance in kilometers.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Coordinates quantized to two decimal places (~1.1 km of latitude), as
/// integer hundredths.
pub fn quantize(c: Coordinates) -> (i32, i32) {
    ((c.lat * 100.0).round() as i32, (c.lng * 100.0).round() as i32)
}

/// Push-bus room for a coarse location, e.g. `loc:40.71,-74.01`.
pub fn location_room(c: Coordinates) -> String {
    let (lat_e2, lng_e2) = quantize(c);
    format!(
        "loc:{:.2},{:.2}",
        f64::from(lat_e2) / 100.0,
        f64::from(lng_e2) / 100.0
    )
}

/// Push-bus room for a single subscriber.
pub fn user_room(subscriber_id: &str) -> String {
    format!("user:{subscriber_id}")
}

/// Cache key for per-provider TTL caches: queries at the same quantized
/// location and radius share an entry within the TTL window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    lat_e2: i32,
    lng_e2: i32,
    radius_m: u32,
}

impl CacheKey {
    pub fn from_query(query: &GeoQuery) -> Self {
        let (lat_e2, lng_e2) = quantize(query.location());
        Self {
            lat_e2,
            lng_e2,
            radius_m: (query.radius_km * 1000.0).round() as u32,
        }
    }

    pub fn location(&self) -> Coordinates {
        Coordinates::new(f64::from(self.lat_e2) / 100.0, f64::from(self.lng_e2) / 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_known_distance() {
        // New York City to Philadelphia, ~130 km.
        let nyc = Coordinates::new(40.7128, -74.0060);
        let phl = Coordinates::new(39.9526, -75.1652);
        let d = haversine_km(nyc, phl);
        assert!((120.0..140.0).contains(&d), "distance {d}");
    }

    #[test]
    fn haversine_zero_distance() {
        let p = Coordinates::new(51.5, -0.12);
        assert!(haversine_km(p, p) < 1e-9);
    }

    #[test]
    fn room_names_are_stable_under_quantization() {
        let a = Coordinates::new(40.7128, -74.0060);
        let b = Coordinates::new(40.7131, -74.0055);
        assert_eq!(location_room(a), location_room(b));
        assert_eq!(location_room(a), "loc:40.71,-74.01");
    }

    #[test]
    fn cache_keys_coalesce_nearby_queries() {
        let a = CacheKey::from_query(&GeoQuery::new(40.7128, -74.0060));
        let b = CacheKey::from_query(&GeoQuery::new(40.7131, -74.0055));
        assert_eq!(a, b);
        let c = CacheKey::from_query(&GeoQuery::new(40.7128, -74.0060).with_radius(10.0));
        assert_ne!(a, c);
    }
}
