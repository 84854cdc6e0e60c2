//! Canonical domain model shared by all AERIS components.
//!
//! This module defines the typed entities the rest of the system works on:
//! pollutants and their canonical units, measurements, stations, snapshots,
//! forecasts, and subscriber records. It contains no I/O.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ========================================
// Pollutants
// ========================================

/// The pollutants AERIS tracks. Canonical names are case-sensitive
/// (`NO2`, `O3`, ... as serialized); incoming provider aliases are
/// normalized through [`Pollutant::from_alias`] at canonicalization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Pollutant {
    No2,
    O3,
    So2,
    Hcho,
    Co,
    Pm25,
    Pm10,
}

impl Pollutant {
    pub const ALL: [Pollutant; 7] = [
        Pollutant::No2,
        Pollutant::O3,
        Pollutant::So2,
        Pollutant::Hcho,
        Pollutant::Co,
        Pollutant::Pm25,
        Pollutant::Pm10,
    ];

    /// Canonical name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Pollutant::No2 => "NO2",
            Pollutant::O3 => "O3",
            Pollutant::So2 => "SO2",
            Pollutant::Hcho => "HCHO",
            Pollutant::Co => "CO",
            Pollutant::Pm25 => "PM25",
            Pollutant::Pm10 => "PM10",
        }
    }

    /// Canonical unit: μg/m³ for particulates, ppm for CO, ppb for the
    /// other gases.
    pub fn canonical_unit(&self) -> &'static str {
        match self {
            Pollutant::Pm25 | Pollutant::Pm10 => "µg/m³",
            Pollutant::Co => "ppm",
            _ => "ppb",
        }
    }

    /// Resolve a provider-supplied pollutant name. Case-folds and strips
    /// punctuation, so `pm2.5`, `PM2_5` and `pm25` all map to [`Pollutant::Pm25`].
    pub fn from_alias(raw: &str) -> Option<Pollutant> {
        let folded: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "no2" | "nitrogendioxide" => Some(Pollutant::No2),
            "o3" | "ozone" => Some(Pollutant::O3),
            "so2" | "sulfurdioxide" | "sulphurdioxide" => Some(Pollutant::So2),
            "hcho" | "formaldehyde" => Some(Pollutant::Hcho),
            "co" | "carbonmonoxide" => Some(Pollutant::Co),
            "pm25" => Some(Pollutant::Pm25),
            "pm10" => Some(Pollutant::Pm10),
            _ => None,
        }
    }

    /// Climatological baseline concentration in the canonical unit, used
    /// when a snapshot lacks the pollutant.
    pub fn baseline_concentration(&self) -> f64 {
        match self {
            Pollutant::No2 => 20.0,
            Pollutant::O3 => 50.0,
            Pollutant::So2 => 10.0,
            Pollutant::Hcho => 5.0,
            Pollutant::Co => 1.0,
            Pollutant::Pm25 => 15.0,
            Pollutant::Pm10 => 25.0,
        }
    }
}

impl std::fmt::Display for Pollutant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ========================================
// AQI levels and severities
// ========================================

/// EPA AQI level buckets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum AqiLevel {
    Good,
    Moderate,
    UnhealthySensitive,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AqiLevel::Good => "good",
            AqiLevel::Moderate => "moderate",
            AqiLevel::UnhealthySensitive => "unhealthy-sensitive",
            AqiLevel::Unhealthy => "unhealthy",
            AqiLevel::VeryUnhealthy => "very-unhealthy",
            AqiLevel::Hazardous => "hazardous",
        }
    }
}

/// Alert severity, ascending.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Emergency,
}

// ========================================
// Geography
// ========================================

/// A geographic point, WGS-84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A validated geographic query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: f64,
    pub horizon_hours: u32,
}

pub const DEFAULT_RADIUS_KM: f64 = 25.0;
pub const DEFAULT_HORIZON_HOURS: u32 = 24;
pub const MAX_RADIUS_KM: f64 = 100.0;
pub const MAX_HORIZON_HOURS: u32 = 72;

impl GeoQuery {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            radius_km: DEFAULT_RADIUS_KM,
            horizon_hours: DEFAULT_HORIZON_HOURS,
        }
    }

    pub fn with_radius(mut self, radius_km: f64) -> Self {
        self.radius_km = radius_km;
        self
    }

    pub fn with_horizon(mut self, horizon_hours: u32) -> Self {
        self.horizon_hours = horizon_hours;
        self
    }

    pub fn location(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }

    /// Validate before any upstream dispatch. Invalid queries never reach
    /// a provider.
    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(Error::bad_request(format!(
                "latitude {} out of range [-90, 90]",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(Error::bad_request(format!(
                "longitude {} out of range [-180, 180]",
                self.lng
            )));
        }
        if !self.radius_km.is_finite() || self.radius_km <= 0.0 || self.radius_km > MAX_RADIUS_KM {
            return Err(Error::bad_request(format!(
                "radius {} km out of range (0, {}]",
                self.radius_km, MAX_RADIUS_KM
            )));
        }
        if self.horizon_hours < 1 || self.horizon_hours > MAX_HORIZON_HOURS {
            return Err(Error::bad_request(format!(
                "horizon {} h out of range [1, {}]",
                self.horizon_hours, MAX_HORIZON_HOURS
            )));
        }
        Ok(())
    }
}

// ========================================
// Measurements, stations, snapshots
// ========================================

/// A single canonical pollutant measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub pollutant: Pollutant,
    /// Concentration in the pollutant's canonical unit, never negative.
    pub concentration: f64,
    pub unit: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_id: Option<String>,
    pub observed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
}

/// A reporting station. Identity is the `(id, source)` pair; stations are
/// immutable once canonicalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub source: String,
    pub distance_meters: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coverage {
    Partial,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub confidence: Confidence,
    pub coverage: Coverage,
    pub resolution: String,
}

/// The canonical point-in-time air-quality view for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub location: Coordinates,
    pub observed_at: DateTime<Utc>,
    /// At most one measurement per pollutant by construction.
    pub pollutants: BTreeMap<Pollutant, Measurement>,
    pub stations: Vec<Station>,
    pub sources: Vec<String>,
    /// `max` of per-pollutant AQI over the included pollutants, 0 if empty.
    pub aqi: u16,
    pub level: AqiLevel,
    pub data_quality: DataQuality,
}

// ========================================
// Weather
// ========================================

/// Canonical weather observation used by the feature assembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub wind_speed_ms: f64,
    pub pressure_hpa: f64,
    pub cloud_cover_pct: f64,
    pub observed_at: DateTime<Utc>,
}

// ========================================
// Forecast
// ========================================

/// How an hourly prediction was produced. `Model` is reserved for a
/// learned projection backend; only the statistical baseline exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Statistical,
    Model,
}

/// Concentration estimate for a single future hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourPrediction {
    /// Hour offset from generation, 1-based.
    pub hour: u32,
    pub concentration: f64,
    pub at: DateTime<Utc>,
    pub method: Method,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqiPrediction {
    pub hour: u32,
    pub aqi: u16,
    pub level: AqiLevel,
    pub at: DateTime<Utc>,
}

/// Confidence band around one hourly prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBand {
    pub hour: u32,
    pub lower: f64,
    pub upper: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    AqiWarning,
    AqiCritical,
    AqiEmergency,
    PollutantWarning,
    PollutantCritical,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pollutant: Option<Pollutant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aqi: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concentration: Option<f64>,
    pub hours_until: u32,
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Health recommendation bundle for one forecast hour whose AQI exceeds 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub hour: u32,
    pub at: DateTime<Utc>,
    pub level: AqiLevel,
    pub advice: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceAvailability {
    Available,
    Unavailable,
}

impl SourceAvailability {
    pub fn from_present(present: bool) -> Self {
        if present {
            SourceAvailability::Available
        } else {
            SourceAvailability::Unavailable
        }
    }
}

/// Which provider families contributed to a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSources {
    pub satellite: SourceAvailability,
    pub ground: SourceAvailability,
    pub weather: SourceAvailability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

/// Condensed view of an AQI trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub current: u16,
    pub peak: u16,
    pub average: u16,
    pub trend: Trend,
    pub worst_hour: u32,
}

/// Hourly projection for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub location: Coordinates,
    pub horizon_hours: u32,
    pub generated_at: DateTime<Utc>,
    pub per_pollutant: BTreeMap<Pollutant, Vec<HourPrediction>>,
    pub aqi: Vec<AqiPrediction>,
    pub confidence: BTreeMap<Pollutant, Vec<ConfidenceBand>>,
    pub alerts: Vec<Alert>,
    pub recommendations: Vec<Recommendation>,
    pub data_sources: DataSources,
}

// ========================================
// Subscribers
// ========================================

/// Delivery channel for alert dispatches.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Push,
    Email,
    Sms,
}

/// AQI alert thresholds; must be strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AqiThresholds {
    pub warning: u16,
    pub critical: u16,
    pub emergency: u16,
}

impl Default for AqiThresholds {
    fn default() -> Self {
        Self {
            warning: 100,
            critical: 150,
            emergency: 200,
        }
    }
}

impl AqiThresholds {
    pub fn validate(&self) -> Result<()> {
        if self.warning < self.critical && self.critical < self.emergency {
            Ok(())
        } else {
            Err(Error::bad_request(
                "aqi thresholds must satisfy warning < critical < emergency",
            ))
        }
    }

    /// Severity of an AQI value under these thresholds.
    pub fn severity_of(&self, aqi: u16) -> Option<Severity> {
        if aqi >= self.emergency {
            Some(Severity::Emergency)
        } else if aqi >= self.critical {
            Some(Severity::Critical)
        } else if aqi >= self.warning {
            Some(Severity::Warning)
        } else {
            None
        }
    }
}

/// Per-pollutant concentration thresholds in the canonical unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollutantThresholds {
    pub warning: f64,
    pub critical: f64,
}

impl PollutantThresholds {
    pub fn severity_of(&self, concentration: f64) -> Option<Severity> {
        if concentration >= self.critical {
            Some(Severity::Critical)
        } else if concentration >= self.warning {
            Some(Severity::Warning)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberPrefs {
    #[serde(default)]
    pub aqi_thresholds: AqiThresholds,
    #[serde(default)]
    pub per_pollutant: BTreeMap<Pollutant, PollutantThresholds>,
    #[serde(default = "default_channels")]
    pub channels: BTreeSet<Channel>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_channels() -> BTreeSet<Channel> {
    BTreeSet::from([Channel::Push])
}

fn default_enabled() -> bool {
    true
}

impl Default for SubscriberPrefs {
    fn default() -> Self {
        Self {
            aqi_thresholds: AqiThresholds::default(),
            per_pollutant: BTreeMap::new(),
            channels: default_channels(),
            enabled: true,
        }
    }
}

impl SubscriberPrefs {
    pub fn validate(&self) -> Result<()> {
        self.aqi_thresholds.validate()?;
        for (pollutant, thresholds) in &self.per_pollutant {
            if thresholds.warning >= thresholds.critical {
                return Err(Error::bad_request(format!(
                    "{pollutant} thresholds must satisfy warning < critical"
                )));
            }
        }
        Ok(())
    }
}

/// Partial preference update. Unknown fields are rejected at the
/// deserialization boundary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrefsPatch {
    pub aqi_thresholds: Option<AqiThresholds>,
    pub per_pollutant: Option<BTreeMap<Pollutant, PollutantThresholds>>,
    pub channels: Option<BTreeSet<Channel>>,
    pub enabled: Option<bool>,
}

impl SubscriberPrefs {
    /// Merge a patch into these preferences and validate the result.
    pub fn apply(&mut self, patch: PrefsPatch) -> Result<()> {
        if let Some(aqi_thresholds) = patch.aqi_thresholds {
            self.aqi_thresholds = aqi_thresholds;
        }
        if let Some(per_pollutant) = patch.per_pollutant {
            self.per_pollutant = per_pollutant;
        }
        if let Some(channels) = patch.channels {
            self.channels = channels;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        self.validate()
    }
}

/// Subscriber location with an alerting radius. A radius of zero never
/// matches any forecast location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubscriberLocation {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: f64,
}

impl SubscriberLocation {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(Error::bad_request("subscriber latitude out of range"));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(Error::bad_request("subscriber longitude out of range"));
        }
        if !self.radius_km.is_finite() || self.radius_km < 0.0 || self.radius_km > MAX_RADIUS_KM {
            return Err(Error::bad_request(format!(
                "subscriber radius out of range [0, {MAX_RADIUS_KM}]"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    pub location: SubscriberLocation,
    pub prefs: SubscriberPrefs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_dispatch_at: Option<DateTime<Utc>>,
}
