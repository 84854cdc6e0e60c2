//! Configuration loading.
//!
//! Settings come from a TOML file with environment-variable overrides on
//! top; a missing file falls back to compiled defaults with a warning and
//! never prevents startup. Upstream API keys are redacted from `Debug`
//! output so they cannot reach a log line.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

/// An upstream API key. Deserializes from a plain string; `Debug` is
/// redacted.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for request headers only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// One upstream provider endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub api_key: Option<ApiKey>,
    pub timeout_secs: u64,
    pub ttl_minutes: u64,
}

impl Default for ProviderEndpoint {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            timeout_secs: 15,
            ttl_minutes: 10,
        }
    }
}

impl ProviderEndpoint {
    fn with(base_url: &str, timeout_secs: u64, ttl_minutes: u64) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key: None,
            timeout_secs,
            ttl_minutes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// When false, provider failures fall back to null instead of the
    /// deterministic mock, and a request with no data surfaces as
    /// unavailable.
    pub allow_mock_fallback: bool,
    pub satellite: ProviderEndpoint,
    pub ground_a: ProviderEndpoint,
    pub ground_b: ProviderEndpoint,
    pub weather: ProviderEndpoint,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            allow_mock_fallback: true,
            satellite: ProviderEndpoint::with("https://api.tempo-aq.example/v1", 30, 15),
            ground_a: ProviderEndpoint::with("https://www.airnowapi.org/aq", 15, 10),
            ground_b: ProviderEndpoint::with("https://api.openaq.org/v3", 15, 10),
            weather: ProviderEndpoint::with("https://api.openweathermap.org/data/2.5", 15, 30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub bind_addr: String,
    /// Overall request deadline, seconds.
    pub request_deadline_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8640".to_string(),
            request_deadline_secs: 45,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub cadence_minutes: u64,
    pub worker_pool: usize,
    pub shutdown_grace_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            cadence_minutes: 15,
            worker_pool: 4,
            shutdown_grace_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub cooldown_minutes: u64,
    pub history_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            cooldown_minutes: 60,
            history_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    /// Per-client outbox capacity; the oldest event is dropped on overflow.
    pub outbox_capacity: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self { outbox_capacity: 64 }
    }
}

/// Root settings for the AERIS daemon.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub http: HttpSettings,
    pub scheduler: SchedulerSettings,
    pub dispatch: DispatchSettings,
    pub bus: BusSettings,
    pub providers: ProviderSettings,
}

impl Settings {
    /// Load settings: compiled defaults, then the TOML file (if any), then
    /// environment overrides. A missing or unreadable file only warns.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let mut settings = match path {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(contents) => toml::from_str(&contents)
                    .map_err(|e| Error::Internal(format!("invalid config file: {e}")))?,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "config file not readable, using defaults");
                    Settings::default()
                }
            },
            None => Settings::default(),
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Environment variables take precedence over the file; API keys are
    /// usually supplied this way so they never live on disk.
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("AERIS_BIND_ADDR") {
            self.http.bind_addr = addr;
        }
        if let Ok(allow) = std::env::var("AERIS_ALLOW_MOCK_FALLBACK") {
            self.providers.allow_mock_fallback = allow != "0" && allow != "false";
        }
        for (var, slot) in [
            ("AERIS_SATELLITE_API_KEY", &mut self.providers.satellite),
            ("AERIS_GROUND_A_API_KEY", &mut self.providers.ground_a),
            ("AERIS_GROUND_B_API_KEY", &mut self.providers.ground_b),
            ("AERIS_WEATHER_API_KEY", &mut self.providers.weather),
        ] {
            if let Ok(key) = std::env::var(var) {
                slot.api_key = Some(ApiKey::new(key));
            }
        }
    }
}
