//! Air-quality service facade.
//!
//! Owns the upstream clients behind their per-provider TTL caches and runs
//! the fetch → canonicalize → features → forecast pipeline for both
//! on-demand requests and scheduler refreshes. Components are wired once
//! at construction; tests substitute fake providers through the same
//! constructor.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use aeris_common::config::Settings;
use aeris_common::model::{
    Coordinates, DataSources, Forecast, GeoQuery, Snapshot, SourceAvailability,
    WeatherObservation,
};
use aeris_common::{Error, Result};
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::cache::TtlCache;
use crate::canonical::{self, CanonicalInput};
use crate::clients::{
    FetchContext, GroundClientA, GroundClientB, PollutantProvider, ProviderPayload,
    SatelliteClient, WeatherClient, WeatherProvider,
};
use crate::features;
use crate::forecast::{ForecastEngine, ForecastInput};
use crate::geo::{self, CacheKey};

/// The four upstream capabilities the pipeline fans out to.
pub struct ProviderSet {
    pub satellite: Arc<dyn PollutantProvider>,
    pub ground_a: Arc<dyn PollutantProvider>,
    pub ground_b: Arc<dyn PollutantProvider>,
    pub weather: Arc<dyn WeatherProvider>,
}

impl ProviderSet {
    /// Real clients per the configured endpoints.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let providers = &settings.providers;
        Ok(Self {
            satellite: Arc::new(SatelliteClient::new(
                providers.satellite.clone(),
                providers.allow_mock_fallback,
            )?),
            ground_a: Arc::new(GroundClientA::new(providers.ground_a.clone())?),
            ground_b: Arc::new(GroundClientB::new(
                providers.ground_b.clone(),
                providers.allow_mock_fallback,
            )?),
            weather: Arc::new(WeatherClient::new(providers.weather.clone())?),
        })
    }
}

/// Per-provider TTLs and timeouts.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub satellite_ttl: Duration,
    pub ground_a_ttl: Duration,
    pub ground_b_ttl: Duration,
    pub weather_ttl: Duration,
    pub satellite_timeout: Duration,
    pub ground_a_timeout: Duration,
    pub ground_b_timeout: Duration,
    pub weather_timeout: Duration,
}

impl CachePolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        let providers = &settings.providers;
        Self {
            satellite_ttl: Duration::from_secs(providers.satellite.ttl_minutes * 60),
            ground_a_ttl: Duration::from_secs(providers.ground_a.ttl_minutes * 60),
            ground_b_ttl: Duration::from_secs(providers.ground_b.ttl_minutes * 60),
            weather_ttl: Duration::from_secs(providers.weather.ttl_minutes * 60),
            satellite_timeout: Duration::from_secs(providers.satellite.timeout_secs),
            ground_a_timeout: Duration::from_secs(providers.ground_a.timeout_secs),
            ground_b_timeout: Duration::from_secs(providers.ground_b.timeout_secs),
            weather_timeout: Duration::from_secs(providers.weather.timeout_secs),
        }
    }
}

struct Gathered {
    satellite: Option<ProviderPayload>,
    ground: Vec<ProviderPayload>,
    weather: Option<WeatherObservation>,
}

impl Gathered {
    fn data_sources(&self) -> DataSources {
        DataSources {
            satellite: SourceAvailability::from_present(self.satellite.is_some()),
            ground: SourceAvailability::from_present(!self.ground.is_empty()),
            weather: SourceAvailability::from_present(self.weather.is_some()),
        }
    }
}

pub struct AirQualityService {
    providers: ProviderSet,
    policy: CachePolicy,
    allow_mock: bool,
    satellite_cache: TtlCache<CacheKey, Option<ProviderPayload>>,
    ground_a_cache: TtlCache<CacheKey, Option<ProviderPayload>>,
    ground_b_cache: TtlCache<CacheKey, Option<ProviderPayload>>,
    weather_cache: TtlCache<CacheKey, Option<WeatherObservation>>,
    /// Locations touched by a request recently; feeds the scheduler's
    /// hot-location set. TTL matches the longest provider TTL.
    recent: TtlCache<CacheKey, Coordinates>,
    engine: ForecastEngine,
    shutdown: watch::Receiver<bool>,
}

impl AirQualityService {
    pub fn new(
        providers: ProviderSet,
        policy: CachePolicy,
        allow_mock: bool,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let recent_ttl = policy
            .satellite_ttl
            .max(policy.ground_a_ttl)
            .max(policy.ground_b_ttl)
            .max(policy.weather_ttl);
        Self {
            providers,
            policy,
            allow_mock,
            satellite_cache: TtlCache::new(policy.satellite_ttl),
            ground_a_cache: TtlCache::new(policy.ground_a_ttl),
            ground_b_cache: TtlCache::new(policy.ground_b_ttl),
            weather_cache: TtlCache::new(policy.weather_ttl),
            recent: TtlCache::new(recent_ttl),
            engine: ForecastEngine::new(),
            shutdown,
        }
    }

    pub fn from_settings(settings: &Settings, shutdown: watch::Receiver<bool>) -> Result<Self> {
        Ok(Self::new(
            ProviderSet::from_settings(settings)?,
            CachePolicy::from_settings(settings),
            settings.providers.allow_mock_fallback,
            shutdown,
        ))
    }

    /// Fan out to every provider through its cache. Provider failures are
    /// absorbed at the client boundary; only programmer errors propagate.
    async fn gather(&self, query: &GeoQuery) -> Result<Gathered> {
        query.validate()?;
        let key = CacheKey::from_query(query);
        self.recent.insert(key, query.location());

        let satellite_fetch = self.satellite_cache.get_or_compute(key, || {
            let provider = self.providers.satellite.clone();
            let ctx = FetchContext::new(self.policy.satellite_timeout, self.shutdown.clone());
            let query = *query;
            async move { provider.fetch(&ctx, &query).await }
        });
        let ground_a_fetch = self.ground_a_cache.get_or_compute(key, || {
            let provider = self.providers.ground_a.clone();
            let ctx = FetchContext::new(self.policy.ground_a_timeout, self.shutdown.clone());
            let query = *query;
            async move { provider.fetch(&ctx, &query).await }
        });
        let ground_b_fetch = self.ground_b_cache.get_or_compute(key, || {
            let provider = self.providers.ground_b.clone();
            let ctx = FetchContext::new(self.policy.ground_b_timeout, self.shutdown.clone());
            let query = *query;
            async move { provider.fetch(&ctx, &query).await }
        });
        let weather_fetch = self.weather_cache.get_or_compute(key, || {
            let provider = self.providers.weather.clone();
            let ctx = FetchContext::new(self.policy.weather_timeout, self.shutdown.clone());
            let query = *query;
            async move { provider.fetch(&ctx, &query).await }
        });

        let (satellite, ground_a, ground_b, weather) =
            tokio::join!(satellite_fetch, ground_a_fetch, ground_b_fetch, weather_fetch);

        let gathered = Gathered {
            satellite: satellite?,
            ground: [ground_a?, ground_b?].into_iter().flatten().collect(),
            weather: weather?,
        };
        if gathered.satellite.is_none() && gathered.ground.is_empty() && !self.allow_mock {
            return Err(Error::Unavailable);
        }
        Ok(gathered)
    }

    /// Current canonical snapshot for the query location.
    pub async fn current(&self, query: &GeoQuery) -> Result<Snapshot> {
        let gathered = self.gather(query).await?;
        Ok(canonical::canonicalize(
            query.location(),
            CanonicalInput {
                satellite: gathered.satellite,
                ground: gathered.ground,
            },
            Utc::now(),
        ))
    }

    /// Hourly forecast for the query location and horizon.
    pub async fn forecast(&self, query: &GeoQuery) -> Result<Forecast> {
        self.forecast_at(query, Utc::now()).await
    }

    /// Forecast with an injected clock; `forecast` is the production
    /// entry point, this one keeps determinism testable.
    pub async fn forecast_at(
        &self,
        query: &GeoQuery,
        generated_at: DateTime<Utc>,
    ) -> Result<Forecast> {
        let gathered = self.gather(query).await?;
        let data_sources = gathered.data_sources();
        let snapshot = canonical::canonicalize(
            query.location(),
            CanonicalInput {
                satellite: gathered.satellite,
                ground: gathered.ground,
            },
            generated_at,
        );
        let rows = features::assemble(&snapshot, gathered.weather.as_ref(), generated_at);
        Ok(self.engine.generate(ForecastInput {
            location: query.location(),
            horizon_hours: query.horizon_hours,
            generated_at,
            snapshot: &snapshot,
            weather: gathered.weather.as_ref(),
            features: &rows,
            data_sources,
        }))
    }

    /// Sweep all caches; returns total evicted entries.
    pub fn sweep(&self) -> usize {
        self.satellite_cache.sweep()
            + self.ground_a_cache.sweep()
            + self.ground_b_cache.sweep()
            + self.weather_cache.sweep()
            + self.recent.sweep()
    }

    /// Total live cache entries, for the status endpoint.
    pub fn cached_entries(&self) -> usize {
        self.satellite_cache.len()
            + self.ground_a_cache.len()
            + self.ground_b_cache.len()
            + self.weather_cache.len()
    }

    /// Locations touched by a request within the TTL window, deduplicated
    /// on the quantized grid.
    pub fn recent_locations(&self) -> Vec<Coordinates> {
        let mut seen = HashSet::new();
        self.recent
            .values()
            .into_iter()
            .filter(|c| seen.insert(geo::quantize(*c)))
            .collect()
    }
}
