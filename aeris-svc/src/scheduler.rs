//! Periodic refresh scheduler.
//!
//! Every tick: sweep the caches, collect the hot locations (subscriber
//! locations plus recently requested ones), and refresh each under a
//! bounded worker pool — fetch, canonicalize, forecast, publish to the
//! location room, and dispatch to in-radius subscribers. A failure at one
//! location never prevents the others from refreshing. Shutdown is
//! cooperative: the loop drains in-flight refreshes with a bounded wait.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use aeris_common::events::AerisEvent;
use aeris_common::model::{Coordinates, GeoQuery};
use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::bus::PushBus;
use crate::dispatch::AlertDispatcher;
use crate::geo;
use crate::service::AirQualityService;
use crate::subscription::SubscriptionRegistry;

pub const REFRESH_HORIZON_HOURS: u32 = 24;

pub struct Scheduler {
    service: Arc<AirQualityService>,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<AlertDispatcher>,
    bus: Arc<PushBus>,
    cadence: Duration,
    workers: usize,
    shutdown_grace: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        service: Arc<AirQualityService>,
        registry: Arc<SubscriptionRegistry>,
        dispatcher: Arc<AlertDispatcher>,
        bus: Arc<PushBus>,
        cadence: Duration,
        workers: usize,
        shutdown_grace: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            service,
            registry,
            dispatcher,
            bus,
            cadence,
            workers: workers.max(1),
            shutdown_grace,
            shutdown,
        }
    }

    /// Run the refresh loop until shutdown is signalled.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.cadence);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(cadence_secs = self.cadence.as_secs(), "scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                result = self.shutdown.changed() => {
                    if result.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("scheduler stopped");
    }

    /// One refresh pass over all hot locations.
    pub async fn tick(&self) {
        let evicted = self.service.sweep();
        if evicted > 0 {
            debug!(evicted, "cache sweep");
        }

        let locations = self.hot_locations().await;
        if locations.is_empty() {
            debug!("no hot locations, nothing to refresh");
            return;
        }
        info!(locations = locations.len(), "refreshing hot locations");

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        for location in locations {
            let permit = semaphore.clone();
            let service = self.service.clone();
            let registry = self.registry.clone();
            let dispatcher = self.dispatcher.clone();
            let bus = self.bus.clone();
            tasks.spawn(async move {
                let Ok(_permit) = permit.acquire().await else {
                    return;
                };
                refresh_location(&service, &registry, &dispatcher, &bus, location).await;
            });
        }

        // Bound the drain so a hung refresh cannot stall the loop forever.
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(self.shutdown_grace, drain).await.is_err() {
            warn!("refresh pass exceeded grace period, abandoning stragglers");
            tasks.abort_all();
        }
    }

    /// Union of subscriber locations and recently requested locations,
    /// deduplicated on the quantized grid.
    async fn hot_locations(&self) -> Vec<Coordinates> {
        let mut seen = HashSet::new();
        let mut locations = Vec::new();
        for location in self
            .registry
            .hot_locations()
            .await
            .into_iter()
            .chain(self.service.recent_locations())
        {
            if seen.insert(geo::quantize(location)) {
                locations.push(location);
            }
        }
        locations
    }
}

/// Refresh one location: forecast, publish, dispatch. Errors are logged
/// and contained.
pub async fn refresh_location(
    service: &AirQualityService,
    registry: &SubscriptionRegistry,
    dispatcher: &AlertDispatcher,
    bus: &PushBus,
    location: Coordinates,
) {
    let query = GeoQuery::new(location.lat, location.lng).with_horizon(REFRESH_HORIZON_HOURS);
    let forecast = match service.forecast(&query).await {
        Ok(forecast) => forecast,
        Err(err) => {
            warn!(lat = location.lat, lng = location.lng, error = %err, "refresh failed");
            return;
        }
    };

    let room = geo::location_room(location);
    let update = AerisEvent::AirQualityUpdate {
        location,
        forecast: forecast.clone(),
        timestamp: Utc::now(),
    };
    let delivered = bus.publish(&room, &update);
    debug!(room, delivered, "published air-quality update");

    for entry in registry.within_radius(location).await {
        dispatcher.dispatch(&forecast, &entry, Utc::now()).await;
    }
}
