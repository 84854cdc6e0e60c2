//! Subscription registry.
//!
//! Exclusive owner of the subscriber map. Reads iterate concurrently
//! under the outer `RwLock`; each subscriber sits behind its own `Mutex`
//! so dispatches for the same subscriber serialize and the cooldown check
//! is race-free.

use std::collections::HashMap;
use std::sync::Arc;

use aeris_common::model::{
    Coordinates, PrefsPatch, Subscriber, SubscriberLocation, SubscriberPrefs,
};
use aeris_common::{Error, Result};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::geo;

/// One registered subscriber. The inner lock serializes dispatches.
pub struct SubscriberEntry {
    state: Mutex<Subscriber>,
}

impl SubscriberEntry {
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Subscriber> {
        self.state.lock().await
    }

    /// Consistent read of the subscriber record.
    pub async fn snapshot(&self) -> Subscriber {
        self.state.lock().await.clone()
    }
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<HashMap<String, Arc<SubscriberEntry>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a subscription. `last_dispatch_at` is reset only when the
    /// subscriber is new; updates keep the cooldown clock running.
    pub async fn subscribe(
        &self,
        id: impl Into<String>,
        location: SubscriberLocation,
        prefs: SubscriberPrefs,
    ) -> Result<Subscriber> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::bad_request("subscriber id must not be empty"));
        }
        location.validate()?;
        prefs.validate()?;

        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.get(&id) {
            let mut subscriber = entry.state.lock().await;
            subscriber.location = location;
            subscriber.prefs = prefs;
            debug!(subscriber_id = %id, "subscription updated");
            return Ok(subscriber.clone());
        }

        let subscriber = Subscriber {
            id: id.clone(),
            location,
            prefs,
            last_dispatch_at: None,
        };
        inner.insert(
            id.clone(),
            Arc::new(SubscriberEntry {
                state: Mutex::new(subscriber.clone()),
            }),
        );
        debug!(subscriber_id = %id, "subscription created");
        Ok(subscriber)
    }

    /// Remove a subscription; returns whether it existed.
    pub async fn unsubscribe(&self, id: &str) -> bool {
        self.inner.write().await.remove(id).is_some()
    }

    /// Merge a preference patch into an existing subscription.
    pub async fn update_prefs(&self, id: &str, patch: PrefsPatch) -> Result<Subscriber> {
        let entry = self
            .get(id)
            .await
            .ok_or_else(|| Error::bad_request(format!("unknown subscriber {id}")))?;
        let mut subscriber = entry.state.lock().await;
        subscriber.prefs.apply(patch)?;
        Ok(subscriber.clone())
    }

    pub async fn get(&self, id: &str) -> Option<Arc<SubscriberEntry>> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Subscribers whose own radius covers `location`. A zero radius
    /// matches nothing.
    pub async fn within_radius(&self, location: Coordinates) -> Vec<Arc<SubscriberEntry>> {
        let entries: Vec<Arc<SubscriberEntry>> =
            self.inner.read().await.values().cloned().collect();
        let mut matched = Vec::new();
        for entry in entries {
            let subscriber = entry.state.lock().await;
            let radius_km = subscriber.location.radius_km;
            if radius_km <= 0.0 {
                continue;
            }
            let distance =
                geo::haversine_km(subscriber.location.coordinates(), location);
            if distance <= radius_km {
                drop(subscriber);
                matched.push(entry);
            }
        }
        matched
    }

    /// Distinct subscriber locations, deduplicated on the quantized grid.
    /// These seed the scheduler's hot-location set.
    pub async fn hot_locations(&self) -> Vec<Coordinates> {
        let entries: Vec<Arc<SubscriberEntry>> =
            self.inner.read().await.values().cloned().collect();
        let mut seen = std::collections::HashSet::new();
        let mut locations = Vec::new();
        for entry in entries {
            let subscriber = entry.state.lock().await;
            let coordinates = subscriber.location.coordinates();
            if seen.insert(geo::quantize(coordinates)) {
                locations.push(coordinates);
            }
        }
        locations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn location(lat: f64, lng: f64, radius_km: f64) -> SubscriberLocation {
        SubscriberLocation {
            lat,
            lng,
            radius_km,
        }
    }

    #[tokio::test]
    async fn subscribe_upserts_and_preserves_cooldown_clock() {
        let registry = SubscriptionRegistry::new();
        registry
            .subscribe("alice", location(40.7, -74.0, 25.0), SubscriberPrefs::default())
            .await
            .unwrap();

        // Simulate a dispatch having happened.
        let entry = registry.get("alice").await.unwrap();
        let dispatched_at = Utc::now();
        entry.lock().await.last_dispatch_at = Some(dispatched_at);

        // Re-subscribing updates the record but keeps last_dispatch_at.
        let echoed = registry
            .subscribe("alice", location(41.0, -74.5, 10.0), SubscriberPrefs::default())
            .await
            .unwrap();
        assert_eq!(echoed.location.radius_km, 10.0);
        assert_eq!(echoed.last_dispatch_at, Some(dispatched_at));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn unsubscribe_removes() {
        let registry = SubscriptionRegistry::new();
        registry
            .subscribe("bob", location(40.7, -74.0, 25.0), SubscriberPrefs::default())
            .await
            .unwrap();
        assert!(registry.unsubscribe("bob").await);
        assert!(!registry.unsubscribe("bob").await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn update_prefs_rejects_unknown_subscriber() {
        let registry = SubscriptionRegistry::new();
        let result = registry.update_prefs("ghost", PrefsPatch::default()).await;
        assert!(matches!(result, Err(Error::BadRequest(_))));
    }

    #[tokio::test]
    async fn within_radius_uses_subscriber_radius() {
        let registry = SubscriptionRegistry::new();
        // ~5.6 km from the probe point.
        registry
            .subscribe("near", location(40.75, -74.0, 10.0), SubscriberPrefs::default())
            .await
            .unwrap();
        // Same point but a radius too small to reach it.
        registry
            .subscribe("tight", location(40.75, -74.0, 2.0), SubscriberPrefs::default())
            .await
            .unwrap();
        // Zero radius never matches, even at the exact point.
        registry
            .subscribe("zero", location(40.70, -74.0, 0.0), SubscriberPrefs::default())
            .await
            .unwrap();

        let matched = registry.within_radius(Coordinates::new(40.70, -74.0)).await;
        let mut ids = Vec::new();
        for entry in matched {
            ids.push(entry.snapshot().await.id);
        }
        assert_eq!(ids, vec!["near"]);
    }

    #[tokio::test]
    async fn hot_locations_dedup_on_grid() {
        let registry = SubscriptionRegistry::new();
        registry
            .subscribe("a", location(40.7128, -74.0060, 25.0), SubscriberPrefs::default())
            .await
            .unwrap();
        registry
            .subscribe("b", location(40.7131, -74.0055, 25.0), SubscriberPrefs::default())
            .await
            .unwrap();
        registry
            .subscribe("c", location(34.0522, -118.2437, 25.0), SubscriberPrefs::default())
            .await
            .unwrap();
        assert_eq!(registry.hot_locations().await.len(), 2);
    }

    #[tokio::test]
    async fn invalid_subscription_is_rejected() {
        let registry = SubscriptionRegistry::new();
        assert!(registry
            .subscribe("bad", location(95.0, 0.0, 25.0), SubscriberPrefs::default())
            .await
            .is_err());
        assert!(registry
            .subscribe("", location(40.0, 0.0, 25.0), SubscriberPrefs::default())
            .await
            .is_err());
    }
}
