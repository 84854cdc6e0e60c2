//! Alert dispatcher.
//!
//! Evaluates a forecast's alerts against one subscriber's thresholds,
//! enforces the per-subscriber cooldown, fans out to the subscriber's
//! enabled channels, and records the dispatch in a bounded history ring.
//! Dispatches for the same subscriber serialize on the subscriber's lock,
//! so the cooldown check is race-free.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use aeris_common::events::AerisEvent;
use aeris_common::model::{
    Alert, AlertKind, Channel, Coordinates, Forecast, Severity, Subscriber,
};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::PushBus;
use crate::forecast::alerts::default_pollutant_thresholds;
use crate::geo;
use crate::notify::{email_body, sms_body, NotificationSink};
use crate::subscription::SubscriberEntry;

pub const DEFAULT_COOLDOWN_MINUTES: i64 = 60;
pub const HISTORY_CAPACITY: usize = 1000;

/// One recorded dispatch.
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub id: Uuid,
    pub subscriber_id: String,
    pub alerts: Vec<Alert>,
    pub at: DateTime<Utc>,
}

pub struct AlertDispatcher {
    bus: Arc<PushBus>,
    email: Arc<dyn NotificationSink>,
    sms: Arc<dyn NotificationSink>,
    cooldown: Duration,
    history_capacity: usize,
    history: Mutex<VecDeque<DispatchRecord>>,
}

impl AlertDispatcher {
    pub fn new(
        bus: Arc<PushBus>,
        email: Arc<dyn NotificationSink>,
        sms: Arc<dyn NotificationSink>,
        cooldown: Duration,
        history_capacity: usize,
    ) -> Self {
        Self {
            bus,
            email,
            sms,
            cooldown,
            history_capacity: history_capacity.max(1),
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_defaults(bus: Arc<PushBus>) -> Self {
        Self::new(
            bus,
            Arc::new(crate::notify::LogEmailSink),
            Arc::new(crate::notify::LogSmsSink),
            Duration::minutes(DEFAULT_COOLDOWN_MINUTES),
            HISTORY_CAPACITY,
        )
    }

    /// Re-evaluate a forecast alert at this subscriber's thresholds.
    /// Returns the alert with its severity recomputed, or `None` when it
    /// no longer clears the warning bar.
    fn evaluate(alert: &Alert, subscriber: &Subscriber) -> Option<Alert> {
        let severity = match alert.kind {
            AlertKind::AqiWarning | AlertKind::AqiCritical | AlertKind::AqiEmergency => {
                let aqi_value = alert.aqi?;
                subscriber.prefs.aqi_thresholds.severity_of(aqi_value)?
            }
            AlertKind::PollutantWarning | AlertKind::PollutantCritical => {
                let pollutant = alert.pollutant?;
                let concentration = alert.concentration?;
                let limits = subscriber
                    .prefs
                    .per_pollutant
                    .get(&pollutant)
                    .copied()
                    .unwrap_or_else(|| default_pollutant_thresholds(pollutant));
                limits.severity_of(concentration)?
            }
            AlertKind::Info => Severity::Info,
        };
        if severity < Severity::Warning {
            return None;
        }
        Some(Alert {
            severity,
            ..alert.clone()
        })
    }

    /// Dispatch a forecast's alerts to one subscriber. Returns the number
    /// of alerts delivered (0 when disabled, cooling down, or nothing
    /// clears the subscriber's thresholds).
    pub async fn dispatch(
        &self,
        forecast: &Forecast,
        entry: &SubscriberEntry,
        now: DateTime<Utc>,
    ) -> usize {
        let mut subscriber = entry.lock().await;
        if !subscriber.prefs.enabled {
            return 0;
        }
        if let Some(last) = subscriber.last_dispatch_at {
            if now - last < self.cooldown {
                debug!(subscriber_id = %subscriber.id, "within cooldown, skipping dispatch");
                return 0;
            }
        }

        let alerts: Vec<Alert> = forecast
            .alerts
            .iter()
            .filter_map(|alert| Self::evaluate(alert, &subscriber))
            .collect();
        if alerts.is_empty() {
            return 0;
        }

        self.deliver(&subscriber, &alerts, forecast.location, now).await;
        subscriber.last_dispatch_at = Some(now);
        let count = alerts.len();
        self.record(DispatchRecord {
            id: Uuid::new_v4(),
            subscriber_id: subscriber.id.clone(),
            alerts,
            at: now,
        });
        count
    }

    /// Inject a synthetic info alert for one subscriber, bypassing the
    /// cooldown. Used by the subscription test endpoint.
    pub async fn dispatch_test(&self, entry: &SubscriberEntry, now: DateTime<Utc>) -> Alert {
        let subscriber = entry.lock().await;
        let alert = Alert {
            kind: AlertKind::Info,
            severity: Severity::Info,
            pollutant: None,
            aqi: None,
            concentration: None,
            hours_until: 0,
            at: now,
            message: "Test notification: your alert channels are working.".to_string(),
        };
        let location = subscriber.location.coordinates();
        self.deliver(&subscriber, std::slice::from_ref(&alert), location, now)
            .await;
        self.record(DispatchRecord {
            id: Uuid::new_v4(),
            subscriber_id: subscriber.id.clone(),
            alerts: vec![alert.clone()],
            at: now,
        });
        alert
    }

    async fn deliver(
        &self,
        subscriber: &Subscriber,
        alerts: &[Alert],
        location: Coordinates,
        now: DateTime<Utc>,
    ) {
        for channel in &subscriber.prefs.channels {
            match channel {
                Channel::Push => {
                    let event = AerisEvent::AirQualityAlert {
                        subscriber_id: subscriber.id.clone(),
                        alerts: alerts.to_vec(),
                        location,
                        at: now,
                    };
                    self.bus.publish(&geo::user_room(&subscriber.id), &event);
                }
                Channel::Email => {
                    let body = email_body(location, alerts);
                    if let Err(err) = self.email.send(&subscriber.id, &body).await {
                        warn!(subscriber_id = %subscriber.id, error = %err, "email sink failed");
                    }
                }
                Channel::Sms => {
                    let body = sms_body(location, alerts);
                    if let Err(err) = self.sms.send(&subscriber.id, &body).await {
                        warn!(subscriber_id = %subscriber.id, error = %err, "sms sink failed");
                    }
                }
            }
        }
    }

    fn record(&self, record: DispatchRecord) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        if history.len() >= self.history_capacity {
            history.pop_front();
        }
        history.push_back(record);
    }

    /// Latest dispatches, newest first, optionally filtered by subscriber.
    pub fn history(&self, subscriber_id: Option<&str>, limit: usize) -> Vec<DispatchRecord> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history
            .iter()
            .rev()
            .filter(|record| {
                subscriber_id
                    .map(|id| record.subscriber_id == id)
                    .unwrap_or(true)
            })
            .take(limit.min(self.history_capacity))
            .cloned()
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
