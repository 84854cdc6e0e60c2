//! Realtime event types for the AERIS push bus.
//!
//! Events are serialized for SSE transmission with an adjacent `type` tag
//! so browser clients can switch on `event.type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Alert, Coordinates, Forecast};

/// Realtime events delivered to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AerisEvent {
    /// Full forecast payload, published on every scheduler tick per hot
    /// location to the `loc:<quantized>` room.
    AirQualityUpdate {
        location: Coordinates,
        forecast: Forecast,
        timestamp: DateTime<Utc>,
    },

    /// Alert bundle for one subscriber, published only to the
    /// `user:<id>` room.
    AirQualityAlert {
        subscriber_id: String,
        alerts: Vec<Alert>,
        location: Coordinates,
        at: DateTime<Utc>,
    },
}

impl AerisEvent {
    /// Event type name, matching the serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            AerisEvent::AirQualityUpdate { .. } => "AirQualityUpdate",
            AerisEvent::AirQualityAlert { .. } => "AirQualityAlert",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_type_tag() {
        let event = AerisEvent::AirQualityAlert {
            subscriber_id: "sub-1".to_string(),
            alerts: vec![],
            location: Coordinates::new(40.71, -74.01),
            at: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "AirQualityAlert");
        assert_eq!(value["subscriber_id"], "sub-1");
        assert_eq!(event.event_type(), "AirQualityAlert");
    }
}
