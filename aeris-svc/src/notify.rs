//! Notification capability sinks and message formatting.
//!
//! Email and SMS delivery are external collaborators; the dispatcher only
//! sees the [`NotificationSink`] capability. The default sinks log the
//! formatted body instead of performing delivery, and sink failures are
//! logged by the dispatcher, never surfaced.

use aeris_common::model::{Alert, Channel, Coordinates, Severity};
use aeris_common::Result;
use async_trait::async_trait;
use tracing::info;

/// Maximum SMS body length (one GSM segment).
const SMS_MAX_CHARS: usize = 160;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn channel(&self) -> Channel;

    /// Deliver a formatted body to one subscriber.
    async fn send(&self, subscriber_id: &str, body: &str) -> Result<()>;
}

/// Log-only email sink.
pub struct LogEmailSink;

#[async_trait]
impl NotificationSink for LogEmailSink {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, subscriber_id: &str, body: &str) -> Result<()> {
        info!(subscriber_id, body, "email notification");
        Ok(())
    }
}

/// Log-only SMS sink.
pub struct LogSmsSink;

#[async_trait]
impl NotificationSink for LogSmsSink {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, subscriber_id: &str, body: &str) -> Result<()> {
        info!(subscriber_id, body, "sms notification");
        Ok(())
    }
}

/// Multi-line email body: header with alert count and location, one line
/// per alert.
pub fn email_body(location: Coordinates, alerts: &[Alert]) -> String {
    let mut body = format!(
        "Air quality alert — {} alert(s) near {:.2}, {:.2}\n",
        alerts.len(),
        location.lat,
        location.lng
    );
    for alert in alerts {
        body.push_str(&format!(
            "- [{}] {} (in {} h)\n",
            severity_label(alert.severity),
            alert.message,
            alert.hours_until
        ));
    }
    body
}

/// Compact SMS body. Critical and emergency alerts take priority; the
/// body never exceeds one segment.
pub fn sms_body(location: Coordinates, alerts: &[Alert]) -> String {
    let mut ordered: Vec<&Alert> = alerts.iter().collect();
    ordered.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.hours_until.cmp(&b.hours_until)));

    let mut body = format!("AQ alert {:.2},{:.2}:", location.lat, location.lng);
    for alert in ordered {
        let line = format!(
            " {} in {}h;",
            severity_label(alert.severity),
            alert.hours_until
        );
        if body.len() + line.len() > SMS_MAX_CHARS {
            break;
        }
        body.push_str(&line);
    }
    body
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "INFO",
        Severity::Warning => "WARNING",
        Severity::Critical => "CRITICAL",
        Severity::Emergency => "EMERGENCY",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeris_common::model::AlertKind;
    use chrono::Utc;

    fn alert(severity: Severity, hours_until: u32) -> Alert {
        Alert {
            kind: AlertKind::AqiWarning,
            severity,
            pollutant: None,
            aqi: Some(130),
            concentration: None,
            hours_until,
            at: Utc::now(),
            message: format!("AQI forecast to reach 130 in {hours_until} h"),
        }
    }

    #[test]
    fn email_body_lists_every_alert() {
        let body = email_body(
            Coordinates::new(40.71, -74.01),
            &[alert(Severity::Warning, 3), alert(Severity::Critical, 5)],
        );
        assert!(body.contains("2 alert(s)"));
        assert!(body.contains("[WARNING]"));
        assert!(body.contains("[CRITICAL]"));
    }

    #[test]
    fn sms_body_prefers_severe_alerts_and_stays_short() {
        let alerts: Vec<Alert> = (1..=20)
            .map(|h| {
                alert(
                    if h == 20 { Severity::Emergency } else { Severity::Warning },
                    h,
                )
            })
            .collect();
        let body = sms_body(Coordinates::new(40.71, -74.01), &alerts);
        assert!(body.len() <= SMS_MAX_CHARS);
        // The emergency alert leads despite being furthest out.
        assert!(body.contains("EMERGENCY in 20h"));
        let emergency_pos = body.find("EMERGENCY").unwrap();
        let warning_pos = body.find("WARNING").unwrap_or(usize::MAX);
        assert!(emergency_pos < warning_pos);
    }
}
