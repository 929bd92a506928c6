//! Notification fan-out.
//!
//! Given a committed state change, this module decides who gets told what.
//! Delivery itself is a collaborator behind [`DeliveryChannel`]; failures are
//! logged and never reach the operation that triggered the notification
//! (fire-and-forget, at-most-once).

mod queue;

pub use queue::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::db::Database;
use crate::geo::GeoPoint;
use crate::models::{Emergency, EmergencyStatus};

/// Named events emitted by the core.
pub const EVENT_NEW_EMERGENCY: &str = "new_emergency";
pub const EVENT_STATUS_UPDATE: &str = "status_update";
pub const EVENT_AMBULANCE_LOCATION: &str = "ambulance_location_update";

/// Topic identifier for hospital-scoped events.
pub fn hospital_topic(hospital_id: &str) -> String {
    format!("hospital_{}", hospital_id)
}

/// Topic identifier for emergency-scoped events.
pub fn emergency_topic(emergency_id: &str) -> String {
    format!("emergency_{}", emergency_id)
}

/// Topic identifier for user-scoped events.
pub fn user_topic(user_ref: &str) -> String {
    format!("user_{}", user_ref)
}

/// Delivery errors, logged and swallowed by the dispatcher.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Channel rejected notification: {0}")]
    Rejected(String),

    #[error("Channel unreachable: {0}")]
    Unreachable(String),
}

/// One channel-independent notification work item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    /// Recipient user ref
    pub recipient: String,
    /// Scope of the event (`hospital_<id>`, `emergency_<id>`, `user_<id>`)
    pub topic: String,
    /// Event name
    pub event: String,
    /// Channel-independent payload
    pub payload: serde_json::Value,
}

/// Outbound delivery collaborator (push hub, SMS gateway, ...).
pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> &str;
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

impl<T: DeliveryChannel + ?Sized> DeliveryChannel for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        (**self).deliver(notification)
    }
}

/// Default collaborator: logs every notification.
pub struct LogChannel;

impl DeliveryChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        tracing::info!(
            recipient = %notification.recipient,
            topic = %notification.topic,
            event = %notification.event,
            "notification"
        );
        Ok(())
    }
}

/// A committed state change, as seen by the notification layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionEvent {
    pub emergency_id: String,
    pub hospital_id: String,
    pub patient_ref: String,
    pub emergency_contacts: Vec<String>,
    /// Driver of the assigned ambulance, when one is assigned
    pub driver_ref: Option<String>,
    pub new_status: EmergencyStatus,
    /// RFC3339 timestamp of the commit
    pub at: String,
}

impl TransitionEvent {
    /// Build an event from a freshly committed emergency.
    pub fn from_emergency(emergency: &Emergency, driver_ref: Option<String>) -> Self {
        Self {
            emergency_id: emergency.emergency_id.clone(),
            hospital_id: emergency.hospital_id.clone(),
            patient_ref: emergency.patient_ref.clone(),
            emergency_contacts: emergency.emergency_contacts.clone(),
            driver_ref,
            new_status: emergency.status,
            at: emergency.updated_at.clone(),
        }
    }
}

/// Resolves recipients for committed transitions and hands work items to the
/// delivery channels.
pub struct NotificationDispatcher {
    channels: Vec<Box<dyn DeliveryChannel>>,
}

impl NotificationDispatcher {
    pub fn new(channels: Vec<Box<dyn DeliveryChannel>>) -> Self {
        Self { channels }
    }

    /// Dispatcher that only logs (useful in development).
    pub fn logging() -> Self {
        Self::new(vec![Box::new(LogChannel)])
    }

    /// Fan out a `new_emergency` event: hospital staff always, plus the
    /// driver and the patient when an ambulance was dispatched.
    pub fn notify_new_emergency(&self, db: &Database, event: &TransitionEvent) {
        let mut notifications = self.hospital_notifications(db, event, EVENT_NEW_EMERGENCY);

        if event.new_status == EmergencyStatus::Dispatched {
            if let Some(driver) = &event.driver_ref {
                notifications.push(self.build(event, driver, EVENT_NEW_EMERGENCY));
            }
            notifications.push(self.build(event, &event.patient_ref, EVENT_NEW_EMERGENCY));
        }

        self.deliver_all(&notifications);
    }

    /// Fan out a `status_update` event after a committed transition.
    pub fn notify_status_update(&self, db: &Database, event: &TransitionEvent) {
        let mut notifications = self.hospital_notifications(db, event, EVENT_STATUS_UPDATE);

        if let Some(driver) = &event.driver_ref {
            notifications.push(self.build(event, driver, EVENT_STATUS_UPDATE));
        }

        // Patient and configured contacts are told about the stages that
        // concern them directly
        if matches!(
            event.new_status,
            EmergencyStatus::Dispatched | EmergencyStatus::InTransit | EmergencyStatus::Completed
        ) {
            notifications.push(self.build(event, &event.patient_ref, EVENT_STATUS_UPDATE));
            for contact in &event.emergency_contacts {
                notifications.push(self.build(event, contact, EVENT_STATUS_UPDATE));
            }
        }

        self.deliver_all(&notifications);
    }

    /// Fan out an `ambulance_location_update` scoped to the emergency.
    pub fn notify_ambulance_location(
        &self,
        emergency_id: &str,
        patient_ref: &str,
        ambulance_id: &str,
        point: GeoPoint,
    ) {
        let notification = Notification {
            recipient: patient_ref.to_string(),
            topic: emergency_topic(emergency_id),
            event: EVENT_AMBULANCE_LOCATION.into(),
            payload: serde_json::json!({
                "emergency_id": emergency_id,
                "ambulance_id": ambulance_id,
                "lon": point.lon,
                "lat": point.lat,
            }),
        };
        self.deliver_all(&[notification]);
    }

    /// Notifications for the owning hospital's subscribers. A storage error
    /// here degrades to an empty set; it must never fail the caller.
    fn hospital_notifications(
        &self,
        db: &Database,
        event: &TransitionEvent,
        event_name: &str,
    ) -> Vec<Notification> {
        let subscribers = match db.get_hospital(&event.hospital_id) {
            Ok(Some(hospital)) => hospital.subscribers,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(hospital_id = %event.hospital_id, error = %e, "subscriber lookup failed");
                Vec::new()
            }
        };

        subscribers
            .iter()
            .map(|subscriber| Notification {
                recipient: subscriber.clone(),
                topic: hospital_topic(&event.hospital_id),
                event: event_name.into(),
                payload: self.payload(event),
            })
            .collect()
    }

    fn build(&self, event: &TransitionEvent, recipient: &str, event_name: &str) -> Notification {
        Notification {
            recipient: recipient.to_string(),
            topic: emergency_topic(&event.emergency_id),
            event: event_name.into(),
            payload: self.payload(event),
        }
    }

    fn payload(&self, event: &TransitionEvent) -> serde_json::Value {
        serde_json::json!({
            "emergency_id": event.emergency_id,
            "hospital_id": event.hospital_id,
            "status": event.new_status.as_str(),
            "at": event.at,
        })
    }

    fn deliver_all(&self, notifications: &[Notification]) {
        for notification in notifications {
            for channel in &self.channels {
                if let Err(e) = channel.deliver(notification) {
                    warn!(
                        channel = channel.name(),
                        recipient = %notification.recipient,
                        event = %notification.event,
                        error = %e,
                        "notification delivery failed"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::models::{EmergencyLocation, Hospital, Priority};
    use std::sync::{Arc, Mutex};

    /// Records everything it is asked to deliver.
    pub struct RecordingChannel {
        pub seen: Mutex<Vec<Notification>>,
        pub fail: bool,
    }

    impl RecordingChannel {
        pub fn shared(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    impl DeliveryChannel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
            self.seen.lock().unwrap().push(notification.clone());
            if self.fail {
                Err(DeliveryError::Unreachable("test channel down".into()))
            } else {
                Ok(())
            }
        }
    }

    fn setup() -> (Database, TransitionEvent) {
        let db = Database::open_in_memory().unwrap();
        let mut hospital = Hospital::new("General".into(), GeoPoint::new(13.40, 52.52));
        hospital.subscribers = vec!["staff-1".into(), "staff-2".into()];
        db.insert_hospital(&hospital).unwrap();

        let emergency = Emergency::new(
            "patient-1".into(),
            EmergencyLocation {
                point: GeoPoint::new(13.41, 52.53),
                address: None,
                details: None,
            },
            Priority::Critical,
            hospital.hospital_id.clone(),
            vec!["contact-1".into()],
        );
        let event = TransitionEvent::from_emergency(&emergency, Some("driver-1".into()));
        (db, event)
    }

    #[test]
    fn test_status_update_recipients_for_dispatched() {
        let (db, mut event) = setup();
        event.new_status = EmergencyStatus::Dispatched;

        let channel = RecordingChannel::shared(false);
        let dispatcher = NotificationDispatcher::new(vec![Box::new(channel.clone())]);
        dispatcher.notify_status_update(&db, &event);

        let seen = channel.seen.lock().unwrap();
        let recipients: Vec<&str> = seen.iter().map(|n| n.recipient.as_str()).collect();
        // Two staff subscribers, the driver, the patient and one contact
        assert_eq!(seen.len(), 5);
        assert!(recipients.contains(&"staff-1"));
        assert!(recipients.contains(&"driver-1"));
        assert!(recipients.contains(&"patient-1"));
        assert!(recipients.contains(&"contact-1"));
    }

    #[test]
    fn test_cancelled_skips_patient_and_contacts() {
        let (db, mut event) = setup();
        event.new_status = EmergencyStatus::Cancelled;

        let channel = RecordingChannel::shared(false);
        let dispatcher = NotificationDispatcher::new(vec![Box::new(channel.clone())]);
        dispatcher.notify_status_update(&db, &event);

        let seen = channel.seen.lock().unwrap();
        let recipients: Vec<&str> = seen.iter().map(|n| n.recipient.as_str()).collect();
        assert!(!recipients.contains(&"patient-1"));
        assert!(!recipients.contains(&"contact-1"));
        assert!(recipients.contains(&"driver-1"));
    }

    #[test]
    fn test_new_emergency_pending_notifies_hospital_only() {
        let (db, event) = setup();
        // event status is Pending from creation

        let channel = RecordingChannel::shared(false);
        let dispatcher = NotificationDispatcher::new(vec![Box::new(channel.clone())]);
        dispatcher.notify_new_emergency(&db, &event);

        let seen = channel.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|n| n.topic.starts_with("hospital_")));
        assert!(seen.iter().all(|n| n.event == EVENT_NEW_EMERGENCY));
    }

    #[test]
    fn test_delivery_failure_is_swallowed() {
        let (db, mut event) = setup();
        event.new_status = EmergencyStatus::InTransit;

        let failing = RecordingChannel::shared(true);
        let dispatcher = NotificationDispatcher::new(vec![Box::new(failing.clone())]);
        // Must not panic or propagate
        dispatcher.notify_status_update(&db, &event);
        assert!(!failing.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_topic_naming() {
        assert_eq!(hospital_topic("h1"), "hospital_h1");
        assert_eq!(emergency_topic("e1"), "emergency_e1");
        assert_eq!(user_topic("u1"), "user_u1");
    }

    #[test]
    fn test_location_update_scoped_to_emergency() {
        let channel = RecordingChannel::shared(false);
        let dispatcher = NotificationDispatcher::new(vec![Box::new(channel.clone())]);
        dispatcher.notify_ambulance_location("e1", "patient-1", "a1", GeoPoint::new(1.0, 2.0));

        let seen = channel.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].topic, "emergency_e1");
        assert_eq!(seen[0].event, EVENT_AMBULANCE_LOCATION);
        assert_eq!(seen[0].payload["ambulance_id"], "a1");
    }
}
