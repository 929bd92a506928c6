//! Emergency models: status lifecycle, timeline, and the emergency record.

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// Lifecycle status of an emergency.
///
/// Progression: `Pending → Dispatched → InTransit → Completed`, with
/// `Cancelled` reachable from any non-terminal state. `Completed` and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EmergencyStatus {
    Pending,
    Dispatched,
    InTransit,
    Completed,
    Cancelled,
}

impl EmergencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyStatus::Pending => "pending",
            EmergencyStatus::Dispatched => "dispatched",
            EmergencyStatus::InTransit => "in_transit",
            EmergencyStatus::Completed => "completed",
            EmergencyStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EmergencyStatus::Pending),
            "dispatched" => Some(EmergencyStatus::Dispatched),
            "in_transit" => Some(EmergencyStatus::InTransit),
            "completed" => Some(EmergencyStatus::Completed),
            "cancelled" => Some(EmergencyStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EmergencyStatus::Completed | EmergencyStatus::Cancelled)
    }

    /// Whether `next` is a legal transition target from this status.
    ///
    /// `Dispatched → Dispatched` is permitted as the manual re-dispatch path;
    /// the ambulance claim on that edge is idempotent.
    pub fn can_transition_to(&self, next: EmergencyStatus) -> bool {
        use EmergencyStatus::*;
        match (self, next) {
            (Pending, Dispatched) => true,
            (Dispatched, Dispatched) => true,
            (Dispatched, InTransit) => true,
            (InTransit, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Medical priority of a request.
///
/// Stored and surfaced; allocation is greedy per request and never consults
/// priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "critical" => Some(Priority::Critical),
            _ => None,
        }
    }
}

/// Where the emergency is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmergencyLocation {
    pub point: GeoPoint,
    /// Street address as reported by the caller
    pub address: Option<String>,
    /// Free-text additional info (access codes, floor, landmarks)
    pub details: Option<String>,
}

/// One entry in the append-only status history of an emergency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEntry {
    pub status: EmergencyStatus,
    /// RFC3339 timestamp of the causing commit
    pub at: String,
    /// Position snapshot: ambulance location when assigned, else the
    /// emergency's own location
    pub location: Option<GeoPoint>,
    pub notes: Option<String>,
    /// User ref that caused the entry, when known
    pub recorded_by: Option<String>,
}

/// One dispatch request from intake to completion.
///
/// Mutated only through `DispatchEngine` and `EmergencyStateMachine`; never
/// deleted (`Cancelled` is terminal, not deletion). The `version` counter
/// backs optimistic concurrency on every update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Emergency {
    /// Unique emergency ID
    pub emergency_id: String,
    /// Owning user identity, immutable after creation
    pub patient_ref: String,
    /// Reported location
    pub location: EmergencyLocation,
    /// Assigned hospital, set at creation and immutable thereafter
    pub hospital_id: String,
    /// Reserved ambulance; unset while none is available
    pub ambulance_id: Option<String>,
    /// Lifecycle status
    pub status: EmergencyStatus,
    /// Medical priority (informational)
    pub priority: Priority,
    /// Append-only audit trail, oldest first
    pub timeline: Vec<TimelineEntry>,
    /// Contact user refs snapshotted from the request
    pub emergency_contacts: Vec<String>,
    /// ETA derived from the route estimate; unset when estimation failed
    pub estimated_arrival_at: Option<String>,
    /// Set once on the transition to `InTransit`
    pub actual_arrival_at: Option<String>,
    /// Set once on the transition to `Completed`
    pub completed_at: Option<String>,
    /// Optimistic concurrency counter
    pub version: i64,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Emergency {
    /// Create a new pending emergency with its timeline seeded.
    pub fn new(
        patient_ref: String,
        location: EmergencyLocation,
        priority: Priority,
        hospital_id: String,
        emergency_contacts: Vec<String>,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        let seed = TimelineEntry {
            status: EmergencyStatus::Pending,
            at: now.clone(),
            location: Some(location.point),
            notes: Some("Emergency request created".into()),
            recorded_by: Some(patient_ref.clone()),
        };
        Self {
            emergency_id: uuid::Uuid::new_v4().to_string(),
            patient_ref,
            location,
            hospital_id,
            ambulance_id: None,
            status: EmergencyStatus::Pending,
            priority,
            timeline: vec![seed],
            emergency_contacts,
            estimated_arrival_at: None,
            actual_arrival_at: None,
            completed_at: None,
            version: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Append a timeline entry stamped with the current time.
    pub fn append_timeline(
        &mut self,
        status: EmergencyStatus,
        location: Option<GeoPoint>,
        notes: Option<String>,
        recorded_by: Option<String>,
    ) {
        self.timeline.push(TimelineEntry {
            status,
            at: chrono::Utc::now().to_rfc3339(),
            location,
            notes,
            recorded_by,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_emergency() -> Emergency {
        Emergency::new(
            "user-42".into(),
            EmergencyLocation {
                point: GeoPoint::new(13.40, 52.52),
                address: Some("Alexanderplatz 1".into()),
                details: None,
            },
            Priority::High,
            "hospital-1".into(),
            vec!["contact-1".into()],
        )
    }

    #[test]
    fn test_new_emergency_seeds_timeline() {
        let emergency = make_emergency();
        assert_eq!(emergency.status, EmergencyStatus::Pending);
        assert_eq!(emergency.timeline.len(), 1);
        assert_eq!(emergency.timeline[0].status, EmergencyStatus::Pending);
        assert_eq!(emergency.version, 0);
        assert!(emergency.ambulance_id.is_none());
    }

    #[test]
    fn test_transition_table_forward_chain() {
        use EmergencyStatus::*;
        assert!(Pending.can_transition_to(Dispatched));
        assert!(Dispatched.can_transition_to(InTransit));
        assert!(InTransit.can_transition_to(Completed));
    }

    #[test]
    fn test_transition_table_rejects_backwards() {
        use EmergencyStatus::*;
        assert!(!Dispatched.can_transition_to(Pending));
        assert!(!InTransit.can_transition_to(Dispatched));
        assert!(!Completed.can_transition_to(InTransit));
        assert!(!Pending.can_transition_to(InTransit));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn test_cancel_from_non_terminal_only() {
        use EmergencyStatus::*;
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Dispatched.can_transition_to(Cancelled));
        assert!(InTransit.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn test_terminal_states_locked() {
        use EmergencyStatus::*;
        for next in [Pending, Dispatched, InTransit, Completed, Cancelled] {
            assert!(!Completed.can_transition_to(next));
            assert!(!Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn test_redispatch_self_edge() {
        use EmergencyStatus::*;
        assert!(Dispatched.can_transition_to(Dispatched));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!InTransit.can_transition_to(InTransit));
    }

    #[test]
    fn test_append_timeline_grows() {
        let mut emergency = make_emergency();
        emergency.append_timeline(EmergencyStatus::Dispatched, None, None, None);
        assert_eq!(emergency.timeline.len(), 2);
        assert_eq!(emergency.timeline[1].status, EmergencyStatus::Dispatched);
    }

    #[test]
    fn test_status_round_trip() {
        use EmergencyStatus::*;
        for status in [Pending, Dispatched, InTransit, Completed, Cancelled] {
            assert_eq!(EmergencyStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(EmergencyStatus::parse("enroute"), None);
    }
}
