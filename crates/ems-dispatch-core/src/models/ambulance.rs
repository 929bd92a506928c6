//! Ambulance models.

use serde::{Deserialize, Serialize};

use crate::geo::LocationFix;

/// Operational status of a vehicle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AmbulanceStatus {
    /// In the dispatch pool, claimable
    Available,
    /// Claimed by exactly one non-terminal emergency
    OnDuty,
    /// Taken out of service for maintenance
    InMaintenance,
    /// Out of service for any other reason
    Unavailable,
}

impl AmbulanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmbulanceStatus::Available => "available",
            AmbulanceStatus::OnDuty => "on_duty",
            AmbulanceStatus::InMaintenance => "in_maintenance",
            AmbulanceStatus::Unavailable => "unavailable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(AmbulanceStatus::Available),
            "on_duty" => Some(AmbulanceStatus::OnDuty),
            "in_maintenance" => Some(AmbulanceStatus::InMaintenance),
            "unavailable" => Some(AmbulanceStatus::Unavailable),
            _ => None,
        }
    }
}

/// A dispatchable vehicle owned by one hospital.
///
/// Invariant: `status == OnDuty` iff `current_emergency_id` is set. The
/// storage layer enforces this with a `CHECK` constraint and all writers go
/// through the conditional claim/release operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ambulance {
    /// Unique ambulance ID
    pub ambulance_id: String,
    /// Radio call sign (for display and timeline notes)
    pub call_sign: String,
    /// Owning hospital; scopes the dispatch candidate search
    pub hospital_id: String,
    /// Driver user ref, recipient of driver-scoped notifications
    pub driver_ref: Option<String>,
    /// Operational status
    pub status: AmbulanceStatus,
    /// Back-reference to the emergency currently holding this vehicle
    pub current_emergency_id: Option<String>,
    /// Last known position, written only by the vehicle's location reports
    pub current_location: Option<LocationFix>,
    /// Inactive vehicles are never claimed
    pub active: bool,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Ambulance {
    /// Create a new available ambulance with required fields.
    pub fn new(call_sign: String, hospital_id: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            ambulance_id: uuid::Uuid::new_v4().to_string(),
            call_sign,
            hospital_id,
            driver_ref: None,
            status: AmbulanceStatus::Available,
            current_emergency_id: None,
            current_location: None,
            active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Whether this vehicle is eligible for a dispatch claim.
    pub fn is_claimable(&self) -> bool {
        self.active && self.status == AmbulanceStatus::Available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ambulance_is_claimable() {
        let ambulance = Ambulance::new("MEDIC-7".into(), "hospital-1".into());
        assert!(ambulance.is_claimable());
        assert!(ambulance.current_emergency_id.is_none());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            AmbulanceStatus::Available,
            AmbulanceStatus::OnDuty,
            AmbulanceStatus::InMaintenance,
            AmbulanceStatus::Unavailable,
        ] {
            assert_eq!(AmbulanceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AmbulanceStatus::parse("parked"), None);
    }

    #[test]
    fn test_not_claimable_when_inactive() {
        let mut ambulance = Ambulance::new("MEDIC-7".into(), "hospital-1".into());
        ambulance.active = false;
        assert!(!ambulance.is_claimable());
    }
}
