//! Hospital models.

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// A hospital: geospatial anchor and ownership boundary for ambulances.
///
/// Read-mostly reference data within the dispatch core; creation and editing
/// happen administratively outside it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hospital {
    /// Unique hospital ID
    pub hospital_id: String,
    /// Display name
    pub name: String,
    /// Coordinates of the facility
    pub location: GeoPoint,
    /// Street address
    pub address: Option<String>,
    /// Inactive hospitals are excluded from dispatch candidate search
    pub active: bool,
    /// Staff user refs subscribed to hospital-scoped notifications
    pub subscribers: Vec<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Hospital {
    /// Create a new active hospital with required fields.
    pub fn new(name: String, location: GeoPoint) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            hospital_id: uuid::Uuid::new_v4().to_string(),
            name,
            location,
            address: None,
            active: true,
            subscribers: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_hospital() {
        let hospital = Hospital::new("St. Mary General".into(), GeoPoint::new(-0.17, 51.52));
        assert!(hospital.active);
        assert!(hospital.subscribers.is_empty());
        assert_eq!(hospital.hospital_id.len(), 36);
    }
}
