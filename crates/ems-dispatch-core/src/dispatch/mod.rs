//! Dispatch engine: hospital selection, ambulance claim, ETA.
//!
//! Flow: intake → nearest active hospital → atomic ambulance claim →
//! route estimate → persisted outcome → notification fan-out. Allocation is
//! greedy per request; priority is stored but never consulted.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::db::{Database, DbError};
use crate::geo::{GeoPoint, LocationFix};
use crate::models::{Emergency, EmergencyLocation, EmergencyStatus, Priority};
use crate::notify::{NotificationDispatcher, TransitionEvent};
use crate::routing::RouteEstimator;

/// Tunables for the engine.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Hospital candidate search radius in meters
    pub hospital_search_radius_m: f64,
    /// Hard time budget for a route estimate
    pub eta_budget: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            hospital_search_radius_m: 20_000.0,
            eta_budget: Duration::from_secs(1),
        }
    }
}

/// Dispatch errors.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("No active hospital within {0:.0} m of the emergency location")]
    NoHospitalAvailable(f64),

    #[error("Concurrent update detected; retry against current state")]
    ConcurrentConflict,

    #[error("Ambulance not found: {0}")]
    AmbulanceNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// What the engine managed to do for a new request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Hospital and ambulance assigned
    Dispatched,
    /// Hospital assigned, no vehicle free; a degraded success, not an error
    PendingNoAmbulance,
}

/// An inbound emergency request.
#[derive(Debug, Clone)]
pub struct EmergencyRequest {
    pub patient_ref: String,
    pub location: EmergencyLocation,
    pub priority: Priority,
    /// Contact user refs to notify alongside the patient
    pub emergency_contacts: Vec<String>,
}

/// The central allocator. Collaborators are injected so tests can substitute
/// fakes.
pub struct DispatchEngine<'a> {
    db: &'a mut Database,
    estimator: &'a dyn RouteEstimator,
    notifications: &'a NotificationDispatcher,
    config: DispatchConfig,
}

impl<'a> DispatchEngine<'a> {
    pub fn new(
        db: &'a mut Database,
        estimator: &'a dyn RouteEstimator,
        notifications: &'a NotificationDispatcher,
    ) -> Self {
        Self::with_config(db, estimator, notifications, DispatchConfig::default())
    }

    pub fn with_config(
        db: &'a mut Database,
        estimator: &'a dyn RouteEstimator,
        notifications: &'a NotificationDispatcher,
        config: DispatchConfig,
    ) -> Self {
        Self {
            db,
            estimator,
            notifications,
            config,
        }
    }

    /// Create an emergency: pick the nearest hospital, try to reserve an
    /// ambulance, compute an ETA, persist, notify.
    ///
    /// Fails with `NoHospitalAvailable` before anything is persisted; an
    /// unreachable geo index degrades to the same outcome. No free ambulance
    /// leaves the emergency `Pending` for a later retry.
    pub fn create_emergency(
        &mut self,
        request: EmergencyRequest,
    ) -> DispatchResult<(Emergency, DispatchOutcome)> {
        let radius = self.config.hospital_search_radius_m;
        let candidates = match self.db.nearest_active_hospitals(request.location.point, radius) {
            Ok(candidates) => candidates,
            Err(e) => {
                // Degraded operation: treat an unreachable index as "no
                // candidates" rather than failing the intake path outright
                warn!(error = %e, "hospital index unavailable");
                Vec::new()
            }
        };

        let Some((hospital, distance_m)) = candidates.into_iter().next() else {
            return Err(DispatchError::NoHospitalAvailable(radius));
        };

        let mut emergency = Emergency::new(
            request.patient_ref,
            request.location,
            request.priority,
            hospital.hospital_id.clone(),
            request.emergency_contacts,
        );
        self.db.insert_emergency(&emergency)?;
        info!(
            emergency_id = %emergency.emergency_id,
            hospital_id = %hospital.hospital_id,
            distance_m = distance_m as i64,
            priority = emergency.priority.as_str(),
            "emergency created"
        );

        let mut driver_ref = None;
        let outcome = match self
            .db
            .claim_available_ambulance(&hospital.hospital_id, &emergency.emergency_id)?
        {
            Some(ambulance) => {
                emergency.status = EmergencyStatus::Dispatched;
                emergency.ambulance_id = Some(ambulance.ambulance_id.clone());
                emergency.append_timeline(
                    EmergencyStatus::Dispatched,
                    ambulance.current_location.as_ref().map(|f| f.point),
                    Some(format!("Ambulance {} dispatched", ambulance.call_sign)),
                    None,
                );

                if let Some(fix) = &ambulance.current_location {
                    self.estimate_arrival(&mut emergency, fix.point);
                }
                emergency.updated_at = chrono::Utc::now().to_rfc3339();

                if !self.db.update_emergency_checked(&emergency, 0)? {
                    // Someone mutated the freshly created record under us.
                    // Free the vehicle again and surface a retryable conflict.
                    self.db
                        .release_ambulance(&ambulance.ambulance_id, &emergency.emergency_id)?;
                    return Err(DispatchError::ConcurrentConflict);
                }
                emergency.version += 1;

                info!(
                    emergency_id = %emergency.emergency_id,
                    ambulance_id = %ambulance.ambulance_id,
                    "ambulance dispatched"
                );
                driver_ref = ambulance.driver_ref;
                DispatchOutcome::Dispatched
            }
            None => {
                info!(
                    emergency_id = %emergency.emergency_id,
                    hospital_id = %hospital.hospital_id,
                    "no ambulance available, emergency stays pending"
                );
                DispatchOutcome::PendingNoAmbulance
            }
        };

        let event = TransitionEvent::from_emergency(&emergency, driver_ref);
        self.notifications.notify_new_emergency(self.db, &event);

        Ok((emergency, outcome))
    }

    /// Record a vehicle position report and emit a location update scoped to
    /// the emergency currently holding the vehicle, if any.
    pub fn report_ambulance_location(
        &mut self,
        ambulance_id: &str,
        point: GeoPoint,
    ) -> DispatchResult<()> {
        let fix = LocationFix::now(point);
        if !self.db.record_ambulance_location(ambulance_id, &fix)? {
            return Err(DispatchError::AmbulanceNotFound(ambulance_id.to_string()));
        }

        let ambulance = self
            .db
            .get_ambulance(ambulance_id)?
            .ok_or_else(|| DispatchError::AmbulanceNotFound(ambulance_id.to_string()))?;

        if let Some(emergency_id) = &ambulance.current_emergency_id {
            if let Some(emergency) = self.db.get_emergency(emergency_id)? {
                self.notifications.notify_ambulance_location(
                    emergency_id,
                    &emergency.patient_ref,
                    ambulance_id,
                    point,
                );
            }
        }
        Ok(())
    }

    /// Consult the estimator within the budget. Any failure is logged and
    /// leaves the ETA unset; the dispatch proceeds regardless.
    fn estimate_arrival(&self, emergency: &mut Emergency, origin: GeoPoint) {
        match self
            .estimator
            .estimate(origin, emergency.location.point, self.config.eta_budget)
        {
            Ok(duration) => match chrono::Duration::from_std(duration) {
                Ok(delta) => {
                    emergency.estimated_arrival_at =
                        Some((chrono::Utc::now() + delta).to_rfc3339());
                }
                Err(_) => {
                    warn!(
                        emergency_id = %emergency.emergency_id,
                        "route estimate out of range, leaving ETA unset"
                    );
                }
            },
            Err(e) => {
                warn!(
                    emergency_id = %emergency.emergency_id,
                    error = %e,
                    "route estimate unavailable, leaving ETA unset"
                );
            }
        }
    }
}
