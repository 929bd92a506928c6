//! Emergency state machine.
//!
//! Validates transitions against the status table, appends the timeline,
//! derives timestamps, and applies the ambulance side effect in the same
//! atomic unit. Notification fan-out happens strictly after commit.

use thiserror::Error;
use tracing::info;

use crate::db::{AmbulanceEffect, Database, DbError};
use crate::models::{Emergency, EmergencyStatus};
use crate::notify::{NotificationDispatcher, TransitionEvent};

/// Transition errors.
#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("Cannot transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: EmergencyStatus,
        to: EmergencyStatus,
    },

    #[error("Emergency not found: {0}")]
    NotFound(String),

    #[error("Concurrent update detected; retry against current state")]
    ConcurrentConflict,

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

pub type TransitionResult<T> = Result<T, TransitionError>;

/// Applies status transitions to emergencies.
pub struct EmergencyStateMachine<'a> {
    db: &'a mut Database,
    notifications: &'a NotificationDispatcher,
}

impl<'a> EmergencyStateMachine<'a> {
    pub fn new(db: &'a mut Database, notifications: &'a NotificationDispatcher) -> Self {
        Self { db, notifications }
    }

    /// Transition an emergency to `new_status`.
    ///
    /// The caller is assumed to be authorized already; `acting_user` is
    /// recorded on the timeline entry. On a version conflict nothing is
    /// applied and the caller gets a retryable `ConcurrentConflict`.
    pub fn transition(
        &mut self,
        emergency_id: &str,
        new_status: EmergencyStatus,
        notes: Option<String>,
        acting_user: &str,
    ) -> TransitionResult<Emergency> {
        let mut emergency = self
            .db
            .get_emergency(emergency_id)?
            .ok_or_else(|| TransitionError::NotFound(emergency_id.to_string()))?;

        let from = emergency.status;
        if !from.can_transition_to(new_status) {
            return Err(TransitionError::InvalidTransition {
                from,
                to: new_status,
            });
        }

        let expected_version = emergency.version;
        let ambulance = match &emergency.ambulance_id {
            Some(id) => self.db.get_ambulance(id)?,
            None => None,
        };

        // Timeline snapshot: ambulance position when assigned and known,
        // else the emergency's own location
        let snapshot = ambulance
            .as_ref()
            .and_then(|a| a.current_location.as_ref())
            .map(|f| f.point)
            .unwrap_or(emergency.location.point);

        // One timestamp for the whole transition: timeline entry, derived
        // fields, the committed row and the outgoing event all agree
        let now = chrono::Utc::now().to_rfc3339();
        emergency.append_timeline(
            new_status,
            Some(snapshot),
            notes,
            Some(acting_user.to_string()),
        );
        emergency.status = new_status;
        emergency.updated_at = now.clone();

        match new_status {
            EmergencyStatus::InTransit => {
                if emergency.actual_arrival_at.is_none() {
                    emergency.actual_arrival_at = Some(now);
                }
            }
            EmergencyStatus::Completed => {
                emergency.completed_at = Some(now);
            }
            _ => {}
        }

        let effect = match (new_status, &emergency.ambulance_id) {
            (EmergencyStatus::Completed | EmergencyStatus::Cancelled, Some(id)) => {
                AmbulanceEffect::Release { ambulance_id: id }
            }
            (EmergencyStatus::Dispatched, Some(id)) => {
                // Manual re-dispatch path; the claim is idempotent
                AmbulanceEffect::Claim { ambulance_id: id }
            }
            _ => AmbulanceEffect::None,
        };

        if !self.db.commit_transition(&emergency, expected_version, effect)? {
            return Err(TransitionError::ConcurrentConflict);
        }
        emergency.version += 1;

        info!(
            emergency_id = %emergency.emergency_id,
            from = from.as_str(),
            to = new_status.as_str(),
            acting_user,
            "emergency transitioned"
        );

        let event =
            TransitionEvent::from_emergency(&emergency, ambulance.and_then(|a| a.driver_ref));
        self.notifications.notify_status_update(self.db, &event);

        Ok(emergency)
    }
}
