//! Ambulance database operations.
//!
//! The claim/release statements here are the only legal writers of
//! `status` and `current_emergency_id`. Every one of them is a conditional
//! update keyed on the expected prior state, so at most one caller can win a
//! claim even across concurrent connections.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::geo::{GeoPoint, LocationFix};
use crate::models::{Ambulance, AmbulanceStatus};

impl Database {
    /// Insert a new ambulance.
    pub fn insert_ambulance(&self, ambulance: &Ambulance) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO ambulances (
                ambulance_id, call_sign, hospital_id, driver_ref, status,
                current_emergency_id, lon, lat, location_at, active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                ambulance.ambulance_id,
                ambulance.call_sign,
                ambulance.hospital_id,
                ambulance.driver_ref,
                ambulance.status.as_str(),
                ambulance.current_emergency_id,
                ambulance.current_location.as_ref().map(|f| f.point.lon),
                ambulance.current_location.as_ref().map(|f| f.point.lat),
                ambulance.current_location.as_ref().map(|f| f.recorded_at.clone()),
                ambulance.active as i64,
                ambulance.created_at,
                ambulance.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get an ambulance by ID.
    pub fn get_ambulance(&self, ambulance_id: &str) -> DbResult<Option<Ambulance>> {
        self.conn
            .query_row(
                &format!("{SELECT_AMBULANCE} WHERE ambulance_id = ?"),
                [ambulance_id],
                map_ambulance_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get the ambulance currently claimed by an emergency, if any.
    pub fn get_ambulance_for_emergency(&self, emergency_id: &str) -> DbResult<Option<Ambulance>> {
        self.conn
            .query_row(
                &format!("{SELECT_AMBULANCE} WHERE current_emergency_id = ?"),
                [emergency_id],
                map_ambulance_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List all ambulances of a hospital.
    pub fn list_ambulances_for_hospital(&self, hospital_id: &str) -> DbResult<Vec<Ambulance>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_AMBULANCE} WHERE hospital_id = ? ORDER BY call_sign"))?;

        let rows = stmt.query_map([hospital_id], map_ambulance_row)?;

        let mut ambulances = Vec::new();
        for row in rows {
            ambulances.push(row?.try_into()?);
        }
        Ok(ambulances)
    }

    /// Atomically claim one available ambulance of `hospital_id` for
    /// `emergency_id`.
    ///
    /// Single conditional UPDATE with a correlated subquery: under concurrent
    /// claims for the same hospital each vehicle is won by at most one
    /// caller. Returns the claimed ambulance, or `None` when the hospital has
    /// no available vehicle (a valid outcome, not an error).
    pub fn claim_available_ambulance(
        &self,
        hospital_id: &str,
        emergency_id: &str,
    ) -> DbResult<Option<Ambulance>> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE ambulances
            SET status = 'on_duty',
                current_emergency_id = ?2,
                updated_at = datetime('now')
            WHERE ambulance_id = (
                SELECT ambulance_id FROM ambulances
                WHERE hospital_id = ?1 AND status = 'available' AND active = 1
                ORDER BY location_at IS NULL, updated_at
                LIMIT 1
            )
            AND status = 'available'
            "#,
            params![hospital_id, emergency_id],
        )?;

        if rows_affected == 0 {
            return Ok(None);
        }
        self.get_ambulance_for_emergency(emergency_id)
    }

    /// Idempotent conditional claim of a specific ambulance (manual
    /// re-dispatch path).
    ///
    /// Succeeds when the vehicle is available or already held by this same
    /// emergency; returns `false` otherwise.
    pub fn reclaim_ambulance(&self, ambulance_id: &str, emergency_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE ambulances
            SET status = 'on_duty',
                current_emergency_id = ?2,
                updated_at = datetime('now')
            WHERE ambulance_id = ?1 AND active = 1
              AND (status = 'available' OR current_emergency_id = ?2)
            "#,
            params![ambulance_id, emergency_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Release an ambulance back into the dispatch pool.
    ///
    /// Conditional on the back-reference: a stale release can never free a
    /// vehicle that has since been claimed by another emergency.
    pub fn release_ambulance(&self, ambulance_id: &str, emergency_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE ambulances
            SET status = 'available',
                current_emergency_id = NULL,
                updated_at = datetime('now')
            WHERE ambulance_id = ?1 AND current_emergency_id = ?2
            "#,
            params![ambulance_id, emergency_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Record a vehicle position report. The only writer of the location
    /// columns.
    pub fn record_ambulance_location(&self, ambulance_id: &str, fix: &LocationFix) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE ambulances
            SET lon = ?2, lat = ?3, location_at = ?4, updated_at = datetime('now')
            WHERE ambulance_id = ?1
            "#,
            params![ambulance_id, fix.point.lon, fix.point.lat, fix.recorded_at],
        )?;
        Ok(rows_affected > 0)
    }

    /// Administrative availability change (maintenance, out of service).
    ///
    /// Refuses to touch an on-duty vehicle and cannot be used to claim one;
    /// those paths go through claim/release exclusively.
    pub fn set_ambulance_availability(
        &self,
        ambulance_id: &str,
        status: AmbulanceStatus,
    ) -> DbResult<bool> {
        if status == AmbulanceStatus::OnDuty {
            return Err(DbError::Constraint(
                "On-duty is set by the dispatch claim, not administratively".into(),
            ));
        }
        let rows_affected = self.conn.execute(
            r#"
            UPDATE ambulances
            SET status = ?2, updated_at = datetime('now')
            WHERE ambulance_id = ?1 AND status != 'on_duty'
            "#,
            params![ambulance_id, status.as_str()],
        )?;
        Ok(rows_affected > 0)
    }
}

const SELECT_AMBULANCE: &str = r#"
    SELECT ambulance_id, call_sign, hospital_id, driver_ref, status,
           current_emergency_id, lon, lat, location_at, active,
           created_at, updated_at
    FROM ambulances
"#;

/// Intermediate row struct for database mapping.
struct AmbulanceRow {
    ambulance_id: String,
    call_sign: String,
    hospital_id: String,
    driver_ref: Option<String>,
    status: String,
    current_emergency_id: Option<String>,
    lon: Option<f64>,
    lat: Option<f64>,
    location_at: Option<String>,
    active: i64,
    created_at: String,
    updated_at: String,
}

fn map_ambulance_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AmbulanceRow> {
    Ok(AmbulanceRow {
        ambulance_id: row.get(0)?,
        call_sign: row.get(1)?,
        hospital_id: row.get(2)?,
        driver_ref: row.get(3)?,
        status: row.get(4)?,
        current_emergency_id: row.get(5)?,
        lon: row.get(6)?,
        lat: row.get(7)?,
        location_at: row.get(8)?,
        active: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl TryFrom<AmbulanceRow> for Ambulance {
    type Error = DbError;

    fn try_from(row: AmbulanceRow) -> Result<Self, Self::Error> {
        let status = AmbulanceStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown ambulance status: {}", row.status)))?;

        let current_location = match (row.lon, row.lat, row.location_at) {
            (Some(lon), Some(lat), Some(recorded_at)) => Some(LocationFix {
                point: GeoPoint::new(lon, lat),
                recorded_at,
            }),
            _ => None,
        };

        Ok(Ambulance {
            ambulance_id: row.ambulance_id,
            call_sign: row.call_sign,
            hospital_id: row.hospital_id,
            driver_ref: row.driver_ref,
            status,
            current_emergency_id: row.current_emergency_id,
            current_location,
            active: row.active != 0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Hospital;

    fn setup_db() -> (Database, Hospital) {
        let db = Database::open_in_memory().unwrap();
        let hospital = Hospital::new("General".into(), GeoPoint::new(13.40, 52.52));
        db.insert_hospital(&hospital).unwrap();
        (db, hospital)
    }

    #[test]
    fn test_insert_and_get_ambulance() {
        let (db, hospital) = setup_db();
        let mut ambulance = Ambulance::new("MEDIC-1".into(), hospital.hospital_id.clone());
        ambulance.driver_ref = Some("driver-1".into());
        db.insert_ambulance(&ambulance).unwrap();

        let retrieved = db.get_ambulance(&ambulance.ambulance_id).unwrap().unwrap();
        assert_eq!(retrieved.call_sign, "MEDIC-1");
        assert_eq!(retrieved.status, AmbulanceStatus::Available);
        assert_eq!(retrieved.driver_ref.as_deref(), Some("driver-1"));
    }

    #[test]
    fn test_claim_wins_once() {
        let (db, hospital) = setup_db();
        let ambulance = Ambulance::new("MEDIC-1".into(), hospital.hospital_id.clone());
        db.insert_ambulance(&ambulance).unwrap();

        let first = db
            .claim_available_ambulance(&hospital.hospital_id, "emergency-1")
            .unwrap();
        assert!(first.is_some());
        let claimed = first.unwrap();
        assert_eq!(claimed.status, AmbulanceStatus::OnDuty);
        assert_eq!(claimed.current_emergency_id.as_deref(), Some("emergency-1"));

        // Second claim finds no available vehicle
        let second = db
            .claim_available_ambulance(&hospital.hospital_id, "emergency-2")
            .unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_claim_skips_inactive_and_maintenance() {
        let (db, hospital) = setup_db();
        let mut inactive = Ambulance::new("MEDIC-1".into(), hospital.hospital_id.clone());
        inactive.active = false;
        db.insert_ambulance(&inactive).unwrap();

        let maintenance = Ambulance::new("MEDIC-2".into(), hospital.hospital_id.clone());
        db.insert_ambulance(&maintenance).unwrap();
        db.set_ambulance_availability(&maintenance.ambulance_id, AmbulanceStatus::InMaintenance)
            .unwrap();

        let claimed = db
            .claim_available_ambulance(&hospital.hospital_id, "emergency-1")
            .unwrap();
        assert!(claimed.is_none());
    }

    #[test]
    fn test_reclaim_is_idempotent() {
        let (db, hospital) = setup_db();
        let ambulance = Ambulance::new("MEDIC-1".into(), hospital.hospital_id.clone());
        db.insert_ambulance(&ambulance).unwrap();

        assert!(db.reclaim_ambulance(&ambulance.ambulance_id, "emergency-1").unwrap());
        // Same emergency again: still succeeds, nothing corrupted
        assert!(db.reclaim_ambulance(&ambulance.ambulance_id, "emergency-1").unwrap());
        // Another emergency cannot steal the vehicle
        assert!(!db.reclaim_ambulance(&ambulance.ambulance_id, "emergency-2").unwrap());

        let retrieved = db.get_ambulance(&ambulance.ambulance_id).unwrap().unwrap();
        assert_eq!(retrieved.current_emergency_id.as_deref(), Some("emergency-1"));
    }

    #[test]
    fn test_release_requires_matching_emergency() {
        let (db, hospital) = setup_db();
        let ambulance = Ambulance::new("MEDIC-1".into(), hospital.hospital_id.clone());
        db.insert_ambulance(&ambulance).unwrap();
        db.reclaim_ambulance(&ambulance.ambulance_id, "emergency-1").unwrap();

        // Stale release from a different emergency is a no-op
        assert!(!db.release_ambulance(&ambulance.ambulance_id, "emergency-2").unwrap());
        assert!(db.release_ambulance(&ambulance.ambulance_id, "emergency-1").unwrap());

        let retrieved = db.get_ambulance(&ambulance.ambulance_id).unwrap().unwrap();
        assert_eq!(retrieved.status, AmbulanceStatus::Available);
        assert!(retrieved.current_emergency_id.is_none());
    }

    #[test]
    fn test_record_location() {
        let (db, hospital) = setup_db();
        let ambulance = Ambulance::new("MEDIC-1".into(), hospital.hospital_id.clone());
        db.insert_ambulance(&ambulance).unwrap();

        let fix = LocationFix::now(GeoPoint::new(13.41, 52.53));
        assert!(db.record_ambulance_location(&ambulance.ambulance_id, &fix).unwrap());

        let retrieved = db.get_ambulance(&ambulance.ambulance_id).unwrap().unwrap();
        let stored = retrieved.current_location.unwrap();
        assert_eq!(stored.point, fix.point);
    }

    #[test]
    fn test_availability_cannot_set_on_duty() {
        let (db, hospital) = setup_db();
        let ambulance = Ambulance::new("MEDIC-1".into(), hospital.hospital_id.clone());
        db.insert_ambulance(&ambulance).unwrap();

        let result = db.set_ambulance_availability(&ambulance.ambulance_id, AmbulanceStatus::OnDuty);
        assert!(matches!(result, Err(DbError::Constraint(_))));
    }

    #[test]
    fn test_availability_skips_on_duty_vehicle() {
        let (db, hospital) = setup_db();
        let ambulance = Ambulance::new("MEDIC-1".into(), hospital.hospital_id.clone());
        db.insert_ambulance(&ambulance).unwrap();
        db.reclaim_ambulance(&ambulance.ambulance_id, "emergency-1").unwrap();

        let changed = db
            .set_ambulance_availability(&ambulance.ambulance_id, AmbulanceStatus::InMaintenance)
            .unwrap();
        assert!(!changed);
    }
}
