//! Emergency database operations and the atomic transition commit.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::geo::GeoPoint;
use crate::models::{Emergency, EmergencyLocation, EmergencyStatus, Priority, TimelineEntry};

/// Ambulance side effect applied with an emergency update in one atomic unit.
#[derive(Debug, Clone, Copy)]
pub enum AmbulanceEffect<'a> {
    /// No vehicle mutation
    None,
    /// Idempotent conditional claim for the emergency being written
    Claim { ambulance_id: &'a str },
    /// Conditional release back into the dispatch pool
    Release { ambulance_id: &'a str },
}

impl Database {
    /// Insert a new emergency.
    pub fn insert_emergency(&self, emergency: &Emergency) -> DbResult<()> {
        let timeline_json = serde_json::to_string(&emergency.timeline)?;
        let contacts_json = serde_json::to_string(&emergency.emergency_contacts)?;

        self.conn.execute(
            r#"
            INSERT INTO emergencies (
                emergency_id, patient_ref, lon, lat, address, details,
                hospital_id, ambulance_id, status, priority, timeline,
                emergency_contacts, estimated_arrival_at, actual_arrival_at,
                completed_at, version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
            params![
                emergency.emergency_id,
                emergency.patient_ref,
                emergency.location.point.lon,
                emergency.location.point.lat,
                emergency.location.address,
                emergency.location.details,
                emergency.hospital_id,
                emergency.ambulance_id,
                emergency.status.as_str(),
                emergency.priority.as_str(),
                timeline_json,
                contacts_json,
                emergency.estimated_arrival_at,
                emergency.actual_arrival_at,
                emergency.completed_at,
                emergency.version,
                emergency.created_at,
                emergency.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get an emergency by ID.
    pub fn get_emergency(&self, emergency_id: &str) -> DbResult<Option<Emergency>> {
        self.conn
            .query_row(
                &format!("{SELECT_EMERGENCY} WHERE emergency_id = ?"),
                [emergency_id],
                map_emergency_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List emergencies by status, newest first.
    pub fn list_emergencies_by_status(&self, status: EmergencyStatus) -> DbResult<Vec<Emergency>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_EMERGENCY} WHERE status = ? ORDER BY created_at DESC"
        ))?;

        let rows = stmt.query_map([status.as_str()], map_emergency_row)?;

        let mut emergencies = Vec::new();
        for row in rows {
            emergencies.push(row?.try_into()?);
        }
        Ok(emergencies)
    }

    /// List all emergencies of a patient, newest first.
    pub fn list_emergencies_for_patient(&self, patient_ref: &str) -> DbResult<Vec<Emergency>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_EMERGENCY} WHERE patient_ref = ? ORDER BY created_at DESC"
        ))?;

        let rows = stmt.query_map([patient_ref], map_emergency_row)?;

        let mut emergencies = Vec::new();
        for row in rows {
            emergencies.push(row?.try_into()?);
        }
        Ok(emergencies)
    }

    /// Conditionally update an emergency, guarded by the version counter.
    ///
    /// Writes `version = expected_version + 1`; returns `false` when another
    /// writer committed first (the caller should retry against fresh state).
    pub fn update_emergency_checked(
        &self,
        emergency: &Emergency,
        expected_version: i64,
    ) -> DbResult<bool> {
        let rows_affected = execute_checked_update(&self.conn, emergency, expected_version)?;
        Ok(rows_affected > 0)
    }

    /// Apply an emergency update and its ambulance side effect as a single
    /// atomic unit.
    ///
    /// A version conflict rolls everything back and returns `false`; a
    /// non-claimable vehicle on the `Claim` path rolls back with a
    /// constraint error. Either way no partial state is ever visible.
    pub fn commit_transition(
        &mut self,
        emergency: &Emergency,
        expected_version: i64,
        effect: AmbulanceEffect<'_>,
    ) -> DbResult<bool> {
        let tx = self.conn.transaction()?;

        let rows_affected = execute_checked_update(&tx, emergency, expected_version)?;
        if rows_affected == 0 {
            // Drop rolls the transaction back
            return Ok(false);
        }

        match effect {
            AmbulanceEffect::None => {}
            AmbulanceEffect::Claim { ambulance_id } => {
                let claimed = tx.execute(
                    r#"
                    UPDATE ambulances
                    SET status = 'on_duty',
                        current_emergency_id = ?2,
                        updated_at = datetime('now')
                    WHERE ambulance_id = ?1 AND active = 1
                      AND (status = 'available' OR current_emergency_id = ?2)
                    "#,
                    params![ambulance_id, emergency.emergency_id],
                )?;
                if claimed == 0 {
                    return Err(DbError::Constraint(format!(
                        "Ambulance {} is not claimable",
                        ambulance_id
                    )));
                }
            }
            AmbulanceEffect::Release { ambulance_id } => {
                // Conditional on the back-reference; zero rows means the
                // vehicle was already released, which is fine
                tx.execute(
                    r#"
                    UPDATE ambulances
                    SET status = 'available',
                        current_emergency_id = NULL,
                        updated_at = datetime('now')
                    WHERE ambulance_id = ?1 AND current_emergency_id = ?2
                    "#,
                    params![ambulance_id, emergency.emergency_id],
                )?;
            }
        }

        tx.commit()?;
        Ok(true)
    }
}

fn execute_checked_update(
    conn: &rusqlite::Connection,
    emergency: &Emergency,
    expected_version: i64,
) -> DbResult<usize> {
    let timeline_json = serde_json::to_string(&emergency.timeline)?;

    let rows_affected = conn.execute(
        r#"
        UPDATE emergencies SET
            ambulance_id = ?2,
            status = ?3,
            timeline = ?4,
            estimated_arrival_at = ?5,
            actual_arrival_at = ?6,
            completed_at = ?7,
            version = ?8 + 1,
            updated_at = ?9
        WHERE emergency_id = ?1 AND version = ?8
        "#,
        params![
            emergency.emergency_id,
            emergency.ambulance_id,
            emergency.status.as_str(),
            timeline_json,
            emergency.estimated_arrival_at,
            emergency.actual_arrival_at,
            emergency.completed_at,
            expected_version,
            emergency.updated_at,
        ],
    )?;
    Ok(rows_affected)
}

const SELECT_EMERGENCY: &str = r#"
    SELECT emergency_id, patient_ref, lon, lat, address, details,
           hospital_id, ambulance_id, status, priority, timeline,
           emergency_contacts, estimated_arrival_at, actual_arrival_at,
           completed_at, version, created_at, updated_at
    FROM emergencies
"#;

/// Intermediate row struct for database mapping.
struct EmergencyRow {
    emergency_id: String,
    patient_ref: String,
    lon: f64,
    lat: f64,
    address: Option<String>,
    details: Option<String>,
    hospital_id: String,
    ambulance_id: Option<String>,
    status: String,
    priority: String,
    timeline: String,
    emergency_contacts: String,
    estimated_arrival_at: Option<String>,
    actual_arrival_at: Option<String>,
    completed_at: Option<String>,
    version: i64,
    created_at: String,
    updated_at: String,
}

fn map_emergency_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EmergencyRow> {
    Ok(EmergencyRow {
        emergency_id: row.get(0)?,
        patient_ref: row.get(1)?,
        lon: row.get(2)?,
        lat: row.get(3)?,
        address: row.get(4)?,
        details: row.get(5)?,
        hospital_id: row.get(6)?,
        ambulance_id: row.get(7)?,
        status: row.get(8)?,
        priority: row.get(9)?,
        timeline: row.get(10)?,
        emergency_contacts: row.get(11)?,
        estimated_arrival_at: row.get(12)?,
        actual_arrival_at: row.get(13)?,
        completed_at: row.get(14)?,
        version: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

impl TryFrom<EmergencyRow> for Emergency {
    type Error = DbError;

    fn try_from(row: EmergencyRow) -> Result<Self, Self::Error> {
        let status = EmergencyStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown emergency status: {}", row.status)))?;
        let priority = Priority::parse(&row.priority)
            .ok_or_else(|| DbError::Constraint(format!("Unknown priority: {}", row.priority)))?;
        let timeline: Vec<TimelineEntry> = serde_json::from_str(&row.timeline)?;
        let emergency_contacts: Vec<String> = serde_json::from_str(&row.emergency_contacts)?;

        Ok(Emergency {
            emergency_id: row.emergency_id,
            patient_ref: row.patient_ref,
            location: EmergencyLocation {
                point: GeoPoint::new(row.lon, row.lat),
                address: row.address,
                details: row.details,
            },
            hospital_id: row.hospital_id,
            ambulance_id: row.ambulance_id,
            status,
            priority,
            timeline,
            emergency_contacts,
            estimated_arrival_at: row.estimated_arrival_at,
            actual_arrival_at: row.actual_arrival_at,
            completed_at: row.completed_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
