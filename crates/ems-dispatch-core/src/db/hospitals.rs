//! Hospital database operations, including the nearest-neighbor query.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::geo::{bounding_box, haversine_distance_m, GeoPoint};
use crate::models::Hospital;

impl Database {
    /// Insert a new hospital.
    pub fn insert_hospital(&self, hospital: &Hospital) -> DbResult<()> {
        let subscribers_json = serde_json::to_string(&hospital.subscribers)?;

        self.conn.execute(
            r#"
            INSERT INTO hospitals (
                hospital_id, name, lon, lat, address, active,
                subscribers, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                hospital.hospital_id,
                hospital.name,
                hospital.location.lon,
                hospital.location.lat,
                hospital.address,
                hospital.active as i64,
                subscribers_json,
                hospital.created_at,
                hospital.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a hospital by ID.
    pub fn get_hospital(&self, hospital_id: &str) -> DbResult<Option<Hospital>> {
        self.conn
            .query_row(
                r#"
                SELECT hospital_id, name, lon, lat, address, active,
                       subscribers, created_at, updated_at
                FROM hospitals
                WHERE hospital_id = ?
                "#,
                [hospital_id],
                map_hospital_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Activate or deactivate a hospital.
    pub fn set_hospital_active(&self, hospital_id: &str, active: bool) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE hospitals SET active = ?2, updated_at = datetime('now') WHERE hospital_id = ?1",
            params![hospital_id, active as i64],
        )?;
        Ok(rows_affected > 0)
    }

    /// Replace a hospital's notification subscriber list.
    pub fn set_hospital_subscribers(
        &self,
        hospital_id: &str,
        subscribers: &[String],
    ) -> DbResult<bool> {
        let subscribers_json = serde_json::to_string(subscribers)?;
        let rows_affected = self.conn.execute(
            "UPDATE hospitals SET subscribers = ?2, updated_at = datetime('now') WHERE hospital_id = ?1",
            params![hospital_id, subscribers_json],
        )?;
        Ok(rows_affected > 0)
    }

    /// Active hospitals within `max_radius_m` of `origin`, nearest first,
    /// with the exact great-circle distance in meters.
    ///
    /// The active filter and a coarse bounding box are pushed into the SQL
    /// scan; exact distance filtering and ordering happen on the fetched
    /// candidates.
    pub fn nearest_active_hospitals(
        &self,
        origin: GeoPoint,
        max_radius_m: f64,
    ) -> DbResult<Vec<(Hospital, f64)>> {
        let (min_lon, min_lat, max_lon, max_lat) = bounding_box(origin, max_radius_m);

        let mut stmt = self.conn.prepare(
            r#"
            SELECT hospital_id, name, lon, lat, address, active,
                   subscribers, created_at, updated_at
            FROM hospitals
            WHERE active = 1
              AND lon BETWEEN ?1 AND ?3
              AND lat BETWEEN ?2 AND ?4
            "#,
        )?;

        let rows = stmt.query_map(params![min_lon, min_lat, max_lon, max_lat], map_hospital_row)?;

        let mut candidates: Vec<(Hospital, f64)> = Vec::new();
        for row in rows {
            let hospital: Hospital = row?.try_into()?;
            let distance = haversine_distance_m(origin, hospital.location);
            if distance <= max_radius_m {
                candidates.push((hospital, distance));
            }
        }

        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(candidates)
    }
}

/// Intermediate row struct for database mapping.
struct HospitalRow {
    hospital_id: String,
    name: String,
    lon: f64,
    lat: f64,
    address: Option<String>,
    active: i64,
    subscribers: String,
    created_at: String,
    updated_at: String,
}

fn map_hospital_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HospitalRow> {
    Ok(HospitalRow {
        hospital_id: row.get(0)?,
        name: row.get(1)?,
        lon: row.get(2)?,
        lat: row.get(3)?,
        address: row.get(4)?,
        active: row.get(5)?,
        subscribers: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl TryFrom<HospitalRow> for Hospital {
    type Error = DbError;

    fn try_from(row: HospitalRow) -> Result<Self, Self::Error> {
        let subscribers: Vec<String> = serde_json::from_str(&row.subscribers)?;

        Ok(Hospital {
            hospital_id: row.hospital_id,
            name: row.name,
            location: GeoPoint::new(row.lon, row.lat),
            address: row.address,
            active: row.active != 0,
            subscribers,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
