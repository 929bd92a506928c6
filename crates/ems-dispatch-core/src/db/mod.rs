//! Database layer for the dispatch core.
//!
//! Ambulance claim/release and emergency transitions go through conditional
//! updates keyed on the expected prior state; plain read-then-write against
//! these tables is forbidden.

mod schema;
mod hospitals;
mod ambulances;
mod emergencies;

pub use schema::*;
#[allow(unused_imports)]
pub use hospitals::*;
#[allow(unused_imports)]
pub use ambulances::*;
pub use emergencies::*;

use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema and connection settings.
    fn initialize(&self) -> DbResult<()> {
        // Writers from other connections wait instead of failing immediately
        self.conn.busy_timeout(Duration::from_secs(5))?;
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        // Check that tables exist
        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"hospitals".to_string()));
        assert!(tables.contains(&"ambulances".to_string()));
        assert!(tables.contains(&"emergencies".to_string()));
    }
}
