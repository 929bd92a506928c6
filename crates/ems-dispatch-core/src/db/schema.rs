//! SQLite schema definition.

/// Complete database schema for the dispatch core.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Hospitals (read-mostly reference data)
-- ============================================================================

CREATE TABLE IF NOT EXISTS hospitals (
    hospital_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    lon REAL NOT NULL,
    lat REAL NOT NULL,
    address TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    subscribers TEXT NOT NULL DEFAULT '[]',      -- JSON array of user refs
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_hospitals_active ON hospitals(active);
CREATE INDEX IF NOT EXISTS idx_hospitals_position ON hospitals(lat, lon);

-- ============================================================================
-- Ambulances (the only multi-writer shared resource)
-- ============================================================================

CREATE TABLE IF NOT EXISTS ambulances (
    ambulance_id TEXT PRIMARY KEY,
    call_sign TEXT NOT NULL,
    hospital_id TEXT NOT NULL REFERENCES hospitals(hospital_id),
    driver_ref TEXT,
    status TEXT NOT NULL DEFAULT 'available'
        CHECK (status IN ('available', 'on_duty', 'in_maintenance', 'unavailable')),
    current_emergency_id TEXT,
    lon REAL,
    lat REAL,
    location_at TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    -- On duty iff claimed by an emergency
    CHECK ((status = 'on_duty') = (current_emergency_id IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_ambulances_hospital_status ON ambulances(hospital_id, status);
CREATE INDEX IF NOT EXISTS idx_ambulances_emergency ON ambulances(current_emergency_id);

-- ============================================================================
-- Emergencies
-- ============================================================================

CREATE TABLE IF NOT EXISTS emergencies (
    emergency_id TEXT PRIMARY KEY,
    patient_ref TEXT NOT NULL,
    lon REAL NOT NULL,
    lat REAL NOT NULL,
    address TEXT,
    details TEXT,
    hospital_id TEXT NOT NULL REFERENCES hospitals(hospital_id),
    ambulance_id TEXT REFERENCES ambulances(ambulance_id),
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'dispatched', 'in_transit', 'completed', 'cancelled')),
    priority TEXT NOT NULL DEFAULT 'medium'
        CHECK (priority IN ('low', 'medium', 'high', 'critical')),
    timeline TEXT NOT NULL DEFAULT '[]',           -- JSON array of TimelineEntry
    emergency_contacts TEXT NOT NULL DEFAULT '[]', -- JSON array of user refs
    estimated_arrival_at TEXT,
    actual_arrival_at TEXT,
    completed_at TEXT,
    version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_emergencies_status ON emergencies(status);
CREATE INDEX IF NOT EXISTS idx_emergencies_patient ON emergencies(patient_ref);
CREATE INDEX IF NOT EXISTS idx_emergencies_hospital ON emergencies(hospital_id);

-- The timeline is an append-only audit trail
CREATE TRIGGER IF NOT EXISTS emergencies_timeline_append_only BEFORE UPDATE ON emergencies
WHEN json_array_length(new.timeline) < json_array_length(old.timeline)
BEGIN
    SELECT RAISE(ABORT, 'Timeline entries cannot be removed');
END;

-- Terminal statuses admit no further transitions
CREATE TRIGGER IF NOT EXISTS emergencies_terminal_lock BEFORE UPDATE OF status ON emergencies
WHEN old.status IN ('completed', 'cancelled') AND new.status != old.status
BEGIN
    SELECT RAISE(ABORT, 'Terminal emergency status cannot change');
END;
"#;
