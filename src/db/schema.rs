//! SQLite schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::db::sql_err;
use crate::error::StoreError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(sql_err("Failed to create schema_version table"))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StoreError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(sql_err("Failed to clear schema_version"))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(sql_err("Failed to set schema_version"))?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(REFERENCES_SCHEMA)
        .map_err(sql_err("Failed to create reference tables"))?;

    conn.execute_batch(DIRECTORY_SCHEMA)
        .map_err(sql_err("Failed to create directory tables"))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(sql_err("Failed to create indexes"))?;

    Ok(())
}

fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), StoreError> {
    // v1 is the first released schema; nothing older exists in the field
    info!("No migration steps registered from v{}", from_version);
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Workflow rows, one per content document
const REFERENCES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS achievement_references (
    id TEXT PRIMARY KEY,
    student_id TEXT NOT NULL,
    content_id TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'draft'
        CHECK (status IN ('draft', 'submitted', 'verified', 'rejected', 'deleted')),
    submitted_at TEXT,
    verified_at TEXT,
    verified_by TEXT,
    rejection_note TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Student and lecturer profiles read by the directory resolver
const DIRECTORY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS students (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL UNIQUE,
    student_number TEXT NOT NULL,
    full_name TEXT NOT NULL,
    program_study TEXT NOT NULL DEFAULT '',
    advisor_id TEXT
);

CREATE TABLE IF NOT EXISTS lecturers (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL UNIQUE,
    lecturer_number TEXT NOT NULL,
    full_name TEXT NOT NULL,
    department TEXT NOT NULL DEFAULT ''
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_references_student ON achievement_references(student_id);
CREATE INDEX IF NOT EXISTS idx_references_status ON achievement_references(status);
CREATE INDEX IF NOT EXISTS idx_references_created ON achievement_references(created_at);
CREATE INDEX IF NOT EXISTS idx_students_advisor ON students(advisor_id);
"#;
