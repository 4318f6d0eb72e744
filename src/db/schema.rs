//! Database schema definitions

use rusqlite::{params, Connection};
use tracing::info;

use crate::lifecycle::access::{
    PERMISSION_CREATE, PERMISSION_MANAGE, PERMISSION_READ, PERMISSION_VERIFY,
};
use crate::types::Result;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Built-in role ids
pub const ROLE_ADMIN: &str = "role-admin";
pub const ROLE_STUDENT: &str = "role-student";
pub const ROLE_LECTURER: &str = "role-lecturer";

/// Role names the directory maps onto principal kinds
pub const ROLE_NAME_ADMIN: &str = "Admin";
pub const ROLE_NAME_STUDENT: &str = "Student";
pub const ROLE_NAME_LECTURER: &str = "Lecturer";

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        seed_roles(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(AUTH_SCHEMA)?;
    conn.execute_batch(DIRECTORY_SCHEMA)?;
    conn.execute_batch(ACHIEVEMENT_SCHEMA)?;
    Ok(())
}

/// Built-in roles and the permissions each one carries
fn seed_roles(conn: &Connection) -> Result<()> {
    let roles = [
        (ROLE_ADMIN, ROLE_NAME_ADMIN, "Full access to all achievements"),
        (ROLE_STUDENT, ROLE_NAME_STUDENT, "Records and submits own achievements"),
        (ROLE_LECTURER, ROLE_NAME_LECTURER, "Verifies advisees' achievements"),
    ];
    for (id, name, description) in roles {
        conn.execute(
            "INSERT INTO roles (id, name, description) VALUES (?1, ?2, ?3)",
            params![id, name, description],
        )?;
    }

    let permissions = [
        (PERMISSION_CREATE, "achievements", "create"),
        (PERMISSION_READ, "achievements", "read"),
        (PERMISSION_VERIFY, "achievements", "verify"),
        (PERMISSION_MANAGE, "achievements", "manage"),
    ];
    for (name, resource, action) in permissions {
        conn.execute(
            "INSERT INTO permissions (id, name, resource, action) VALUES (?1, ?1, ?2, ?3)",
            params![name, resource, action],
        )?;
    }

    let grants = [
        (ROLE_ADMIN, PERMISSION_CREATE),
        (ROLE_ADMIN, PERMISSION_READ),
        (ROLE_ADMIN, PERMISSION_VERIFY),
        (ROLE_ADMIN, PERMISSION_MANAGE),
        (ROLE_STUDENT, PERMISSION_CREATE),
        (ROLE_STUDENT, PERMISSION_READ),
        (ROLE_LECTURER, PERMISSION_READ),
        (ROLE_LECTURER, PERMISSION_VERIFY),
    ];
    for (role_id, permission_id) in grants {
        conn.execute(
            "INSERT INTO role_permissions (role_id, permission_id) VALUES (?1, ?2)",
            params![role_id, permission_id],
        )?;
    }

    Ok(())
}

/// Roles, permissions and login accounts
const AUTH_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS roles (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT
);

CREATE TABLE IF NOT EXISTS permissions (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    resource TEXT NOT NULL,
    action TEXT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS role_permissions (
    role_id TEXT NOT NULL REFERENCES roles(id),
    permission_id TEXT NOT NULL REFERENCES permissions(id),
    PRIMARY KEY (role_id, permission_id)
);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    full_name TEXT NOT NULL,
    role_id TEXT NOT NULL REFERENCES roles(id),
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Students, lecturers and the advisor link between them
const DIRECTORY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS lecturers (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL UNIQUE REFERENCES users(id),
    lecturer_id TEXT NOT NULL UNIQUE,
    department TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS students (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL UNIQUE REFERENCES users(id),
    student_id TEXT NOT NULL UNIQUE,
    program_study TEXT NOT NULL DEFAULT '',
    academic_year TEXT NOT NULL DEFAULT '',
    advisor_id TEXT REFERENCES lecturers(id),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_students_advisor ON students(advisor_id);
"#;

/// Achievement reference rows; content lives in MongoDB
const ACHIEVEMENT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS achievement_references (
    id TEXT PRIMARY KEY,
    student_id TEXT NOT NULL REFERENCES students(id),
    mongo_achievement_id TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'draft'
        CHECK (status IN ('draft', 'submitted', 'verified', 'rejected', 'deleted')),
    submitted_at TEXT,
    verified_at TEXT,
    verified_by TEXT REFERENCES users(id),
    rejection_note TEXT,
    deleted_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_achievement_refs_student ON achievement_references(student_id);
CREATE INDEX IF NOT EXISTS idx_achievement_refs_status ON achievement_references(status);
"#;
