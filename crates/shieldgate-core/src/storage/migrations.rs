//! Schema migrations for the shared store and the session log.
//!
//! Each database file carries a `schema_version` table. Migrations are
//! applied in order when a store is opened, inside one transaction per step,
//! so a process that dies mid-migration leaves the previous version intact.

use rusqlite::{Connection, Result as SqliteResult, Transaction, TransactionBehavior};

/// Latest schema version of the shared store database.
pub const SHARED_SCHEMA_VERSION: i32 = 2;

/// Latest schema version of the session log database.
pub const SESSIONS_SCHEMA_VERSION: i32 = 2;

/// Bring the shared store database up to [`SHARED_SCHEMA_VERSION`].
///
/// # Errors
/// Returns an error if a migration step fails.
pub fn migrate_shared(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;
    let current = get_schema_version(conn)?;

    if current < 1 {
        step(conn, 1, shared_v1)?;
    }
    if current < 2 {
        step(conn, 2, shared_v2)?;
    }
    Ok(())
}

/// Bring the session log database up to [`SESSIONS_SCHEMA_VERSION`].
///
/// # Errors
/// Returns an error if a migration step fails.
pub fn migrate_sessions(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;
    let current = get_schema_version(conn)?;

    if current < 1 {
        step(conn, 1, sessions_v1)?;
    }
    if current < 2 {
        step(conn, 2, sessions_v2)?;
    }
    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 for a fresh database.
fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

fn step(conn: &Connection, version: i32, apply: fn(&Connection) -> SqliteResult<()>) -> SqliteResult<()> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    apply(&tx)?;
    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    tx.commit()?;
    tracing::debug!(version, "applied schema migration");
    Ok(())
}

/// Shared v1: key/value blobs plus the single-slot pending request.
fn shared_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (
            key           TEXT PRIMARY KEY,
            value         TEXT NOT NULL,
            updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pending_request (
            slot            INTEGER PRIMARY KEY CHECK (slot = 0),
            target          BLOB NOT NULL,
            hint            TEXT NOT NULL DEFAULT '',
            requested_at_ms INTEGER NOT NULL
        );",
    )
}

/// Shared v2: usage-threshold watches registered with the host.
fn shared_v2(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS usage_watches (
            target           BLOB PRIMARY KEY,
            threshold_secs   INTEGER NOT NULL,
            registered_at_ms INTEGER NOT NULL
        );",
    )
}

/// Sessions v1: the unlock session log.
fn sessions_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS unlock_sessions (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            target         BLOB NOT NULL,
            granted_at_ms  INTEGER NOT NULL,
            expires_at_ms  INTEGER NOT NULL,
            completed_secs INTEGER NOT NULL,
            UNIQUE (target, granted_at_ms)
        );

        CREATE INDEX IF NOT EXISTS idx_unlock_sessions_target_granted
            ON unlock_sessions(target, granted_at_ms);
        CREATE INDEX IF NOT EXISTS idx_unlock_sessions_expires
            ON unlock_sessions(expires_at_ms);",
    )
}

/// Sessions v2: lock-down watermarks written by "relock everything".
fn sessions_v2(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS lockdowns (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            revoked_at_ms INTEGER NOT NULL
        );",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_migration_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate_sessions(&conn).unwrap();
        migrate_sessions(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SESSIONS_SCHEMA_VERSION);
    }

    #[test]
    fn sessions_v1_database_gains_lockdowns() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        step(&conn, 1, sessions_v1).unwrap();

        migrate_sessions(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM lockdowns", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(get_schema_version(&conn).unwrap(), 2);
    }

    #[test]
    fn shared_migration_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate_shared(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SHARED_SCHEMA_VERSION);
        conn.execute(
            "INSERT INTO pending_request (slot, target, hint, requested_at_ms) VALUES (0, x'01', '', 0)",
            [],
        )
        .unwrap();
        let second = conn.execute(
            "INSERT INTO pending_request (slot, target, hint, requested_at_ms) VALUES (1, x'01', '', 0)",
            [],
        );
        assert!(second.is_err());
    }

    #[test]
    fn shared_v1_database_gains_usage_watches() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        step(&conn, 1, shared_v1).unwrap();

        migrate_shared(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM usage_watches", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(get_schema_version(&conn).unwrap(), 2);
    }
}
