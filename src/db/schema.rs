//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS dialogue_turns (
            id TEXT PRIMARY KEY,
            user_text TEXT NOT NULL,
            npc_reply_text TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        PRAGMA user_version = 1;
        ",
    )?;

    tracing::debug!("migrated database to v1");
    Ok(())
}
