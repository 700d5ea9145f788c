// Database migrations
use rusqlite::Connection;

use crate::error::{StoreError, StoreResult};

/// Highest schema version this build can open
pub const SCHEMA_VERSION: u32 = 1;

/// Name of the secondary index over `sound_files.bucket`
pub const BUCKET_INDEX: &str = "bucket";

/// Bring the database up to `requested`.
///
/// Creation is one-shot: a fresh database is built at version 1 in a single
/// transaction, an existing one at the same version is left untouched.
pub fn run_migrations(conn: &mut Connection, requested: u32) -> StoreResult<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if requested == 0 || requested > SCHEMA_VERSION || current > requested {
        return Err(StoreError::SchemaVersion {
            requested,
            current,
            supported: SCHEMA_VERSION,
        });
    }
    if current == requested {
        return Ok(());
    }

    let tx = conn.transaction()?;

    // Create sound_files table
    tx.execute(
        "CREATE TABLE IF NOT EXISTS sound_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            bucket TEXT NOT NULL,
            name TEXT NOT NULL,
            mime_type TEXT,
            size INTEGER NOT NULL DEFAULT 0,
            last_modified INTEGER,
            bytes BLOB NOT NULL
        )",
        [],
    )?;

    // Non-unique index used by every bucket scan
    tx.execute(
        &format!(
            "CREATE INDEX IF NOT EXISTS {} ON sound_files(bucket, id)",
            BUCKET_INDEX
        ),
        [],
    )?;

    tx.pragma_update(None, "user_version", requested)?;
    tx.commit()?;

    Ok(())
}
