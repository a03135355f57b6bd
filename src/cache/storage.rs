//! Storage Module
//!
//! Connection setup and table bootstrap for the cache table.

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;

/// How long a statement waits on another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// == Open Connection ==
/// Opens a connection to the database at `path` ready for concurrent use.
///
/// Writers from other threads or processes queue on the database lock for up
/// to [`BUSY_TIMEOUT`] instead of failing immediately.
pub fn open_connection(path: impl AsRef<Path>) -> Result<Connection> {
    let conn = attach_connection(path)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!(journal_mode = %mode, "Configured cache database");
    Ok(conn)
}

/// Opens a connection to a database already set up by [`open_connection`].
///
/// The journal mode is stored in the database file, so only the
/// per-connection settings are applied here.
pub(crate) fn attach_connection(path: impl AsRef<Path>) -> Result<Connection> {
    let conn = Connection::open(path.as_ref())?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

// == Table Names ==
/// Quotes a table name so names with spaces or quotes are safe in SQL.
pub fn quote_table_name(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// == Create Table ==
/// Creates the cache table if it does not exist yet.
pub(crate) fn create_table(conn: &Connection, table: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            cache_key VARCHAR(250) NOT NULL PRIMARY KEY,
            value BLOB NOT NULL,
            expires BIGINT NOT NULL
        )",
        table
    ))?;
    Ok(())
}
