//! Small rusqlite helpers shared by every SQLite user in the crate.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;

use crate::core::error::AppError;

/// Open a file-backed connection with WAL, foreign keys and a 5 s busy timeout.
/// `label` prefixes every error message (`"memory"`, `"database"`, …).
pub(crate) fn open_conn(db_path: &Path, label: &str) -> Result<Connection, AppError> {
    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Memory(format!("{label}: open {}: {e}", db_path.display())))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| AppError::Memory(format!("{label}: set journal_mode WAL: {e}")))?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| AppError::Memory(format!("{label}: set foreign_keys ON: {e}")))?;
    conn.pragma_update(None, "busy_timeout", 5000)
        .map_err(|e| AppError::Memory(format!("{label}: set busy_timeout: {e}")))?;

    Ok(conn)
}

/// Current UTC time as RFC 3339 with second precision, e.g. `"2025-04-01T12:00:00Z"`.
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Turn free text into an FTS5 `MATCH` expression.
///
/// Every whitespace token is quoted (internal quotes doubled) so FTS5
/// operators in user text stay literal. Tokens are joined with `OR` so a
/// passage matching any term ranks; bm25 orders by how many match.
pub(crate) fn fts5_any_terms(query: &str) -> String {
    query
        .split_whitespace()
        .map(|tok| tok.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|tok| !tok.is_empty())
        .map(|tok| format!("\"{}\"", tok.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}
