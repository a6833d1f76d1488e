//! `database`: run one SQL statement against the configured SQLite file.
//!
//! Input that does not start with an SQL keyword is first translated by the
//! LLM, given the live schema from `sqlite_master`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, Error as SqlError, OpenFlags};
use tracing::{debug, warn};

use crate::core::config::DatabaseToolConfig;

use super::context::ToolContext;
use super::error::ToolError;

const FAILED: &str = "Failed to execute query";

const SQL_KEYWORDS: &[&str] = &[
    "select", "insert", "update", "delete", "replace", "create", "drop", "alter", "with",
    "pragma", "explain", "values", "attach", "detach", "vacuum", "analyze", "reindex",
    "begin", "commit", "rollback", "savepoint",
];

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const TRANSLATE_PROMPT: &str = "You translate requests into exactly one SQLite statement. \
Reply with the SQL only: no explanation, no markdown fences.";

#[derive(Debug, Clone)]
pub struct DatabaseTool {
    path: PathBuf,
    read_only: bool,
    max_rows: usize,
}

impl DatabaseTool {
    pub fn new(config: &DatabaseToolConfig) -> Self {
        Self { path: config.path.clone(), read_only: config.read_only, max_rows: config.max_rows }
    }

    pub async fn invoke(&self, input: &str, ctx: &ToolContext) -> Result<String, ToolError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ToolError::InvalidInput("empty query".into()));
        }

        let sql = if looks_like_sql(input) {
            input.to_string()
        } else {
            let path = self.path.clone();
            let read_only = self.read_only;
            let schema = blocking(move || read_schema(&path, read_only)).await?;
            let prompt = format!("Schema:\n{schema}\n\nRequest: {input}");
            let reply = ctx.complete(TRANSLATE_PROMPT, prompt).await?;
            let sql = strip_fences(&reply);
            debug!(%sql, "translated request to SQL");
            sql
        };

        let path = self.path.clone();
        let (read_only, max_rows) = (self.read_only, self.max_rows);
        let rendered = blocking(move || run_statement(&path, &sql, read_only, max_rows)).await?;
        Ok(format!("Executed query: {rendered}"))
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ToolError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ToolError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        warn!(error = %e, "database task join failed");
        ToolError::Backend(FAILED.into())
    })?
}

/// True when the first word is an SQL keyword.
pub fn looks_like_sql(input: &str) -> bool {
    let first = input
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    SQL_KEYWORDS.contains(&first.as_str())
}

/// Drop ```sql fences and surrounding whitespace from an LLM reply.
fn strip_fences(reply: &str) -> String {
    let trimmed = reply.trim();
    let inner = trimmed
        .strip_prefix("```")
        .map(|rest| {
            let rest = rest.strip_prefix("sql").or_else(|| rest.strip_prefix("SQL")).unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest)
        })
        .unwrap_or(trimmed);
    inner.trim().to_string()
}

/// Open the business database.  Read-only mode never creates the file and
/// leaves its journal mode alone.
fn open(path: &Path, read_only: bool) -> Result<Connection, ToolError> {
    let fail = |e: SqlError| {
        warn!(path = %path.display(), read_only, error = %e, "database open failed");
        ToolError::Backend(FAILED.into())
    };
    let conn = if read_only {
        Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX)
    } else {
        Connection::open(path)
    }
    .map_err(fail)?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(fail)?;
    Ok(conn)
}

fn read_schema(path: &Path, read_only: bool) -> Result<String, ToolError> {
    let conn = open(path, read_only)?;
    let fail = |e: SqlError| {
        warn!(error = %e, "reading schema failed");
        ToolError::Backend(FAILED.into())
    };
    let mut stmt = conn
        .prepare("SELECT sql FROM sqlite_master WHERE sql IS NOT NULL ORDER BY name")
        .map_err(fail)?;
    let ddl = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(fail)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(fail)?;
    Ok(if ddl.is_empty() { "(no tables)".to_string() } else { ddl.join(";\n") })
}

fn run_statement(path: &Path, sql: &str, read_only: bool, max_rows: usize) -> Result<String, ToolError> {
    let sql = sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    let conn = open(path, read_only)?;

    let mut stmt = match conn.prepare(sql) {
        Ok(stmt) => stmt,
        Err(SqlError::MultipleStatement) => {
            return Err(ToolError::Denied("exactly one SQL statement is allowed".into()));
        }
        Err(e) => {
            warn!(%sql, error = %e, "query preparation failed");
            return Err(ToolError::Backend(FAILED.into()));
        }
    };

    if read_only && !stmt.readonly() {
        return Err(ToolError::Denied("only read-only statements are allowed".into()));
    }

    let fail = |e: SqlError| {
        warn!(%sql, error = %e, "query execution failed");
        ToolError::Backend(FAILED.into())
    };

    if stmt.column_count() == 0 {
        let changed = stmt.execute([]).map_err(fail)?;
        return Ok(format!("{changed} row(s) affected"));
    }

    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let mut lines = vec![columns.join(" | ")];
    let mut rows = stmt.query([]).map_err(fail)?;
    let mut truncated = false;
    while let Some(row) = rows.next().map_err(fail)? {
        if lines.len() > max_rows {
            truncated = true;
            break;
        }
        let cells = (0..columns.len())
            .map(|i| row.get_ref(i).map(render_value))
            .collect::<Result<Vec<_>, _>>()
            .map_err(fail)?;
        lines.push(cells.join(" | "));
    }
    if truncated {
        lines.push(format!("... (truncated to {max_rows} rows)"));
    }
    Ok(lines.join("\n"))
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}
