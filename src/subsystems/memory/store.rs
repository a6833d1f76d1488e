//! Conversation turn store: one SQLite table keyed by owner.
//!
//! All I/O is synchronous (blocking).  Call from a `spawn_blocking` context
//! when inside an async task.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};

use crate::core::error::AppError;
use crate::supervisor::bus::ConversationTurn;

use super::sqlite::{now_rfc3339, open_conn};

/// Schema version stored in `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone)]
pub struct ConversationStore {
    db_path: PathBuf,
    max_turns_per_owner: Option<usize>,
}

impl ConversationStore {
    /// Open (or create) `db_path` and make sure the schema exists.
    pub fn open(db_path: &Path, max_turns_per_owner: Option<usize>) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Memory(format!("memory: create {}: {e}", parent.display()))
            })?;
        }
        let conn = open_conn(db_path, "memory")?;
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .map_err(|e| AppError::Memory(format!("memory: read user_version: {e}")))?;
        if version < SCHEMA_VERSION {
            init_schema(&conn)?;
        }
        Ok(Self { db_path: db_path.to_path_buf(), max_turns_per_owner })
    }

    /// Insert one turn and apply retention. Returns the new turn id.
    ///
    /// No deduplication: identical appends produce distinct rows.
    pub fn append(&self, owner_id: i64, human: Option<&str>, ai: Option<&str>) -> Result<i64, AppError> {
        let mut conn = open_conn(&self.db_path, "memory")?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Memory(format!("memory: begin: {e}")))?;

        tx.execute(
            "INSERT INTO turns (owner_id, human, ai, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![owner_id, human, ai, now_rfc3339()],
        )
        .map_err(|e| AppError::Memory(format!("memory: insert turn: {e}")))?;
        let turn_id = tx.last_insert_rowid();

        if let Some(cap) = self.max_turns_per_owner {
            tx.execute(
                "DELETE FROM turns
                 WHERE owner_id = ?1
                   AND id NOT IN (
                       SELECT id FROM turns WHERE owner_id = ?1 ORDER BY id DESC LIMIT ?2
                   )",
                params![owner_id, cap as i64],
            )
            .map_err(|e| AppError::Memory(format!("memory: prune turns: {e}")))?;
        }

        tx.commit()
            .map_err(|e| AppError::Memory(format!("memory: commit: {e}")))?;
        Ok(turn_id)
    }

    /// Turns of `owner_id`, oldest first.
    ///
    /// `offset` skips that many of the newest turns; `limit` then keeps the
    /// most recent `limit` of what remains.
    pub fn list(
        &self,
        owner_id: i64,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, AppError> {
        let conn = open_conn(&self.db_path, "memory")?;
        let mut stmt = conn
            .prepare(
                "SELECT id, owner_id, human, ai, created_at FROM turns
                 WHERE owner_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2 OFFSET ?3",
            )
            .map_err(|e| AppError::Memory(format!("memory: prepare list: {e}")))?;

        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map_or(-1, |n| n as i64);
        let offset = offset.unwrap_or(0) as i64;

        let mut turns = stmt
            .query_map(params![owner_id, limit, offset], |row| {
                Ok(ConversationTurn {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    human: row.get(2)?,
                    ai: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .map_err(|e| AppError::Memory(format!("memory: list turns: {e}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Memory(format!("memory: read turn row: {e}")))?;

        turns.reverse();
        Ok(turns)
    }
}

fn init_schema(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS turns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            human TEXT,
            ai TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS turns_owner ON turns (owner_id, id);
        PRAGMA user_version = 1;
        ",
    )
    .map_err(|e| AppError::Memory(format!("memory: initialize schema: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(cap: Option<usize>) -> (TempDir, ConversationStore) {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::open(&dir.path().join("memory.db"), cap).unwrap();
        (dir, store)
    }

    fn humans(turns: &[ConversationTurn]) -> Vec<&str> {
        turns.iter().map(|t| t.human.as_deref().unwrap_or("")).collect()
    }

    #[test]
    fn identical_appends_are_not_deduplicated() {
        let (_dir, store) = store(None);
        let a = store.append(1, Some("hi"), Some("hello")).unwrap();
        let b = store.append(1, Some("hi"), Some("hello")).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.list(1, None, None).unwrap().len(), 2);
    }

    #[test]
    fn list_is_oldest_first_and_scoped_by_owner() {
        let (_dir, store) = store(None);
        store.append(1, Some("a"), None).unwrap();
        store.append(2, Some("other"), None).unwrap();
        store.append(1, Some("b"), Some("B")).unwrap();
        let turns = store.list(1, None, None).unwrap();
        assert_eq!(humans(&turns), ["a", "b"]);
        assert!(turns.iter().all(|t| t.owner_id == 1));
        assert_eq!(turns[1].ai.as_deref(), Some("B"));
    }

    #[test]
    fn limit_keeps_most_recent_and_offset_skips_newest() {
        let (_dir, store) = store(None);
        for h in ["1", "2", "3", "4", "5"] {
            store.append(7, Some(h), None).unwrap();
        }
        assert_eq!(humans(&store.list(7, Some(2), None).unwrap()), ["4", "5"]);
        assert_eq!(humans(&store.list(7, Some(2), Some(1)).unwrap()), ["3", "4"]);
        assert_eq!(humans(&store.list(7, None, Some(3)).unwrap()), ["1", "2"]);
    }

    #[test]
    fn retention_prunes_oldest() {
        let (_dir, store) = store(Some(2));
        for h in ["1", "2", "3"] {
            store.append(1, Some(h), None).unwrap();
        }
        store.append(2, Some("x"), None).unwrap();
        assert_eq!(humans(&store.list(1, None, None).unwrap()), ["2", "3"]);
        assert_eq!(store.list(2, None, None).unwrap().len(), 1);
    }

    #[test]
    fn reopen_keeps_turns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory.db");
        ConversationStore::open(&path, None).unwrap().append(1, Some("kept"), None).unwrap();
        let reopened = ConversationStore::open(&path, None).unwrap();
        assert_eq!(humans(&reopened.list(1, None, None).unwrap()), ["kept"]);
    }
}
