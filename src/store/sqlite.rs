// 🗃️ SQLite backend - the list as ordered rows + a revision counter
//
// Whole-list replace runs inside one transaction, so a crash never leaves half a list.
// Compare-and-swap writes take an IMMEDIATE transaction and compare inside it, which
// closes the race between separate processes sharing the database file.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{Backend, ListVersion, StoreError};

// rusqlite calls block (a busy database waits up to the busy timeout), so every
// operation runs on tokio's blocking pool.
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    label: String,
}

impl SqliteBackend {
    /// Open (or create) the database file and its tables
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let label = format!("sqlite {}", path.as_ref().display());
        let conn = Connection::open(path.as_ref()).map_err(|e| unavailable(&label, e))?;

        Self::from_connection(conn, label)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let label = "sqlite :memory:".to_string();
        let conn = Connection::open_in_memory().map_err(|e| unavailable(&label, e))?;

        Self::from_connection(conn, label)
    }

    fn from_connection(conn: Connection, label: String) -> Result<Self, StoreError> {
        setup_database(&conn).map_err(|e| unavailable(&label, e))?;

        Ok(SqliteBackend {
            conn: Arc::new(Mutex::new(conn)),
            label,
        })
    }

    /// Number of successful writes so far (0 = never written)
    pub fn revision(&self) -> Result<i64, StoreError> {
        let conn = self.conn.lock().map_err(|_| poisoned(&self.label))?;
        conn.query_row("SELECT revision FROM list_meta WHERE id = 1", [], |row| row.get(0))
            .optional()
            .map(|revision| revision.unwrap_or(0))
            .map_err(|e| unavailable(&self.label, e))
    }

    /// Run `op` against the connection on the blocking pool
    async fn blocking<T, F>(&self, writing: bool, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &str) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let label = self.label.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| poisoned(&label))?;
            op(&mut guard, &label)
        })
        .await;

        outcome.unwrap_or_else(|e| {
            let reason = format!("database task failed: {}", e);
            Err(if writing {
                StoreError::WriteRejected {
                    backend: self.label.clone(),
                    reason,
                }
            } else {
                StoreError::Unavailable {
                    backend: self.label.clone(),
                    reason,
                }
            })
        })
    }
}

fn poisoned(label: &str) -> StoreError {
    StoreError::Unavailable {
        backend: label.to_string(),
        reason: "connection lock poisoned".to_string(),
    }
}

fn unavailable(label: &str, e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable {
        backend: label.to_string(),
        reason: e.to_string(),
    }
}

fn rejected(label: &str, e: rusqlite::Error) -> StoreError {
    StoreError::WriteRejected {
        backend: label.to_string(),
        reason: e.to_string(),
    }
}

fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // WAL for crash recovery (in-memory databases report "memory" and keep it)
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS list_items (
            position INTEGER PRIMARY KEY,
            item TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS list_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            revision INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )
}

fn read_lines(conn: &Connection) -> rusqlite::Result<Option<Vec<String>>> {
    let written: Option<i64> = conn
        .query_row("SELECT revision FROM list_meta WHERE id = 1", [], |row| row.get(0))
        .optional()?;
    if written.is_none() {
        return Ok(None);
    }

    let mut stmt = conn.prepare("SELECT item FROM list_items ORDER BY position")?;
    let lines = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    Ok(Some(lines))
}

fn replace_lines(tx: &Transaction<'_>, lines: &[String]) -> rusqlite::Result<()> {
    tx.execute("DELETE FROM list_items", [])?;
    {
        let mut insert = tx.prepare("INSERT INTO list_items (position, item) VALUES (?1, ?2)")?;
        for (position, line) in lines.iter().enumerate() {
            insert.execute(params![position as i64, line])?;
        }
    }

    tx.execute(
        "INSERT INTO list_meta (id, revision, updated_at) VALUES (1, 1, ?1)
         ON CONFLICT(id) DO UPDATE SET revision = revision + 1, updated_at = excluded.updated_at",
        params![Utc::now().to_rfc3339()],
    )?;

    Ok(())
}

#[async_trait]
impl Backend for SqliteBackend {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn read(&self) -> Result<Option<Vec<String>>, StoreError> {
        self.blocking(false, |conn, label| read_lines(conn).map_err(|e| unavailable(label, e)))
            .await
    }

    async fn write(&self, lines: &[String]) -> Result<(), StoreError> {
        let lines = lines.to_vec();
        self.blocking(true, move |conn, label| {
            let tx = conn.transaction().map_err(|e| rejected(label, e))?;
            replace_lines(&tx, &lines).map_err(|e| rejected(label, e))?;
            tx.commit().map_err(|e| rejected(label, e))
        })
        .await
    }

    async fn write_if(&self, expected: &ListVersion, lines: &[String]) -> Result<(), StoreError> {
        let expected = expected.clone();
        let lines = lines.to_vec();
        self.blocking(true, move |conn, label| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| rejected(label, e))?;

            let current = read_lines(&tx).map_err(|e| rejected(label, e))?.unwrap_or_default();
            if ListVersion::of_lines(&current) != expected {
                // Dropping the transaction rolls it back
                return Err(StoreError::Conflict);
            }

            replace_lines(&tx, &lines).map_err(|e| rejected(label, e))?;
            tx.commit().map_err(|e| rejected(label, e))
        })
        .await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Entry, Owner};
    use crate::store::{append, ListStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fresh_database_reads_as_none() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        assert_eq!(backend.read().await.unwrap(), None);
        assert_eq!(backend.revision().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_keeps_order_and_bumps_revision() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let lines = vec!["아빠:우유".to_string(), "사과".to_string(), "아빠:우유".to_string()];

        backend.write(&lines).await.unwrap();
        backend.write(&lines).await.unwrap();

        assert_eq!(backend.read().await.unwrap(), Some(lines));
        assert_eq!(backend.revision().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cleared_list_reads_as_empty() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.write(&["우유".to_string()]).await.unwrap();
        backend.write(&[]).await.unwrap();

        assert_eq!(backend.read().await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_compare_and_swap_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("basket.db");

        let first = ListStore::new(Arc::new(SqliteBackend::open(&path).unwrap()));
        let second = ListStore::new(Arc::new(SqliteBackend::open(&path).unwrap()));

        let seen_by_first = first.snapshot().await;
        let seen_by_second = second.snapshot().await;

        let dad = Owner::Member("아빠".to_string());
        let mom = Owner::Member("엄마".to_string());

        let next = append(&seen_by_first.entries, dad, "우유").unwrap();
        first.save_if_current(&seen_by_first.version, &next).await.unwrap();

        let stale = append(&seen_by_second.entries, mom, "두부").unwrap();
        let result = second.save_if_current(&seen_by_second.version, &stale).await;
        assert!(matches!(result, Err(StoreError::Conflict)));

        assert_eq!(
            second.load().await,
            vec![Entry::new(Owner::Member("아빠".to_string()), "우유").unwrap()]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_busy_database_does_not_stall_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("basket.db");
        let backend = SqliteBackend::open(&path).unwrap();

        // Another process holds the write lock for a moment
        let other = Connection::open(&path).unwrap();
        other.execute_batch("BEGIN IMMEDIATE").unwrap();
        let release = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            other.execute_batch("COMMIT").unwrap();
        });

        backend.write(&["우유".to_string()]).await.unwrap();
        release.await.unwrap();

        assert_eq!(backend.read().await.unwrap(), Some(vec!["우유".to_string()]));
    }
}
