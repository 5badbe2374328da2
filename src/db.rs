//! SQLite storage handle owned by the active project session.
//!
//! All access goes through synchronous closures run on the blocking pool
//! while the connection lock is held, so no `&Connection` ever lives across
//! an await point.
//! A [`Tx`] keeps the lock for its whole lifetime and rolls back on drop
//! unless committed, which is what lets cancellation of a suspended command
//! undo its partial writes before [`Database::close`] proceeds.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::DbError;

/// Numbered schema migrations. `PRAGMA user_version` records how many were applied.
const MIGRATIONS: &[&str] = &[
    // 1: project, subjects, photos, trash, lists
    r"
    CREATE TABLE project (
      project_id TEXT PRIMARY KEY,
      name TEXT NOT NULL,
      base TEXT,
      created INTEGER NOT NULL
    );

    CREATE TABLE subjects (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      created INTEGER NOT NULL,
      modified INTEGER NOT NULL
    );

    CREATE TABLE items (
      id INTEGER PRIMARY KEY REFERENCES subjects(id) ON DELETE CASCADE
    );

    CREATE TABLE photos (
      id INTEGER PRIMARY KEY REFERENCES subjects(id) ON DELETE CASCADE,
      item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
      position INTEGER NOT NULL DEFAULT 0,
      path TEXT NOT NULL,
      checksum TEXT NOT NULL,
      size INTEGER NOT NULL DEFAULT 0,
      mimetype TEXT NOT NULL,
      title TEXT,
      date TEXT,
      rotation INTEGER NOT NULL DEFAULT 0,
      broken INTEGER NOT NULL DEFAULT 0,
      consolidated INTEGER
    );

    CREATE INDEX photos_item_position ON photos (item_id, position);

    CREATE TABLE trash (
      id INTEGER PRIMARY KEY REFERENCES subjects(id) ON DELETE CASCADE,
      deleted INTEGER NOT NULL
    );

    CREATE TABLE lists (
      list_id INTEGER PRIMARY KEY AUTOINCREMENT,
      name TEXT NOT NULL,
      parent_list_id INTEGER REFERENCES lists(list_id) ON DELETE CASCADE,
      position INTEGER NOT NULL DEFAULT 0,
      created INTEGER NOT NULL DEFAULT 0
    );

    INSERT INTO lists (list_id, name, parent_list_id) VALUES (0, '', NULL);
    ",
    // 2: notes
    r"
    CREATE TABLE notes (
      note_id INTEGER PRIMARY KEY AUTOINCREMENT,
      photo_id INTEGER NOT NULL REFERENCES photos(id) ON DELETE CASCADE,
      text TEXT NOT NULL,
      state TEXT NOT NULL DEFAULT 'null',
      created INTEGER NOT NULL,
      modified INTEGER NOT NULL,
      deleted INTEGER
    );
    ",
    // 3: vocabularies
    r"
    CREATE TABLE vocabularies (
      vocab_id TEXT PRIMARY KEY,
      prefix TEXT,
      title TEXT NOT NULL,
      description TEXT,
      protected INTEGER NOT NULL DEFAULT 0,
      deleted INTEGER
    );

    CREATE TABLE terms (
      term_id TEXT PRIMARY KEY,
      vocab_id TEXT NOT NULL REFERENCES vocabularies(vocab_id) ON DELETE CASCADE,
      label TEXT,
      comment TEXT
    );
    ",
    // 4: templates
    r"
    CREATE TABLE templates (
      template_id TEXT PRIMARY KEY,
      template_type TEXT NOT NULL,
      name TEXT NOT NULL,
      creator TEXT,
      description TEXT,
      protected INTEGER NOT NULL DEFAULT 0,
      created INTEGER NOT NULL,
      modified INTEGER NOT NULL
    );

    CREATE TABLE fields (
      field_id INTEGER PRIMARY KEY AUTOINCREMENT,
      template_id TEXT NOT NULL REFERENCES templates(template_id) ON DELETE CASCADE,
      property TEXT NOT NULL,
      label TEXT,
      datatype TEXT,
      is_required INTEGER NOT NULL DEFAULT 0,
      hint TEXT,
      value TEXT,
      is_constant INTEGER NOT NULL DEFAULT 0,
      position INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX fields_template_position ON fields (template_id, position);
    ",
];

#[derive(Debug)]
struct DbInner {
    path: PathBuf,
    conn: Arc<Mutex<Option<Connection>>>,
}

/// Cheaply clonable handle to one project database.
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<DbInner>,
}

impl Database {
    /// Open an existing project file. Missing files are an error, never created.
    pub async fn open(path: &Path) -> Result<Self, DbError> {
        Self::connect(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .await
    }

    /// Open `path`, creating an empty database file if there is none.
    pub async fn create(path: &Path) -> Result<Self, DbError> {
        Self::connect(path, OpenFlags::default()).await
    }

    async fn connect(path: &Path, flags: OpenFlags) -> Result<Self, DbError> {
        let owned = path.to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, DbError> {
            let conn = Connection::open_with_flags(&owned, flags)?;
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA synchronous = NORMAL;",
            )?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            Ok(conn)
        })
        .await
        .map_err(|e| DbError::Invalid(format!("open task failed: {e}")))??;

        tracing::debug!(path = %path.display(), "database opened");
        Ok(Self {
            inner: Arc::new(DbInner {
                path: path.to_path_buf(),
                conn: Arc::new(Mutex::new(Some(conn))),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn closed(&self) -> DbError {
        DbError::Closed(self.inner.path.display().to_string())
    }

    /// Run `f` on the blocking pool with the connection lock held.
    async fn blocking<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DbError> + Send + 'static,
        T: Send + 'static,
    {
        let mut guard = Arc::clone(&self.inner.conn).lock_owned().await;
        let closed = self.closed();
        tokio::task::spawn_blocking(move || match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(closed),
        })
        .await
        .map_err(|e| DbError::Invalid(format!("database task failed: {e}")))?
    }

    /// Run a single query (or a handful of independent statements).
    pub async fn call<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError> + Send + 'static,
        T: Send + 'static,
    {
        self.blocking(move |conn| f(conn)).await
    }

    /// Run `f` atomically. Any error rolls the whole closure back.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, DbError> + Send + 'static,
        T: Send + 'static,
    {
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
        .await
    }

    /// Run `f` against a consistent read snapshot.
    pub async fn seq<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, DbError> + Send + 'static,
        T: Send + 'static,
    {
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
            let value = f(&tx)?;
            tx.finish()?;
            Ok(value)
        })
        .await
    }

    /// Open a transaction that may be held across suspension points.
    ///
    /// The handle is exclusive until the returned [`Tx`] is committed or dropped.
    pub async fn begin(&self) -> Result<Tx, DbError> {
        let guard = Arc::clone(&self.inner.conn).lock_owned().await;
        let conn = guard.as_ref().ok_or_else(|| self.closed())?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Tx {
            guard,
            finished: false,
        })
    }

    pub async fn version(&self) -> Result<u32, DbError> {
        self.call(|conn| Ok(conn.query_row("PRAGMA user_version", [], |r| r.get(0))?))
            .await
    }

    /// Apply pending migrations. Returns how many were applied.
    pub async fn migrate(&self) -> Result<usize, DbError> {
        let supported = u32::try_from(MIGRATIONS.len()).unwrap_or(u32::MAX);
        let applied = self
            .blocking(move |conn| {
                let found: u32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
                if found > supported {
                    return Err(DbError::FutureSchema { found, supported });
                }
                conn.execute_batch("PRAGMA journal_mode = WAL")?;

                let mut applied = 0;
                for (number, sql) in MIGRATIONS.iter().enumerate().skip(found as usize) {
                    let tx = conn.transaction()?;
                    tx.execute_batch(sql)?;
                    tx.execute_batch(&format!("PRAGMA user_version = {}", number + 1))?;
                    tx.commit()?;
                    applied += 1;
                }
                Ok(applied)
            })
            .await?;

        if applied > 0 {
            tracing::info!(path = %self.inner.path.display(), applied, "database migrated");
        }
        Ok(applied)
    }

    /// Close the handle. Waits for an in-flight [`Tx`] to commit or roll back first.
    pub async fn close(&self) -> Result<(), DbError> {
        let mut guard = Arc::clone(&self.inner.conn).lock_owned().await;
        let Some(conn) = guard.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || conn.close().map_err(|(_, e)| DbError::Sql(e)))
            .await
            .map_err(|e| DbError::Invalid(format!("close task failed: {e}")))??;
        tracing::debug!(path = %self.inner.path.display(), "database closed");
        Ok(())
    }
}

/// A transaction spanning suspension points. Rolled back on drop unless committed.
///
/// Hold it by value across awaits; it is `Send` but not `Sync`.
pub struct Tx {
    guard: OwnedMutexGuard<Option<Connection>>,
    finished: bool,
}

impl Tx {
    pub fn call<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError>,
    {
        let conn = self
            .guard
            .as_ref()
            .ok_or_else(|| DbError::Closed("transaction".into()))?;
        f(conn)
    }

    pub fn commit(mut self) -> Result<(), DbError> {
        self.finished = true;
        self.call(|conn| Ok(conn.execute_batch("COMMIT")?))
    }

    pub fn rollback(mut self) -> Result<(), DbError> {
        self.finished = true;
        self.call(|conn| Ok(conn.execute_batch("ROLLBACK")?))
    }
}

impl Drop for Tx {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(conn) = self.guard.as_ref() {
            match conn.execute_batch("ROLLBACK") {
                Ok(()) => tracing::debug!("transaction rolled back on drop"),
                Err(e) => tracing::warn!("rollback failed: {e}"),
            }
        }
    }
}

impl std::fmt::Debug for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx").field("finished", &self.finished).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn fresh() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::create(&dir.path().join("p.folio")).await.unwrap();
        db.migrate().await.unwrap();
        (dir, db)
    }

    fn count_lists(conn: &Connection) -> Result<i64, DbError> {
        Ok(conn.query_row("SELECT count(*) FROM lists", [], |r| r.get(0))?)
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let (_dir, db) = fresh().await;
        assert_eq!(db.version().await.unwrap() as usize, MIGRATIONS.len());
        assert_eq!(db.migrate().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn future_schema_is_rejected() {
        let (_dir, db) = fresh().await;
        db.call(|c| Ok(c.execute_batch("PRAGMA user_version = 99")?))
            .await
            .unwrap();
        assert!(matches!(
            db.migrate().await,
            Err(DbError::FutureSchema { found: 99, .. })
        ));
    }

    #[tokio::test]
    async fn failed_transaction_rolls_back() {
        let (_dir, db) = fresh().await;
        let result: Result<(), DbError> = db
            .transaction(|tx| {
                tx.execute("INSERT INTO lists (name, parent_list_id) VALUES ('a', 0)", [])?;
                Err(DbError::Invalid("boom".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(db.call(count_lists).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dropped_tx_rolls_back() {
        let (_dir, db) = fresh().await;
        let tx = db.begin().await.unwrap();
        tx.call(|c| {
            c.execute("INSERT INTO lists (name, parent_list_id) VALUES ('a', 0)", [])?;
            Ok(())
        })
        .unwrap();
        drop(tx);
        assert_eq!(db.call(count_lists).await.unwrap(), 1);

        let tx = db.begin().await.unwrap();
        tx.call(|c| {
            c.execute("INSERT INTO lists (name, parent_list_id) VALUES ('b', 0)", [])?;
            Ok(())
        })
        .unwrap();
        tx.commit().unwrap();
        assert_eq!(db.call(count_lists).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn close_waits_for_open_tx() {
        let (_dir, db) = fresh().await;
        let tx = db.begin().await.unwrap();
        tx.call(|c| {
            c.execute("INSERT INTO lists (name, parent_list_id) VALUES ('a', 0)", [])?;
            Ok(())
        })
        .unwrap();

        let closer = {
            let db = db.clone();
            tokio::spawn(async move { db.close().await })
        };
        tokio::task::yield_now().await;
        assert!(!closer.is_finished());

        drop(tx);
        closer.await.unwrap().unwrap();
        assert!(matches!(db.call(count_lists).await, Err(DbError::Closed(_))));

        let reopened = Database::open(db.path()).await.unwrap();
        assert_eq!(reopened.call(count_lists).await.unwrap(), 1);
    }
}
