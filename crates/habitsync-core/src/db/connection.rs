//! Database connection management

use crate::error::{Error, Result};
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use super::migrations;

/// Database wrapper for a local libSQL connection
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
    closed: AtomicBool,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        Self::initialize(db).await
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::initialize(db).await
    }

    async fn initialize(db: LibSqlDatabase) -> Result<Self> {
        let conn = db.connect()?;
        let database = Self {
            _db: db,
            conn,
            closed: AtomicBool::new(false),
        };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Configure `SQLite` for durability of the sync queue
    async fn configure(&self) -> Result<()> {
        // WAL is not available for in-memory databases
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = FULL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        Ok(())
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn).await
    }

    /// Mark the handle closed. Later reads and writes fail with
    /// [`Error::StoreClosed`] instead of reaching the connection.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Local database closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Get a reference to the underlying connection
    pub fn connection(&self) -> Result<&Connection> {
        if self.is_closed() {
            return Err(Error::StoreClosed);
        }
        Ok(&self.conn)
    }
}

/// Commit the transaction opened by the caller, or roll it back when the
/// body failed.
pub(crate) async fn finish_transaction<T>(conn: &Connection, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            if let Err(e) = conn.execute("COMMIT", ()).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
            Ok(value)
        }
        Err(e) => {
            conn.execute("ROLLBACK", ()).await.ok();
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(!db.is_closed());
        assert!(db.connection().is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_closed_database_rejects_access() {
        let db = Database::open_in_memory().await.unwrap();
        db.close();
        assert!(db.is_closed());
        assert!(matches!(db.connection(), Err(Error::StoreClosed)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_file_database_twice() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("habitsync.db");

        let db = Database::open(&path).await.unwrap();
        drop(db);

        let reopened = Database::open(&path).await.unwrap();
        let mut rows = reopened
            .connection()
            .unwrap()
            .query("SELECT 1", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i32>(0).unwrap(), 1);
    }
}
