//! Database layer: the SQLite connection that parameter queries run against.

pub mod query;
pub mod schema;

use anyhow::{Result, anyhow};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Database handle wrapping a SQLite connection.
///
/// The handle is opened once and injected into every consumer; clones share
/// the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;

        conn.execute_batch(
            "PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Close the connection.
    ///
    /// Fails if other clones of this handle are still alive.
    pub fn close(self) -> Result<()> {
        let mutex = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("database handle is still shared; cannot close"))?;
        let conn = mutex
            .into_inner()
            .map_err(|_| anyhow!("database lock poisoned"))?;
        conn.close().map_err(|(_, e)| anyhow::Error::from(e))?;
        info!("Database closed");
        Ok(())
    }

    /// Create the sample tables and rows (customers, products, sales, sales_items).
    ///
    /// Applied through embedded migrations, so running it twice is a no-op.
    pub fn seed_sample(&self) -> Result<()> {
        self.with_conn_mut(|conn| {
            let report = embedded::migrations::runner().run(conn)?;
            let applied = report.applied_migrations();
            if applied.is_empty() {
                info!("Sample data already present");
            } else {
                for migration in applied {
                    info!("Applied sample migration {}", migration);
                }
            }
            Ok(())
        })
    }

    /// Returns true when the database has no user tables at all.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.get_table_names()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database lock poisoned"))
    }

    /// Execute a function with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Execute a function with mutable access to the connection (for transactions).
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.lock()?;
        f(&mut conn)
    }
}
