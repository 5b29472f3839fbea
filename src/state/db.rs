// SQLite database setup and migrations
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::storage::StorageError;

/// Maximum stored length of a source URL
pub const URL_MAX_LENGTH: usize = 200;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("URL is {0} characters long, limit is {max}", max = URL_MAX_LENGTH)]
    UrlTooLong(usize),
    #[error("Corrupt row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },
}

pub type DbResult<T> = Result<T, DbError>;

// Thread-safe database connection wrapper
pub struct DbConnection {
    conn: Arc<Mutex<Connection>>,
}

impl DbConnection {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Open an in-memory database with the schema applied
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self::new(conn))
    }

    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clone for DbConnection {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

/// Initialize the database at the given path
pub fn init_db(db_path: &Path) -> DbResult<DbConnection> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path)?;

    run_migrations(&conn)?;

    log::info!("Database ready at {}", db_path.display());
    Ok(DbConnection::new(conn))
}

fn run_migrations(conn: &Connection) -> DbResult<()> {
    // Create migrations table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version < 1 {
        migration_v1(conn)?;
        conn.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [1])?;
    }

    Ok(())
}

fn migration_v1(conn: &Connection) -> DbResult<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS audio_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL CHECK (length(url) <= {}),
                audio_file TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                bytes INTEGER NOT NULL
            )",
            URL_MAX_LENGTH
        ),
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audio_records_created_at ON audio_records(created_at DESC)",
        [],
    )?;

    Ok(())
}
