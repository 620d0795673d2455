//! Database initialization
//!
//! Opens (creating if needed) the SQLite database and creates the audiobook
//! tables. Table creation is idempotent and runs on every start.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the database at `db_path` and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(configure_connection(options))
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Open an in-memory database with the schema applied
///
/// Single connection that never expires: every connection to
/// `sqlite::memory:` sees its own empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options: SqliteConnectOptions = "sqlite::memory:".parse()?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(configure_connection(options))
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Per-connection settings; applied to every pooled connection
fn configure_connection(options: SqliteConnectOptions) -> SqliteConnectOptions {
    options.foreign_keys(true).busy_timeout(BUSY_TIMEOUT)
}

/// Create audiobook tables if they don't exist
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_audiobooks_table(pool).await?;
    create_chapters_table(pool).await?;
    Ok(())
}

async fn create_audiobooks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audiobooks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            author TEXT NOT NULL DEFAULT '',
            narrator TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            genre TEXT NOT NULL DEFAULT '',
            duration REAL NOT NULL DEFAULT 0,
            dir_path TEXT NOT NULL,
            chapter_count INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_chapters_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chapters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            audiobook_id INTEGER NOT NULL REFERENCES audiobooks(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            numbering INTEGER NOT NULL,
            start_time REAL NOT NULL,
            end_time REAL NOT NULL,
            file_path TEXT NOT NULL,
            UNIQUE (audiobook_id, numbering)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chapters_audiobook ON chapters(audiobook_id)")
        .execute(pool)
        .await?;

    Ok(())
}
