//! Database module for wall-publisher.
//!
//! Submissions are persisted in SQLite through sqlx. The store trait lives in
//! [`repositories`]; this module owns pool construction and migrations.

pub mod models;
pub mod repositories;
pub mod time;

pub use repositories::{MemorySubmissionStore, SqliteSubmissionStore, SubmissionStore};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;

pub type DbPool = Pool<Sqlite>;

/// Connections for a file-backed database. Workers claim and save one row at a
/// time, so a handful is plenty.
const FILE_POOL_SIZE: u32 = 8;

/// How long a writer waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const WAL_AUTOCHECKPOINT_PAGES: i32 = 1000;

async fn tune_connection(conn: &mut sqlx::SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(&format!("PRAGMA wal_autocheckpoint = {WAL_AUTOCHECKPOINT_PAGES}"))
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA temp_store = MEMORY")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Re-enable WAL if the database file was last opened in another mode.
async fn check_journal_mode(pool: &DbPool) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    let mode: String = sqlx::query("PRAGMA journal_mode")
        .fetch_one(&mut *conn)
        .await?
        .get(0);
    // In-memory databases report "memory" and cannot switch.
    if mode != "wal" && mode != "memory" {
        tracing::warn!(mode = %mode, "journal_mode is not WAL; switching");
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Open a WAL-mode pool with at most `max_connections` connections.
pub async fn init_pool_with_size(
    database_url: &str,
    max_connections: u32,
) -> Result<DbPool, sqlx::Error> {
    let connect_options = SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .after_connect(|conn, _meta| Box::pin(async move { tune_connection(&mut *conn).await }))
        .connect_with(connect_options)
        .await?;
    check_journal_mode(&pool).await?;

    tracing::info!(max_connections, "Database pool ready");
    Ok(pool)
}

/// Open a pool sized for `database_url`.
///
/// `sqlite::memory:` URLs get a single connection, since every connection to
/// an in-memory database sees its own empty database.
pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let size = if database_url.contains(":memory:") {
        1
    } else {
        FILE_POOL_SIZE
    };
    init_pool_with_size(database_url, size).await
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::debug!("Database schema up to date");
    Ok(())
}
