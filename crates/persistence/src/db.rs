use anyhow::Result;
use chrono::Utc;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Open (creating if needed) the settings database and run migrations
pub async fn init_db(db_path: &Path) -> Result<SqlitePool> {
    let db_url = format!("sqlite://{}", db_path.display());

    if !sqlx::Sqlite::database_exists(&db_url).await? {
        tracing::info!("Creating database at {}", db_path.display());
        sqlx::Sqlite::create_database(&db_url).await?;
    }

    let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    tracing::info!("Database initialized successfully");
    Ok(pool)
}

/// Private in-memory database, for ephemeral runs and tests
pub async fn init_memory_db() -> Result<SqlitePool> {
    // Every connection to :memory: is a separate database, so keep exactly one alive
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    tracing::debug!("Running database migrations");

    // Migration 001: last search request, single row
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS search_settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            query TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            artist TEXT NOT NULL DEFAULT '',
            album TEXT NOT NULL DEFAULT '',
            kind TEXT NOT NULL DEFAULT 'track',
            updated_at INTEGER NOT NULL
        );
    "#)
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO search_settings (id, updated_at) VALUES (1, ?)")
        .bind(Utc::now().timestamp())
        .execute(pool)
        .await?;

    // Migration 002: named credentials (bearer tokens)
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS credential (
            name TEXT PRIMARY KEY,
            secret TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );
    "#)
    .execute(pool)
    .await?;

    tracing::debug!("Database migrations completed");
    Ok(())
}
