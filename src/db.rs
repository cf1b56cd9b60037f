//! Database bootstrap: pool construction and embedded migrations.
//!
//! The dialect is chosen once from configuration; nothing here probes the
//! server at runtime to guess what it is talking to.

use crate::config::{AppConfig, DatabaseDialect};
use anyhow::{Context, Result};
use sqlx::{
    SqlitePool,
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{path::Path, str::FromStr, sync::Arc};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open the metadata pool described by `cfg`.
pub async fn connect(cfg: &AppConfig) -> Result<Arc<SqlitePool>> {
    match cfg.dialect {
        DatabaseDialect::Sqlite => connect_sqlite(&cfg.database_url).await,
    }
}

/// Open a SQLite pool, creating the database file and its directory if
/// they do not exist yet.
pub async fn connect_sqlite(database_url: &str) -> Result<Arc<SqlitePool>> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("parsing database URL `{}`", database_url))?
        .create_if_missing(true);

    let db_path = options.get_filename();
    if db_path != Path::new(":memory:") {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }
    tracing::debug!("Interpreted SQLite path => {}", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("connecting to `{}`", database_url))?;
    Ok(Arc::new(pool))
}

/// Apply the embedded schema migrations.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    tracing::info!("Running {} migrations...", MIGRATOR.iter().count());
    MIGRATOR.run(pool).await.context("running migrations")?;
    Ok(())
}

/// Fresh, migrated database in a temporary directory.
#[cfg(test)]
pub(crate) async fn test_pool() -> (tempfile::TempDir, Arc<SqlitePool>) {
    let dir = tempfile::TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("meta.db").display());
    let pool = connect_sqlite(&url).await.unwrap();
    migrate(&pool).await.unwrap();
    (dir, pool)
}
