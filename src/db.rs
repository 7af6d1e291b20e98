use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::SourceConfig;

/// Open the catalogue source read-only.
pub async fn connect(config: &SourceConfig) -> Result<SqlitePool> {
    let db_path = &config.path;

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .read_only(true)
        .create_if_missing(false);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open catalogue source: {}", db_path.display()))?;

    Ok(pool)
}
