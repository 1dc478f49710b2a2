//! Storage-handle construction and schema application. The pool is built once
//! per process and passed by reference into every component; there is no
//! global connection state.

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::info;

static MIGRATIONS: &[(&str, &str)] = &[(
    "0001_admin_schema.sql",
    include_str!("../migrations/0001_admin_schema.sql"),
)];

pub async fn open_pool(db_path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("open sqlite database at {}", db_path.display()))?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(&pool)
        .await
        .ok();

    Ok(pool)
}

/// Apply the admin DDL. Statements are idempotent (`IF NOT EXISTS`), so this
/// runs unconditionally at startup.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    for (file, raw_sql) in MIGRATIONS {
        let mut tx = pool.begin().await?;
        for stmt in raw_sql.split(';') {
            let is_comment_only = stmt
                .lines()
                .all(|line| line.trim().is_empty() || line.trim_start().starts_with("--"));
            if is_comment_only {
                continue;
            }
            sqlx::query(stmt.trim())
                .execute(tx.as_mut())
                .await
                .with_context(|| format!("apply schema statement from {file}"))?;
        }
        tx.commit().await?;
        info!(file, "schema applied");
    }
    Ok(())
}

pub(crate) fn quote_ident(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_applies_twice_without_error() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("open in-memory sqlite");
        apply_schema(&pool).await.unwrap();
        apply_schema(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'ice_sessions'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
