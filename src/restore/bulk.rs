//! Generic bulk insert with per-record fault isolation: one narrow-scoped
//! transaction per record, so a constraint violation on record 50 of 500
//! discards neither records 1-49 nor 51-500.

use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::warn;

use crate::db::quote_ident;

#[derive(Debug, Error)]
pub enum BulkError {
    #[error("failed to serialize record for table {table}: {source}")]
    Serialize {
        table: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("record for table {table} is not a key/value structure")]
    NotAnObject { table: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordFailure {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub inserted: u64,
    pub failures: Vec<RecordFailure>,
}

/// Insert `records` into `table`, committing each record in its own
/// transaction. A failed record is rolled back, recorded in the outcome, and
/// iteration continues; only infrastructure errors (serialization, acquiring
/// a transaction) abort the batch.
pub async fn insert_each<T: Serialize>(
    pool: &SqlitePool,
    table: &str,
    records: &[T],
) -> Result<BatchOutcome, BulkError> {
    let mut outcome = BatchOutcome::default();
    let mut insert_sql: Option<String> = None;

    for (index, record) in records.iter().enumerate() {
        let value = serde_json::to_value(record).map_err(|source| BulkError::Serialize {
            table: table.to_string(),
            source,
        })?;
        let object = value.as_object().ok_or_else(|| BulkError::NotAnObject {
            table: table.to_string(),
        })?;
        let sql = insert_sql.get_or_insert_with(|| build_insert_sql(table, object));
        let payload = value.to_string();

        let mut tx = pool.begin().await?;
        match sqlx::query(sql.as_str())
            .bind(&payload)
            .execute(tx.as_mut())
            .await
        {
            Ok(_) => match tx.commit().await {
                Ok(()) => outcome.inserted += 1,
                Err(err) => {
                    warn!(table, index, error = %err, "record commit failed, continuing");
                    outcome.failures.push(RecordFailure {
                        index,
                        message: err.to_string(),
                    });
                }
            },
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(table, index, error = %rollback_err, "rollback failed");
                }
                warn!(table, index, error = %err, "record insert failed, continuing");
                outcome.failures.push(RecordFailure {
                    index,
                    message: err.to_string(),
                });
            }
        }
    }

    Ok(outcome)
}

/// Build the INSERT once from the first record's keys; every record of a
/// batch serializes to the same shape. Values are pulled out of a single
/// JSON payload parameter, column by column.
fn build_insert_sql(table: &str, row: &serde_json::Map<String, Value>) -> String {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for key in row.keys() {
        columns.push(quote_ident(key));
        values.push(json_extract_for_column(key));
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.join(", "),
        values.join(", ")
    )
}

fn json_extract_for_column(column: &str) -> String {
    let escaped = column.replace('\\', "\\\\").replace('"', "\\\"");
    format!("json_extract(?1, '$.\"{}\"')", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use sqlx::sqlite::SqlitePoolOptions;

    #[derive(Serialize)]
    struct BootRow {
        boot_id: String,
        skater_id: String,
        brand: Option<String>,
        size: Option<f64>,
    }

    fn boot(id: &str, size: Option<f64>) -> BootRow {
        BootRow {
            boot_id: id.to_string(),
            skater_id: "uuid-s".to_string(),
            brand: Some("Edea".to_string()),
            size,
        }
    }

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("open in-memory sqlite");
        crate::db::apply_schema(&pool).await.expect("apply schema");
        pool
    }

    #[tokio::test]
    async fn all_records_insert_when_sound() {
        let pool = test_pool().await;
        let records = vec![boot("b1", Some(9.5)), boot("b2", None)];
        let outcome = insert_each(&pool, "boots", &records).await.unwrap();
        assert_eq!(outcome.inserted, 2);
        assert!(outcome.failures.is_empty());

        let size: Option<f64> =
            sqlx::query_scalar("SELECT size FROM boots WHERE boot_id = 'b1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(size, Some(9.5));
    }

    #[tokio::test]
    async fn one_bad_record_does_not_abort_the_batch() {
        let pool = test_pool().await;
        let records = vec![
            boot("b1", None),
            boot("b1", None), // duplicate primary key
            boot("b2", None),
        ];
        let outcome = insert_each(&pool, "boots", &records).await.unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM boots")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let pool = test_pool().await;
        let records: Vec<BootRow> = Vec::new();
        let outcome = insert_each(&pool, "boots", &records).await.unwrap();
        assert_eq!(outcome.inserted, 0);
        assert!(outcome.failures.is_empty());
    }
}
