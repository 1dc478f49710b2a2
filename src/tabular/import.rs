//! Ongoing bulk imports of already-translated CSV data. Same pipeline as the
//! migration engine minus the identifier translation stage.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use super::migrate::SESSION_TABLE;
use super::{
    append_rows, drop_invalid_dates, filter_by_owner, CsvError, CsvTable, DateExclusion,
    DATE_COLUMN, OWNER_COLUMN, SURROGATE_COLUMNS,
};

pub const MAINTENANCE_TABLE: &str = "maintenance";

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub input_rows: u64,
    pub date_invalid: Vec<DateExclusion>,
    pub owner_mismatch: BTreeMap<String, u64>,
    pub written: u64,
}

pub async fn import_sessions(
    pool: &SqlitePool,
    mut table: CsvTable,
    expected_owner: &str,
) -> Result<ImportReport, CsvError> {
    let mut report = ImportReport {
        input_rows: table.rows.len() as u64,
        ..Default::default()
    };
    table.drop_columns(SURROGATE_COLUMNS);
    report.date_invalid = drop_invalid_dates(&mut table, DATE_COLUMN);
    report.owner_mismatch = filter_by_owner(&mut table, OWNER_COLUMN, expected_owner);
    report.written = append_rows(pool, SESSION_TABLE, &table).await?;
    Ok(report)
}

/// Maintenance variant: legacy maintenance exports may omit the owner column
/// entirely, in which case the invocation's identity is injected instead of
/// filtering. The date filter only applies when a date column exists.
pub async fn import_maintenance(
    pool: &SqlitePool,
    mut table: CsvTable,
    expected_owner: &str,
) -> Result<ImportReport, CsvError> {
    let mut report = ImportReport {
        input_rows: table.rows.len() as u64,
        ..Default::default()
    };
    table.drop_columns(SURROGATE_COLUMNS);
    report.date_invalid = drop_invalid_dates(&mut table, DATE_COLUMN);
    if table.column(OWNER_COLUMN).is_none() {
        info!(owner = expected_owner, "owner column absent, injecting");
        table.add_column(OWNER_COLUMN, expected_owner);
    } else {
        report.owner_mismatch = filter_by_owner(&mut table, OWNER_COLUMN, expected_owner);
    }
    report.written = append_rows(pool, MAINTENANCE_TABLE, &table).await?;
    Ok(report)
}
