//! Tabular (CSV) ingest: the in-memory table model, the record filters
//! shared by migration and import, and the bulk append into storage.

pub mod import;
pub mod migrate;

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::warn;

use crate::db::quote_ident;

/// Prior-database surrogate keys, meaningless in the target ID space.
pub const SURROGATE_COLUMNS: &[&str] = &["session_id", "id"];
pub const DATE_COLUMN: &str = "date";
pub const OWNER_COLUMN: &str = "skater_id";

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One delimited-text file: a header row plus data rows, all cells as text.
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    pub source: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn read(path: &Path) -> Result<Self, CsvError> {
        let file = File::open(path).map_err(|source| CsvError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut reader = csv::Reader::from_reader(file);
        let headers = reader
            .headers()
            .map_err(|source| CsvError::Parse {
                path: path.display().to_string(),
                source,
            })?
            .iter()
            .map(str::to_string)
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| CsvError::Parse {
                path: path.display().to_string(),
                source,
            })?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self {
            source: path.display().to_string(),
            headers,
            rows,
        })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Remove the named columns from the header and every row.
    pub fn drop_columns(&mut self, names: &[&str]) {
        for name in names {
            if let Some(idx) = self.column(name) {
                self.headers.remove(idx);
                for row in &mut self.rows {
                    if idx < row.len() {
                        row.remove(idx);
                    }
                }
            }
        }
    }

    /// Add a column with the same value in every row.
    pub fn add_column(&mut self, name: &str, value: &str) {
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(value.to_string());
        }
    }
}

/// One row excluded by the date filter, with enough context to reproduce the
/// decision without re-reading the source.
#[derive(Debug, Clone, Serialize)]
pub struct DateExclusion {
    pub row: usize,
    pub value: String,
    pub context: Vec<(String, String)>,
}

/// Drop rows whose date cell is all-zero or fails flexible parsing. Returns
/// the excluded rows; a table without the column is left untouched.
pub fn drop_invalid_dates(table: &mut CsvTable, date_col: &str) -> Vec<DateExclusion> {
    let Some(date_idx) = table.column(date_col) else {
        return Vec::new();
    };
    let zero = Regex::new(r"^0{4}[-/]0{2}[-/]0{2}").unwrap();
    let context_cols: Vec<(usize, String)> = ["minutes", "rink_id"]
        .iter()
        .filter_map(|name| table.column(name).map(|idx| (idx, (*name).to_string())))
        .collect();

    let source = table.source.clone();
    let rows = std::mem::take(&mut table.rows);
    let mut kept = Vec::with_capacity(rows.len());
    let mut excluded = Vec::new();
    for (row_idx, row) in rows.into_iter().enumerate() {
        let raw = row.get(date_idx).map(String::as_str).unwrap_or("");
        if zero.is_match(raw.trim()) || parse_flexible_date(raw).is_none() {
            let context: Vec<(String, String)> = context_cols
                .iter()
                .filter_map(|(idx, name)| row.get(*idx).map(|v| (name.clone(), v.clone())))
                .collect();
            warn!(source = %source, row = row_idx, date = raw, "skipping row with invalid date");
            excluded.push(DateExclusion {
                row: row_idx,
                value: raw.to_string(),
                context,
            });
        } else {
            kept.push(row);
        }
    }
    table.rows = kept;
    excluded
}

/// Keep only rows whose owner cell equals `expected`; returns per-identity
/// counts of dropped rows. A table without the column is left untouched.
pub fn filter_by_owner(
    table: &mut CsvTable,
    owner_col: &str,
    expected: &str,
) -> BTreeMap<String, u64> {
    let Some(owner_idx) = table.column(owner_col) else {
        return BTreeMap::new();
    };
    let source = table.source.clone();
    let rows = std::mem::take(&mut table.rows);
    let mut kept = Vec::with_capacity(rows.len());
    let mut dropped: BTreeMap<String, u64> = BTreeMap::new();
    for row in rows {
        let owner = row.get(owner_idx).map(String::as_str).unwrap_or("");
        if owner == expected {
            kept.push(row);
        } else {
            *dropped.entry(owner.to_string()).or_insert(0) += 1;
        }
    }
    for (owner, count) in &dropped {
        warn!(source = %source, owner = %owner, count, "filtered rows belonging to another identity");
    }
    table.rows = kept;
    dropped
}

/// Flexible date-format inference. Calendar validity comes with the parse:
/// `2023-02-30` fails every format.
pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m/%d/%y", "%d-%b-%Y"];
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, format) {
            return Some(datetime.date());
        }
    }
    None
}

/// Append every row to `table_name` in one transaction. Cells bind as
/// integers or reals when they parse as such, NULL when empty, text
/// otherwise.
pub async fn append_rows(
    pool: &SqlitePool,
    table_name: &str,
    table: &CsvTable,
) -> Result<u64, CsvError> {
    if table.rows.is_empty() {
        return Ok(0);
    }
    let columns: Vec<String> = table.headers.iter().map(|h| quote_ident(h)).collect();
    let placeholders: Vec<String> = (1..=table.headers.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table_name),
        columns.join(", "),
        placeholders.join(", ")
    );

    let mut tx = pool.begin().await?;
    for row in &table.rows {
        let mut query = sqlx::query(&sql);
        for cell in row {
            let trimmed = cell.trim();
            if trimmed.is_empty() {
                query = query.bind(None::<String>);
            } else if let Ok(int) = trimmed.parse::<i64>() {
                query = query.bind(int);
            } else if let Ok(float) = trimmed.parse::<f64>() {
                query = query.bind(float);
            } else {
                query = query.bind(cell.clone());
            }
        }
        query.execute(tx.as_mut()).await?;
    }
    tx.commit().await?;
    Ok(table.rows.len() as u64)
}
