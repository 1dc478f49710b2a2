//! One-time migration of legacy CSV exports: translate identifiers column by
//! column, strip stale surrogate keys, filter, and append.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::warn;

use super::{
    append_rows, drop_invalid_dates, filter_by_owner, CsvError, CsvTable, DateExclusion,
    DATE_COLUMN, OWNER_COLUMN, SURROGATE_COLUMNS,
};
use crate::idmap::{MapDomain, MappingTable};

pub const SESSION_TABLE: &str = "ice_sessions";

/// Foreign-key-shaped columns and the mapping domain each translates under.
pub const TRANSLATED_COLUMNS: &[(&str, MapDomain)] = &[
    (OWNER_COLUMN, MapDomain::Skaters),
    ("rink_id", MapDomain::Locations),
    ("coach_id", MapDomain::Coaches),
    ("skate_type", MapDomain::SkateTypes),
    ("skate_config", MapDomain::SkateConfigs),
];

/// Accounts for every row between input and output: the difference in counts
/// is fully explained by `date_invalid` and `owner_mismatch`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub input_rows: u64,
    pub unmapped: BTreeMap<String, BTreeSet<String>>,
    pub date_invalid: Vec<DateExclusion>,
    pub owner_mismatch: BTreeMap<String, u64>,
    pub written: u64,
}

/// Translate every FK-shaped column present in the table. Misses keep the
/// original value and are collected per column; a missing mapping entry must
/// not block the thousands of rows that do translate.
pub fn translate_columns(
    table: &mut CsvTable,
    map: &MappingTable,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut unmapped: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (column, domain) in TRANSLATED_COLUMNS {
        let Some(idx) = table.column(column) else {
            continue;
        };
        let mut misses = BTreeSet::new();
        for row in &mut table.rows {
            let Some(cell) = row.get_mut(idx) else {
                continue;
            };
            if cell.trim().is_empty() {
                continue;
            }
            let (translated, was_mapped) = map.translate(*domain, cell);
            if was_mapped {
                *cell = translated;
            } else {
                misses.insert(cell.clone());
            }
        }
        if !misses.is_empty() {
            warn!(column, unmapped = ?misses, "column had unmapped values");
            unmapped.insert((*column).to_string(), misses);
        }
    }
    unmapped
}

pub async fn migrate_sessions(
    pool: &SqlitePool,
    mut table: CsvTable,
    map: &MappingTable,
    expected_owner: &str,
) -> Result<MigrationReport, CsvError> {
    let mut report = MigrationReport {
        input_rows: table.rows.len() as u64,
        ..Default::default()
    };
    report.unmapped = translate_columns(&mut table, map);
    table.drop_columns(SURROGATE_COLUMNS);
    report.date_invalid = drop_invalid_dates(&mut table, DATE_COLUMN);
    report.owner_mismatch = filter_by_owner(&mut table, OWNER_COLUMN, expected_owner);
    report.written = append_rows(pool, SESSION_TABLE, &table).await?;
    Ok(report)
}
