//! Fixture-driven restore: a fixed, dependency-ordered sequence of load
//! steps with pre-flight referential validation and per-record fault
//! isolation.
//!
//! Pooled reference rows load before anything that references them; the
//! high-volume sessions step runs last so a failed earlier step wastes as
//! little work as possible.

pub mod bulk;

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use clap::ValueEnum;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

use crate::fixtures::{
    self, load_yaml, Auth, Equipment, FixtureError, Memberships, PooledFixtures, Profile, Rink,
    UserFixtures,
};
use crate::paths::AdminPaths;
use crate::refcheck::{validate_refs, Issue, ReferenceSets};
use crate::tabular::{
    append_rows, drop_invalid_dates, filter_by_owner, CsvError, CsvTable, DATE_COLUMN,
    OWNER_COLUMN, SURROGATE_COLUMNS,
};

use self::bulk::{insert_each, BatchOutcome, BulkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Pooled,
    Auth,
    Profile,
    Equipment,
    Memberships,
    Maintenance,
    Sessions,
}

/// The full dependency order. `--all` runs exactly this sequence.
pub const STEP_ORDER: [Step; 7] = [
    Step::Pooled,
    Step::Auth,
    Step::Profile,
    Step::Equipment,
    Step::Memberships,
    Step::Maintenance,
    Step::Sessions,
];

impl Step {
    pub fn name(self) -> &'static str {
        match self {
            Step::Pooled => "pooled",
            Step::Auth => "auth",
            Step::Profile => "profile",
            Step::Equipment => "equipment",
            Step::Memberships => "memberships",
            Step::Maintenance => "maintenance",
            Step::Sessions => "sessions",
        }
    }
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("user fixture directory not found: {}", .0.display())]
    UserDirMissing(PathBuf),
    #[error("restore aborted: {} missing pooled reference(s)", .0.len())]
    ReferencesMissing(Vec<Issue>),
    #[error(transparent)]
    Fixture(#[from] FixtureError),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Bulk(#[from] BulkError),
    #[error(transparent)]
    Csv(#[from] CsvError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub step: &'static str,
    pub inserted: u64,
    pub failed: u64,
    pub skipped: bool,
}

impl StepSummary {
    fn new(step: Step) -> Self {
        Self {
            step: step.name(),
            inserted: 0,
            failed: 0,
            skipped: false,
        }
    }

    fn absorb(&mut self, outcome: BatchOutcome) {
        self.inserted += outcome.inserted;
        self.failed += outcome.failures.len() as u64;
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreReport {
    pub steps: Vec<StepSummary>,
}

pub struct Restorer<'a> {
    pool: &'a SqlitePool,
    paths: &'a AdminPaths,
    user: &'a str,
}

impl<'a> Restorer<'a> {
    pub fn new(pool: &'a SqlitePool, paths: &'a AdminPaths, user: &'a str) -> Self {
        Self { pool, paths, user }
    }

    /// Validate, then run the requested steps. Any referential issue aborts
    /// before the first step with zero writes. Individual record failures
    /// inside a step are isolated and do not stop the step or later steps.
    pub async fn run(&self, steps: &[Step]) -> Result<RestoreReport, RestoreError> {
        let user_dir = self.paths.user_dir(self.user);
        if !user_dir.is_dir() {
            return Err(RestoreError::UserDirMissing(user_dir));
        }

        let pooled = PooledFixtures::load(self.paths)?;
        let refs = ReferenceSets::from_pooled(&pooled);
        let fixtures = UserFixtures::load(self.paths, self.user)?;
        let issues = validate_refs(&fixtures, &refs);
        if !issues.is_empty() {
            return Err(RestoreError::ReferencesMissing(issues));
        }

        let mut report = RestoreReport::default();
        for step in steps {
            info!(step = step.name(), user = self.user, "running restore step");
            let summary = match step {
                Step::Pooled => self.step_pooled(&pooled).await?,
                Step::Auth => self.step_auth().await?,
                Step::Profile => self.step_profile().await?,
                Step::Equipment => self.step_equipment().await?,
                Step::Memberships => self.step_memberships().await?,
                Step::Maintenance => self.step_maintenance().await?,
                Step::Sessions => self.step_sessions().await?,
            };
            report.steps.push(summary);
        }
        Ok(report)
    }

    fn owner(&self) -> Result<String, RestoreError> {
        Ok(fixtures::owner_id(self.paths, self.user)?)
    }

    /// Load shared reference data. Skips entirely when pooled data is already
    /// present from a previous user's restore; partial pooled states are not
    /// a supported outcome.
    async fn step_pooled(&self, pooled: &PooledFixtures) -> Result<StepSummary, RestoreError> {
        let mut summary = StepSummary::new(Step::Pooled);
        if pooled_already_loaded(self.pool).await? {
            info!("pooled data already present, skipping");
            summary.skipped = true;
            return Ok(summary);
        }

        summary.absorb(insert_each(self.pool, "coaches", &pooled.coaches).await?);

        let now = Utc::now().to_rfc3339();
        let rinks: Vec<Rink> = pooled
            .rinks
            .iter()
            .cloned()
            .map(|mut rink| {
                if rink.date_created.is_none() {
                    rink.date_created = Some(now.clone());
                }
                rink
            })
            .collect();
        summary.absorb(insert_each(self.pool, "rinks", &rinks).await?);

        summary.absorb(insert_each(self.pool, "clubs", &pooled.clubs).await?);
        Ok(summary)
    }

    async fn step_auth(&self) -> Result<StepSummary, RestoreError> {
        let mut summary = StepSummary::new(Step::Auth);
        let auth = Auth::load(self.paths, self.user)?;
        let row = AuthRow {
            login: auth.login,
            email: auth.email,
            phone: auth.phone,
            skater_id: auth.skater_id,
            password_hash: digest_password(&auth.password),
        };
        summary.absorb(insert_each(self.pool, "auth", std::slice::from_ref(&row)).await?);
        Ok(summary)
    }

    async fn step_profile(&self) -> Result<StepSummary, RestoreError> {
        let mut summary = StepSummary::new(Step::Profile);
        let owner = self.owner()?;
        let profile: Profile = load_yaml(&self.paths.user_dir(self.user).join("profile.yaml"))?;
        let rows = owned(&owner, std::slice::from_ref(&profile));
        summary.absorb(insert_each(self.pool, "skater_profile", &rows).await?);
        Ok(summary)
    }

    async fn step_equipment(&self) -> Result<StepSummary, RestoreError> {
        let mut summary = StepSummary::new(Step::Equipment);
        let owner = self.owner()?;
        let equipment: Equipment =
            load_yaml(&self.paths.user_dir(self.user).join("equipment.yaml"))?;
        summary.absorb(insert_each(self.pool, "boots", &owned(&owner, &equipment.boots)).await?);
        summary.absorb(insert_each(self.pool, "blades", &owned(&owner, &equipment.blades)).await?);
        summary.absorb(
            insert_each(self.pool, "skate_configs", &owned(&owner, &equipment.configs)).await?,
        );
        Ok(summary)
    }

    async fn step_memberships(&self) -> Result<StepSummary, RestoreError> {
        let mut summary = StepSummary::new(Step::Memberships);
        let owner = self.owner()?;
        let memberships: Memberships =
            load_yaml(&self.paths.user_dir(self.user).join("memberships.yaml"))?;
        summary.absorb(
            insert_each(
                self.pool,
                "club_members",
                &owned(&owner, &memberships.club_memberships),
            )
            .await?,
        );
        summary.absorb(
            insert_each(
                self.pool,
                "punch_cards",
                &owned(&owner, &memberships.punch_cards),
            )
            .await?,
        );
        summary.absorb(
            insert_each(
                self.pool,
                "lts_classes",
                &owned(&owner, &memberships.lts_classes),
            )
            .await?,
        );
        Ok(summary)
    }

    async fn step_maintenance(&self) -> Result<StepSummary, RestoreError> {
        let mut summary = StepSummary::new(Step::Maintenance);
        let path = self.paths.user_dir(self.user).join("maintenance.yaml");
        if !path.is_file() {
            info!(user = self.user, "no maintenance.yaml, skipping");
            summary.skipped = true;
            return Ok(summary);
        }
        let owner = self.owner()?;
        let events: Vec<crate::fixtures::MaintenanceEvent> = load_yaml(&path)?;
        summary.absorb(insert_each(self.pool, "maintenance", &owned(&owner, &events)).await?);
        Ok(summary)
    }

    /// Load post-migration session CSVs from `sessions/<user>/`, applying the
    /// same surrogate/date/owner treatment as a bulk import.
    async fn step_sessions(&self) -> Result<StepSummary, RestoreError> {
        let mut summary = StepSummary::new(Step::Sessions);
        let dir = self.paths.sessions_dir(self.user);
        if !dir.is_dir() {
            info!(path = %dir.display(), "no sessions directory, skipping");
            summary.skipped = true;
            return Ok(summary);
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(|source| RestoreError::Io {
                path: dir.clone(),
                source,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            info!(path = %dir.display(), "no CSV files found, skipping");
            summary.skipped = true;
            return Ok(summary);
        }

        let owner = self.owner()?;
        for file in files {
            let mut table = CsvTable::read(&file)?;
            table.drop_columns(SURROGATE_COLUMNS);
            let date_invalid = drop_invalid_dates(&mut table, DATE_COLUMN);
            let owner_mismatch = filter_by_owner(&mut table, OWNER_COLUMN, &owner);
            let written = append_rows(self.pool, "ice_sessions", &table).await?;
            summary.inserted += written;
            info!(
                file = %file.display(),
                written,
                date_invalid = date_invalid.len(),
                owner_mismatch = owner_mismatch.values().sum::<u64>(),
                "loaded sessions file"
            );
        }
        Ok(summary)
    }
}

/// True when the store already holds more than the minimal seed rows of
/// coaches, rinks, and clubs, as after a previous user's restore.
async fn pooled_already_loaded(pool: &SqlitePool) -> Result<bool, sqlx::Error> {
    let coaches: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM coaches")
        .fetch_one(pool)
        .await?;
    let rinks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rinks")
        .fetch_one(pool)
        .await?;
    let clubs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clubs")
        .fetch_one(pool)
        .await?;
    Ok(coaches > 1 && rinks > 1 && clubs > 1)
}

fn digest_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

#[derive(Serialize)]
struct AuthRow {
    login: String,
    email: String,
    phone: Option<String>,
    skater_id: String,
    password_hash: String,
}

/// Attach the resolved owner identity to fixture records on their way into
/// storage; the fixtures themselves never carry it.
#[derive(Serialize)]
struct Owned<'a, T: Serialize> {
    skater_id: &'a str,
    #[serde(flatten)]
    record: &'a T,
}

fn owned<'a, T: Serialize>(skater_id: &'a str, records: &'a [T]) -> Vec<Owned<'a, T>> {
    records
        .iter()
        .map(|record| Owned { skater_id, record })
        .collect()
}
