pub mod db;
pub mod fixtures;
pub mod idmap;
pub mod logging;
pub mod paths;
pub mod refcheck;
pub mod restore;
pub mod tabular;
pub mod validate;

pub use fixtures::{FixtureError, PooledFixtures, UserFixtures};
pub use idmap::{MapDomain, MappingTable, SharedMappings, UserMappings};
pub use paths::AdminPaths;
pub use refcheck::{validate_refs, Issue, ReferenceSets};
pub use restore::bulk::{insert_each, BatchOutcome, BulkError};
pub use restore::{RestoreError, RestoreReport, Restorer, Step, StepSummary, STEP_ORDER};
pub use tabular::import::{import_maintenance, import_sessions, ImportReport};
pub use tabular::migrate::{migrate_sessions, MigrationReport};
pub use tabular::{CsvError, CsvTable};
pub use validate::{validate_user, ValidationOutcome};
