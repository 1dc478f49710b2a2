//! Typed fixture records and their YAML decoding.
//!
//! Every fixture file decodes into an explicit struct at this boundary;
//! unknown fields are rejected rather than silently carried to the storage
//! layer. Missing optional files are represented as `None` by the aggregate
//! loaders, missing required files as [`FixtureError::Missing`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths::AdminPaths;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("fixture file not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, FixtureError> {
    if !path.is_file() {
        return Err(FixtureError::Missing(path.to_path_buf()));
    }
    let text = fs::read_to_string(path).map_err(|source| FixtureError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| FixtureError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn load_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, FixtureError> {
    if !path.is_file() {
        return Ok(None);
    }
    load_yaml(path).map(Some)
}

// ---------------------------------------------------------------------------
// Pooled reference fixtures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Coach {
    pub coach_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub hourly_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rink {
    pub rink_id: String,
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Club {
    pub club_id: String,
    pub club_name: String,
}

#[derive(Debug, Clone)]
pub struct PooledFixtures {
    pub coaches: Vec<Coach>,
    pub rinks: Vec<Rink>,
    pub clubs: Vec<Club>,
}

impl PooledFixtures {
    pub fn load(paths: &AdminPaths) -> Result<Self, FixtureError> {
        let dir = paths.pooled_dir();
        Ok(Self {
            coaches: load_yaml(&dir.join("coaches.yaml"))?,
            rinks: load_yaml(&dir.join("locations.yaml"))?,
            clubs: load_yaml(&dir.join("clubs.yaml"))?,
        })
    }
}

// ---------------------------------------------------------------------------
// Per-user fixtures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Auth {
    pub login: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub skater_id: String,
    pub password: String,
}

impl Auth {
    pub fn load(paths: &AdminPaths, user: &str) -> Result<Self, FixtureError> {
        load_yaml(&paths.user_dir(user).join("auth.yaml"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub active_coach: Option<String>,
    #[serde(default)]
    pub home_rink: Option<String>,
    #[serde(default)]
    pub club_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Boot {
    pub boot_id: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default)]
    pub purchase_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Blade {
    pub blade_id: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub size: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkateConfig {
    pub config_id: String,
    pub boot_id: String,
    pub blade_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Equipment {
    #[serde(default)]
    pub boots: Vec<Boot>,
    #[serde(default)]
    pub blades: Vec<Blade>,
    #[serde(default)]
    pub configs: Vec<SkateConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClubMembership {
    pub club_id: String,
    #[serde(default)]
    pub member_number: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PunchCard {
    pub rink_id: String,
    #[serde(default)]
    pub punches_total: Option<i64>,
    #[serde(default)]
    pub punches_used: Option<i64>,
    #[serde(default)]
    pub purchase_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LtsClass {
    pub location_id: String,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Memberships {
    #[serde(default)]
    pub club_memberships: Vec<ClubMembership>,
    #[serde(default)]
    pub punch_cards: Vec<PunchCard>,
    #[serde(default)]
    pub lts_classes: Vec<LtsClass>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaintenanceEvent {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub blade_id: Option<String>,
    #[serde(default)]
    pub config_id: Option<String>,
    #[serde(default)]
    pub rink_id: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
}

/// The user fixtures that carry cross-references into the pooled set.
/// Files absent on disk load as `None`; the referential validator treats an
/// absent fixture as having nothing to check.
#[derive(Debug, Clone, Default)]
pub struct UserFixtures {
    pub profile: Option<Profile>,
    pub memberships: Option<Memberships>,
    pub maintenance: Option<Vec<MaintenanceEvent>>,
}

impl UserFixtures {
    pub fn load(paths: &AdminPaths, user: &str) -> Result<Self, FixtureError> {
        let dir = paths.user_dir(user);
        Ok(Self {
            profile: load_optional(&dir.join("profile.yaml"))?,
            memberships: load_optional(&dir.join("memberships.yaml"))?,
            maintenance: load_optional(&dir.join("maintenance.yaml"))?,
        })
    }
}

/// Resolve the target identity for an invocation from the user's auth fixture.
pub fn owner_id(paths: &AdminPaths, user: &str) -> Result<String, FixtureError> {
    Ok(Auth::load(paths, user)?.skater_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths_with_user(auth_yaml: &str) -> (TempDir, AdminPaths) {
        let tmp = TempDir::new().unwrap();
        let paths = AdminPaths::new(tmp.path());
        let user_dir = paths.user_dir("sparkles");
        std::fs::create_dir_all(&user_dir).unwrap();
        std::fs::write(user_dir.join("auth.yaml"), auth_yaml).unwrap();
        (tmp, paths)
    }

    #[test]
    fn owner_id_reads_auth_fixture() {
        let (_tmp, paths) = paths_with_user(
            "login: sparkles\nemail: s@example.com\nskater_id: uuid-s\npassword: hunter2\n",
        );
        assert_eq!(owner_id(&paths, "sparkles").unwrap(), "uuid-s");
    }

    #[test]
    fn missing_required_field_is_a_parse_error() {
        let (_tmp, paths) = paths_with_user("login: sparkles\nemail: s@example.com\n");
        let err = Auth::load(&paths, "sparkles").unwrap_err();
        assert!(matches!(err, FixtureError::Parse { .. }));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let (_tmp, paths) = paths_with_user(
            "login: sparkles\nemail: s@example.com\nskater_id: uuid-s\npassword: x\nextra: 1\n",
        );
        let err = Auth::load(&paths, "sparkles").unwrap_err();
        assert!(matches!(err, FixtureError::Parse { .. }));
    }

    #[test]
    fn absent_optional_files_load_as_none() {
        let (_tmp, paths) = paths_with_user(
            "login: sparkles\nemail: s@example.com\nskater_id: uuid-s\npassword: x\n",
        );
        let fixtures = UserFixtures::load(&paths, "sparkles").unwrap();
        assert!(fixtures.profile.is_none());
        assert!(fixtures.memberships.is_none());
        assert!(fixtures.maintenance.is_none());
    }

    #[test]
    fn missing_required_file_is_reported_with_its_path() {
        let tmp = TempDir::new().unwrap();
        let paths = AdminPaths::new(tmp.path());
        let err = PooledFixtures::load(&paths).unwrap_err();
        match err {
            FixtureError::Missing(path) => {
                assert!(path.ends_with("fixtures/pooled/coaches.yaml"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
