//! Dry-run validation: parse every fixture category for a user and
//! cross-check references without touching storage. Every check runs to
//! completion so a single pass surfaces the complete issue set.

use std::collections::HashSet;
use std::fs;

use crate::fixtures::{
    load_yaml, Equipment, FixtureError, MaintenanceEvent, Memberships, PooledFixtures, Profile,
    UserFixtures,
};
use crate::idmap::{SharedMappings, UserMappings};
use crate::paths::AdminPaths;
use crate::refcheck::{validate_refs, Issue, ReferenceSets};
use crate::tabular::CsvTable;

#[derive(Debug, Default)]
pub struct ValidationOutcome {
    /// Per-category status lines for operator output.
    pub notes: Vec<String>,
    /// Every problem found, across all categories.
    pub issues: Vec<String>,
}

impl ValidationOutcome {
    pub fn ok(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check every fixture category independently; a failure in one category
/// never blocks checking the others. Returns `Err` only when the user has no
/// fixture directory at all.
pub fn validate_user(paths: &AdminPaths, user: &str) -> Result<ValidationOutcome, FixtureError> {
    let user_dir = paths.user_dir(user);
    if !user_dir.is_dir() {
        return Err(FixtureError::Missing(user_dir));
    }

    let mut out = ValidationOutcome::default();
    let mut profile: Option<Profile> = None;
    let mut memberships: Option<Memberships> = None;
    let mut maintenance: Option<Vec<MaintenanceEvent>> = None;
    let mut boot_ids: HashSet<String> = HashSet::new();
    let mut blade_ids: HashSet<String> = HashSet::new();
    let mut config_ids: HashSet<String> = HashSet::new();

    // Auth: field-by-field so each missing field is its own issue.
    match load_yaml::<serde_yaml::Value>(&user_dir.join("auth.yaml")) {
        Ok(value) => {
            for field in ["login", "email", "skater_id", "password"] {
                if value.get(field).is_none() {
                    out.issues
                        .push(format!("auth.yaml: missing required field '{field}'"));
                }
            }
            let login = value.get("login").and_then(|v| v.as_str()).unwrap_or("?");
            out.notes.push(format!("auth.yaml: OK ({login})"));
        }
        Err(err) => out.issues.push(err.to_string()),
    }

    match load_yaml::<Profile>(&user_dir.join("profile.yaml")) {
        Ok(parsed) => {
            out.notes.push(format!(
                "profile.yaml: OK ({} {})",
                parsed.first_name, parsed.last_name
            ));
            profile = Some(parsed);
        }
        Err(FixtureError::Missing(_)) => out.issues.push("profile.yaml: not found".to_string()),
        Err(err) => out.issues.push(err.to_string()),
    }

    let equip_path = user_dir.join("equipment.yaml");
    if equip_path.is_file() {
        match load_yaml::<Equipment>(&equip_path) {
            Ok(equipment) => {
                boot_ids = equipment.boots.iter().map(|b| b.boot_id.clone()).collect();
                blade_ids = equipment.blades.iter().map(|b| b.blade_id.clone()).collect();
                config_ids = equipment
                    .configs
                    .iter()
                    .map(|c| c.config_id.clone())
                    .collect();
                for config in &equipment.configs {
                    if !boot_ids.contains(&config.boot_id) {
                        out.issues.push(format!(
                            "equipment.yaml: config {}... references unknown boot {}...",
                            short(&config.config_id),
                            short(&config.boot_id)
                        ));
                    }
                    if !blade_ids.contains(&config.blade_id) {
                        out.issues.push(format!(
                            "equipment.yaml: config {}... references unknown blade {}...",
                            short(&config.config_id),
                            short(&config.blade_id)
                        ));
                    }
                }
                out.notes.push(format!(
                    "equipment.yaml: {} boots, {} blades, {} configs",
                    equipment.boots.len(),
                    equipment.blades.len(),
                    equipment.configs.len()
                ));
            }
            Err(err) => out.issues.push(err.to_string()),
        }
    } else {
        out.notes
            .push("equipment.yaml: not found (skipping)".to_string());
    }

    let maint_path = user_dir.join("maintenance.yaml");
    if maint_path.is_file() {
        match load_yaml::<Vec<MaintenanceEvent>>(&maint_path) {
            Ok(events) => {
                for event in &events {
                    if let Some(blade_id) = &event.blade_id {
                        if !blade_ids.is_empty() && !blade_ids.contains(blade_id) {
                            out.issues.push(format!(
                                "maintenance.yaml: references unknown blade {}...",
                                short(blade_id)
                            ));
                        }
                    }
                    if let Some(config_id) = &event.config_id {
                        if !config_ids.is_empty() && !config_ids.contains(config_id) {
                            out.issues.push(format!(
                                "maintenance.yaml: references unknown config {}...",
                                short(config_id)
                            ));
                        }
                    }
                }
                out.notes
                    .push(format!("maintenance.yaml: {} records", events.len()));
                maintenance = Some(events);
            }
            Err(err) => out.issues.push(err.to_string()),
        }
    } else {
        out.notes
            .push("maintenance.yaml: not found (skipping)".to_string());
    }

    let memb_path = user_dir.join("memberships.yaml");
    if memb_path.is_file() {
        match load_yaml::<Memberships>(&memb_path) {
            Ok(parsed) => {
                out.notes.push(format!(
                    "memberships.yaml: {} club_memberships, {} punch_cards, {} lts_classes",
                    parsed.club_memberships.len(),
                    parsed.punch_cards.len(),
                    parsed.lts_classes.len()
                ));
                memberships = Some(parsed);
            }
            Err(err) => out.issues.push(err.to_string()),
        }
    } else {
        out.notes
            .push("memberships.yaml: not found (skipping)".to_string());
    }

    // Sessions directory: count the CSVs and make sure each one parses.
    let sessions_dir = paths.sessions_dir(user);
    if sessions_dir.is_dir() {
        let mut csv_count = 0_usize;
        if let Ok(entries) = fs::read_dir(&sessions_dir) {
            for path in entries.filter_map(|e| e.ok().map(|e| e.path())) {
                let is_csv = path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false);
                if !is_csv {
                    continue;
                }
                csv_count += 1;
                if let Err(err) = CsvTable::read(&path) {
                    out.issues.push(err.to_string());
                }
            }
        }
        out.notes.push(format!("sessions/: {csv_count} CSV file(s)"));
    } else {
        out.notes
            .push("sessions/: no directory (skipping)".to_string());
    }

    // Migration files: presence plus a parse of both mapping files.
    if paths.user_migrations_dir(user).is_dir() {
        out.notes.push(format!("migrations/: found ({user}/)"));
        let user_mappings = paths.user_mappings(user);
        if user_mappings.is_file() {
            if let Err(err) = UserMappings::load(&user_mappings) {
                out.issues.push(err.to_string());
            }
        }
        let shared_mappings = paths.shared_mappings();
        if shared_mappings.is_file() {
            if let Err(err) = SharedMappings::load(&shared_mappings) {
                out.issues.push(err.to_string());
            }
        }
    } else {
        out.notes
            .push("migrations/: no directory (legacy migration not configured)".to_string());
    }

    // Pooled reference cross-check, reusing whatever parsed above.
    match PooledFixtures::load(paths) {
        Ok(pooled) => {
            let refs = ReferenceSets::from_pooled(&pooled);
            let fixtures = UserFixtures {
                profile,
                memberships,
                maintenance,
            };
            out.issues.extend(
                validate_refs(&fixtures, &refs)
                    .iter()
                    .map(Issue::to_string),
            );
        }
        Err(err) => out.issues.push(err.to_string()),
    }

    Ok(out)
}

fn short(id: &str) -> String {
    id.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn valid_tree() -> (TempDir, AdminPaths) {
        let tmp = TempDir::new().unwrap();
        let paths = AdminPaths::new(tmp.path());

        let pooled = paths.pooled_dir();
        fs::create_dir_all(&pooled).unwrap();
        fs::write(
            pooled.join("coaches.yaml"),
            "- coach_id: coach-1\n  first_name: Ann\n  last_name: Ice\n",
        )
        .unwrap();
        fs::write(
            pooled.join("locations.yaml"),
            "- rink_id: rink-1\n  name: Main Rink\n",
        )
        .unwrap();
        fs::write(
            pooled.join("clubs.yaml"),
            "- club_id: club-1\n  club_name: North FSC\n",
        )
        .unwrap();

        let user_dir = paths.user_dir("sparkles");
        fs::create_dir_all(&user_dir).unwrap();
        fs::write(
            user_dir.join("auth.yaml"),
            "login: sparkles\nemail: s@example.com\nskater_id: uuid-s\npassword: x\n",
        )
        .unwrap();
        fs::write(
            user_dir.join("profile.yaml"),
            "first_name: Sparkle\nlast_name: Pond\nclub_id: club-1\n",
        )
        .unwrap();
        fs::write(
            user_dir.join("equipment.yaml"),
            "boots:\n  - boot_id: b1\nblades:\n  - blade_id: bl1\n\
             configs:\n  - config_id: c1\n    boot_id: b1\n    blade_id: bl1\n",
        )
        .unwrap();

        (tmp, paths)
    }

    #[test]
    fn valid_fixtures_pass() {
        let (_tmp, paths) = valid_tree();
        let outcome = validate_user(&paths, "sparkles").unwrap();
        assert!(outcome.ok(), "unexpected issues: {:?}", outcome.issues);
    }

    #[test]
    fn missing_auth_field_is_one_issue() {
        let (_tmp, paths) = valid_tree();
        fs::write(
            paths.user_dir("sparkles").join("auth.yaml"),
            "login: sparkles\nemail: s@example.com\n",
        )
        .unwrap();
        let outcome = validate_user(&paths, "sparkles").unwrap();
        assert_eq!(
            outcome
                .issues
                .iter()
                .filter(|i| i.contains("missing required field"))
                .count(),
            2
        );
    }

    #[test]
    fn config_referencing_unknown_boot_is_reported() {
        let (_tmp, paths) = valid_tree();
        fs::write(
            paths.user_dir("sparkles").join("equipment.yaml"),
            "boots: []\nblades:\n  - blade_id: bl1\n\
             configs:\n  - config_id: c1\n    boot_id: ghost\n    blade_id: bl1\n",
        )
        .unwrap();
        let outcome = validate_user(&paths, "sparkles").unwrap();
        assert!(outcome
            .issues
            .iter()
            .any(|i| i.contains("references unknown boot")));
    }

    #[test]
    fn missing_pooled_club_is_reported_but_does_not_stop_other_checks() {
        let (_tmp, paths) = valid_tree();
        fs::write(
            paths.user_dir("sparkles").join("profile.yaml"),
            "first_name: Sparkle\nlast_name: Pond\nclub_id: club-ghost\n",
        )
        .unwrap();
        // also break equipment to prove both categories report
        fs::write(
            paths.user_dir("sparkles").join("equipment.yaml"),
            "boots: []\nblades: []\nconfigs:\n  - config_id: c1\n    boot_id: g\n    blade_id: g\n",
        )
        .unwrap();
        let outcome = validate_user(&paths, "sparkles").unwrap();
        assert!(outcome.issues.iter().any(|i| i.contains("club-ghost")));
        assert!(outcome
            .issues
            .iter()
            .any(|i| i.contains("references unknown boot")));
    }

    #[test]
    fn unparsable_session_csv_is_an_issue() {
        let (_tmp, paths) = valid_tree();
        let sessions = paths.sessions_dir("sparkles");
        fs::create_dir_all(&sessions).unwrap();
        fs::write(sessions.join("bad.csv"), "a,b\n1,2,3\n").unwrap();
        let outcome = validate_user(&paths, "sparkles").unwrap();
        assert!(!outcome.ok());
    }

    #[test]
    fn missing_user_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let paths = AdminPaths::new(tmp.path());
        assert!(matches!(
            validate_user(&paths, "nobody"),
            Err(FixtureError::Missing(_))
        ));
    }
}
