//! Referential validation of user fixtures against the pooled reference
//! sets. Pure membership tests; never touches storage.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::fixtures::{PooledFixtures, UserFixtures};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Coach,
    Location,
    Club,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefKind::Coach => f.write_str("coach"),
            RefKind::Location => f.write_str("location"),
            RefKind::Club => f.write_str("club"),
        }
    }
}

/// One referential violation: `source` fixture's `field` names a `kind`
/// identifier that is not in the pooled set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub source: String,
    pub field: String,
    pub kind: RefKind,
    pub value: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} references {} {} which is not in the pooled {} set",
            self.source, self.field, self.kind, self.value, self.kind
        )
    }
}

/// Per-domain sets of currently valid target identifiers, derived from the
/// pooled fixtures. Used only for membership tests, never for translation.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSets {
    pub coaches: HashSet<String>,
    pub locations: HashSet<String>,
    pub clubs: HashSet<String>,
}

impl ReferenceSets {
    pub fn from_pooled(pooled: &PooledFixtures) -> Self {
        Self {
            coaches: pooled.coaches.iter().map(|c| c.coach_id.clone()).collect(),
            locations: pooled.rinks.iter().map(|r| r.rink_id.clone()).collect(),
            clubs: pooled.clubs.iter().map(|c| c.club_id.clone()).collect(),
        }
    }

    fn set(&self, kind: RefKind) -> &HashSet<String> {
        match kind {
            RefKind::Coach => &self.coaches,
            RefKind::Location => &self.locations,
            RefKind::Club => &self.clubs,
        }
    }
}

/// Walk every FK-shaped field across the user fixtures; one [`Issue`] per
/// miss. Empty result means the fixtures are referentially sound.
pub fn validate_refs(fixtures: &UserFixtures, refs: &ReferenceSets) -> Vec<Issue> {
    let mut issues = Vec::new();

    let mut check = |source: &str, field: &str, kind: RefKind, value: &Option<String>| {
        if let Some(value) = value {
            if !value.is_empty() && !refs.set(kind).contains(value) {
                issues.push(Issue {
                    source: source.to_string(),
                    field: field.to_string(),
                    kind,
                    value: value.clone(),
                });
            }
        }
    };

    if let Some(profile) = &fixtures.profile {
        check("profile.yaml", "active_coach", RefKind::Coach, &profile.active_coach);
        check("profile.yaml", "home_rink", RefKind::Location, &profile.home_rink);
        check("profile.yaml", "club_id", RefKind::Club, &profile.club_id);
    }

    if let Some(memberships) = &fixtures.memberships {
        for membership in &memberships.club_memberships {
            let club = Some(membership.club_id.clone());
            check("memberships.yaml", "club_id", RefKind::Club, &club);
        }
        for card in &memberships.punch_cards {
            let rink = Some(card.rink_id.clone());
            check("memberships.yaml", "rink_id", RefKind::Location, &rink);
        }
        for class in &memberships.lts_classes {
            let location = Some(class.location_id.clone());
            check("memberships.yaml", "location_id", RefKind::Location, &location);
        }
    }

    if let Some(maintenance) = &fixtures.maintenance {
        for event in maintenance {
            check("maintenance.yaml", "rink_id", RefKind::Location, &event.rink_id);
        }
    }

    issues
}
