//! Identifier translation between the legacy integer-keyed schema and the
//! UUID-keyed target schema.
//!
//! Built once per migration invocation from two declarative sources: the
//! shared mapping file (reference domains used by every user) and the
//! per-user mapping file (the user's own identity and skate configurations).
//! The table is read-only after [`MappingTable::build`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::fixtures::{load_yaml, FixtureError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapDomain {
    Skaters,
    Locations,
    Coaches,
    SkateTypes,
    SkateConfigs,
}

/// Cross-user mapping domains, from `migrations/shared_mappings.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SharedMappings {
    #[serde(default)]
    pub locations: BTreeMap<i64, String>,
    #[serde(default)]
    pub coaches: BTreeMap<i64, String>,
    #[serde(default)]
    pub skate_types: BTreeMap<i64, String>,
}

/// User-specific mapping domains, from `migrations/<user>/user_mappings.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserMappings {
    #[serde(default)]
    pub skaters: BTreeMap<i64, String>,
    #[serde(default)]
    pub skate_configs: BTreeMap<i64, String>,
}

impl SharedMappings {
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        load_yaml(path)
    }
}

impl UserMappings {
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        load_yaml(path)
    }
}

#[derive(Debug, Clone)]
pub struct MappingTable {
    maps: HashMap<MapDomain, HashMap<String, String>>,
}

impl MappingTable {
    pub fn build(shared: &SharedMappings, user: &UserMappings) -> Self {
        let mut maps: HashMap<MapDomain, HashMap<String, String>> = HashMap::new();

        maps.insert(MapDomain::Skaters, int_keys(&user.skaters));
        maps.insert(MapDomain::Locations, int_keys(&shared.locations));
        maps.insert(MapDomain::Coaches, int_keys(&shared.coaches));
        maps.insert(MapDomain::SkateTypes, int_keys(&shared.skate_types));

        // The tabular reader may hand back a skate config key as either 7 or
        // 7.0; register both spellings so lookups hit either way.
        let mut configs = HashMap::new();
        for (k, v) in &user.skate_configs {
            configs.insert(k.to_string(), v.clone());
            configs.insert(format!("{k}.0"), v.clone());
        }
        maps.insert(MapDomain::SkateConfigs, configs);

        Self { maps }
    }

    /// Translate `value` within `domain`. A miss returns the original value
    /// unchanged together with `was_mapped = false`; callers aggregate misses
    /// per column and surface them as warnings instead of failing the row.
    pub fn translate(&self, domain: MapDomain, value: &str) -> (String, bool) {
        let Some(map) = self.maps.get(&domain) else {
            return (value.to_string(), false);
        };
        let key = normalize_numeral(value);
        let hit = map.get(key.as_str()).or_else(|| map.get(value.trim()));
        match hit {
            Some(target) => (target.clone(), true),
            None => (value.to_string(), false),
        }
    }
}

/// Collapse whole-number spellings to their integer form: `"7"`, `"7.0"`, and
/// `" 7 "` all key as `"7"`. Anything else keys as its trimmed self.
fn normalize_numeral(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Ok(parsed) = trimmed.parse::<f64>() {
        if parsed.is_finite()
            && parsed.fract() == 0.0
            && parsed.abs() < i64::MAX as f64
        {
            return (parsed as i64).to_string();
        }
    }
    trimmed.to_string()
}

fn int_keys(source: &BTreeMap<i64, String>) -> HashMap<String, String> {
    source
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MappingTable {
        let shared = SharedMappings {
            locations: BTreeMap::from([(3, "uuid-rink-3".to_string())]),
            coaches: BTreeMap::from([(12, "uuid-A".to_string())]),
            skate_types: BTreeMap::new(),
        };
        let user = UserMappings {
            skaters: BTreeMap::from([(1, "uuid-skater".to_string())]),
            skate_configs: BTreeMap::from([(7, "uuid-config-7".to_string())]),
        };
        MappingTable::build(&shared, &user)
    }

    #[test]
    fn mapped_coach_id_translates() {
        let (value, mapped) = table().translate(MapDomain::Coaches, "12");
        assert_eq!(value, "uuid-A");
        assert!(mapped);
    }

    #[test]
    fn unmapped_value_passes_through() {
        let (value, mapped) = table().translate(MapDomain::Coaches, "999");
        assert_eq!(value, "999");
        assert!(!mapped);
    }

    #[test]
    fn skate_config_resolves_int_and_float_spellings_identically() {
        let t = table();
        let as_int = t.translate(MapDomain::SkateConfigs, "7");
        let as_float = t.translate(MapDomain::SkateConfigs, "7.0");
        assert_eq!(as_int, as_float);
        assert_eq!(as_int.0, "uuid-config-7");
        assert!(as_int.1);
    }

    #[test]
    fn float_spelling_normalizes_in_every_domain() {
        let (value, mapped) = table().translate(MapDomain::Locations, "3.0");
        assert_eq!(value, "uuid-rink-3");
        assert!(mapped);
    }

    #[test]
    fn non_numeric_values_key_as_themselves() {
        let (value, mapped) = table().translate(MapDomain::Locations, "rink-x");
        assert_eq!(value, "rink-x");
        assert!(!mapped);
    }
}
