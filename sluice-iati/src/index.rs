//! Location index
//!
//! Groups activities by the locations they mention, per location level,
//! with organisation and sector counts for each location. Keys keep the
//! order in which they were first seen.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use crate::common::{LOCATION_TYPES, ROLES, SECTOR_TYPES};
use crate::error::{IatiError, Result, read_json};

/// Activity as found in `activities.json`
///
/// Classification maps hold lists of names keyed by role, sector type or
/// location level; blank or null names are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Activity {
    pub identifier: String,
    #[serde(default)]
    pub title: Value,
    #[serde(default)]
    pub source: Value,
    #[serde(default)]
    pub locations: HashMap<String, Vec<Option<String>>>,
    #[serde(default)]
    pub orgs: HashMap<String, Vec<Option<String>>>,
    #[serde(default)]
    pub sectors: HashMap<String, Vec<Option<String>>>,
}

/// Reference to an activity from an index entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRef {
    pub identifier: String,
    pub title: Value,
    pub source: Value,
}

/// Everything known about one location
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocationEntry {
    pub activities: Vec<ActivityRef>,
    /// Activity count per organisation, over all roles
    pub orgs: IndexMap<String, u64>,
    /// Activity count per sector, per sector type
    pub sectors: IndexMap<String, IndexMap<String, u64>>,
}

/// `location level -> location name -> entry`
pub type LocationIndex = IndexMap<String, IndexMap<String, LocationEntry>>;

/// Trimmed names of `key` in a classification map
///
/// Null and empty names are skipped; a whitespace-only name is kept and
/// trims to `""`.
fn names<'a>(map: &'a HashMap<String, Vec<Option<String>>>, key: &str) -> impl Iterator<Item = &'a str> {
    map.get(key)
        .into_iter()
        .flatten()
        .flatten()
        .filter(|name| !name.is_empty())
        .map(|name| name.trim())
}

/// Builds the location index for a list of activities
pub fn build_location_index(activities: &[Activity]) -> LocationIndex {
    let mut index = LocationIndex::new();

    for activity in activities {
        for loctype in LOCATION_TYPES {
            let level = index.entry(loctype.to_string()).or_default();

            for location in names(&activity.locations, loctype) {
                let entry = level.entry(location.to_string()).or_default();

                entry.activities.push(ActivityRef {
                    identifier: activity.identifier.clone(),
                    title: activity.title.clone(),
                    source: activity.source.clone(),
                });

                for role in ROLES {
                    for org in names(&activity.orgs, role) {
                        *entry.orgs.entry(org.to_string()).or_default() += 1;
                    }
                }

                for sector_type in SECTOR_TYPES {
                    let counts = entry.sectors.entry(sector_type.to_string()).or_default();
                    for sector in names(&activity.sectors, sector_type) {
                        *counts.entry(sector.to_string()).or_default() += 1;
                    }
                }
            }
        }
    }

    index
}

/// Loads activities from a JSON array file
pub fn load_activities(path: &Path) -> Result<Vec<Activity>> {
    read_json(path)
}

/// Renders the index as JSON indented with four spaces
pub fn to_json(index: &LocationIndex) -> Result<String> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    index
        .serialize(&mut serializer)
        .map_err(|e| IatiError::Shape {
            what: "location index".to_string(),
            reason: e.to_string(),
        })?;
    String::from_utf8(buffer).map_err(|e| IatiError::Shape {
        what: "location index".to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn activities() -> Vec<Activity> {
        serde_json::from_value(json!([
            {
                "identifier": "XM-1",
                "title": "Water trucking",
                "source": "IATI",
                "locations": { "admin1": ["Banadir", " Bay "], "admin2": ["Mogadishu", ""] },
                "orgs": { "implementing": ["SRCS", "UNICEF"], "funding": ["UNICEF"], "other": ["Ignored"] },
                "sectors": { "dac": ["Water supply"], "humanitarian": ["WASH", null] }
            },
            {
                "identifier": "XM-2",
                "title": "Clinic support",
                "source": "3W",
                "locations": { "admin1": ["Banadir"] },
                "orgs": { "programming": ["WHO"] },
                "sectors": { "dac": ["Basic health"] }
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_index_groups_by_level_and_location() {
        let index = build_location_index(&activities());

        assert_eq!(
            index.keys().collect::<Vec<_>>(),
            vec!["admin1", "admin2", "unclassified"]
        );
        assert_eq!(
            index["admin1"].keys().collect::<Vec<_>>(),
            vec!["Banadir", "Bay"]
        );
        assert_eq!(index["admin2"].keys().collect::<Vec<_>>(), vec!["Mogadishu"]);
        assert!(index["unclassified"].is_empty());

        let banadir = &index["admin1"]["Banadir"];
        assert_eq!(
            banadir
                .activities
                .iter()
                .map(|a| a.identifier.as_str())
                .collect::<Vec<_>>(),
            vec!["XM-1", "XM-2"]
        );
    }

    #[test]
    fn test_index_counts_orgs_and_sectors() {
        let index = build_location_index(&activities());
        let banadir = &index["admin1"]["Banadir"];

        assert_eq!(banadir.orgs["UNICEF"], 2);
        assert_eq!(banadir.orgs["SRCS"], 1);
        assert_eq!(banadir.orgs["WHO"], 1);
        assert!(!banadir.orgs.contains_key("Ignored"));

        assert_eq!(banadir.sectors["dac"]["Water supply"], 1);
        assert_eq!(banadir.sectors["dac"]["Basic health"], 1);
        assert_eq!(banadir.sectors["humanitarian"]["WASH"], 1);

        // Sector types are present even without sectors
        let mogadishu = &index["admin2"]["Mogadishu"];
        assert!(mogadishu.sectors.contains_key("humanitarian"));
    }

    #[test]
    fn test_whitespace_only_names_are_kept_blank() {
        let activities: Vec<Activity> = serde_json::from_value(json!([{
            "identifier": "XM-4",
            "title": "t",
            "source": "s",
            "locations": { "unclassified": ["   ", "", null] },
            "orgs": { "implementing": [" ", ""] }
        }]))
        .unwrap();

        let index = build_location_index(&activities);

        assert_eq!(index["unclassified"].keys().collect::<Vec<_>>(), vec![""]);
        let blank = &index["unclassified"][""];
        assert_eq!(blank.activities.len(), 1);
        assert_eq!(blank.orgs[""], 1);
    }

    #[test]
    fn test_empty_input_gives_empty_index() {
        assert!(build_location_index(&[]).is_empty());
    }

    #[test]
    fn test_json_output_preserves_order() {
        let json = to_json(&build_location_index(&activities())).unwrap();
        let admin1 = json.find("\"admin1\"").unwrap();
        let admin2 = json.find("\"admin2\"").unwrap();
        assert!(admin1 < admin2);
        assert!(json.contains("\n    \"admin1\": {"));
        assert!(json.find("\"Banadir\"").unwrap() < json.find("\"Bay\"").unwrap());
    }

    #[test]
    fn test_load_activities() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activities.json");
        std::fs::write(&path, r#"[{ "identifier": "XM-3", "title": "t", "source": "s" }]"#).unwrap();

        let loaded = load_activities(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].locations.is_empty());
    }
}
