//! Lookup tables for organisation and location names
//!
//! Tables are built from JSON maps and keyed by [`make_token`], so lookups
//! ignore case, spacing and punctuation. Explicit keys always win; names
//! and synonyms only fill keys that are still free.

use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::common::{make_token, normalise_string};
use crate::error::{IatiError, Result, read_json};

/// Token-keyed table over a JSON map of records
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: HashMap<String, Value>,
}

impl LookupTable {
    /// Builds a table from `{ key: { name?, synonyms?, ... } }`
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut entries = HashMap::new();

        for (key, info) in map {
            entries.insert(make_token(key), info.clone());
        }

        for info in map.values() {
            if let Some(name) = info.get("name").and_then(Value::as_str) {
                entries
                    .entry(make_token(name))
                    .or_insert_with(|| info.clone());
            }
            for synonym in synonyms(info) {
                entries
                    .entry(make_token(synonym))
                    .or_insert_with(|| info.clone());
            }
        }

        Self { entries }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let map: Map<String, Value> = read_json(path)?;
        Ok(Self::from_map(&map))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(&make_token(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn synonyms(info: &Value) -> impl Iterator<Item = &str> {
    info.get("synonyms")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

/// Organisation lookup (`org-map.json`)
#[derive(Debug, Clone)]
pub struct OrgLookup {
    table: LookupTable,
}

impl OrgLookup {
    pub fn new(table: LookupTable) -> Self {
        Self { table }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        LookupTable::from_path(path).map(Self::new)
    }

    /// Looks an organisation up by name
    ///
    /// Unknown organisations get a record with the normalised name and an
    /// `unknown` scope. Blank names yield `None`.
    pub fn lookup_org(&self, name: &str) -> Option<Value> {
        let normalised = normalise_string(name)?;

        match self.table.get(name) {
            Some(info) => Some(info.clone()),
            None => {
                warn!("Failed lookup |{}|", make_token(name));
                Some(json!({ "name": normalised, "scope": "unknown" }))
            }
        }
    }
}

/// Hierarchical location lookup (`location-map.json`)
///
/// The map nests `admin1 -> admin2 -> unclassified`. Every record in the
/// table carries the names of its parents.
#[derive(Debug, Clone)]
pub struct LocationLookup {
    table: LookupTable,
}

impl LocationLookup {
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        let mut map = map.clone();
        annotate_parents(&mut map)?;

        let mut entries: HashMap<String, Value> = HashMap::new();

        for (region_key, region) in &map {
            entries.insert(make_token(region_key), region.clone());

            for (district_key, district) in children(region, "admin2") {
                entries
                    .entry(make_token(district_key))
                    .or_insert_with(|| district.clone());

                for (place_key, place) in children(district, "unclassified") {
                    for synonym in std::iter::once(place_key.as_str()).chain(synonyms(place)) {
                        entries
                            .entry(make_token(synonym))
                            .or_insert_with(|| place.clone());
                    }
                }

                for synonym in synonyms(district) {
                    entries
                        .entry(make_token(synonym))
                        .or_insert_with(|| district.clone());
                }
            }

            for synonym in synonyms(region) {
                entries
                    .entry(make_token(synonym))
                    .or_insert_with(|| region.clone());
            }
        }

        Ok(Self {
            table: LookupTable { entries },
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let map: Map<String, Value> = read_json(path)?;
        Self::from_map(&map)
    }

    /// Looks a location up by name
    ///
    /// Unknown names get a record with the normalised name at `loctype`.
    /// Blank names yield `None`.
    pub fn lookup_location(&self, name: &str, loctype: &str) -> Option<Value> {
        let normalised = normalise_string(name)?;

        Some(
            self.table
                .get(name)
                .cloned()
                .unwrap_or_else(|| json!({ "level": loctype, "name": normalised })),
        )
    }
}

fn record_name<'a>(record: &'a Value, key: &str) -> Result<&'a str> {
    record
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| IatiError::Shape {
            what: "location map".to_string(),
            reason: format!("entry '{}' has no name", key),
        })
}

/// Writes parent names into nested districts (`admin1`) and places
/// (`admin1`, `admin2`)
///
/// A region or district needs a `name` only when it has children.
fn annotate_parents(map: &mut Map<String, Value>) -> Result<()> {
    for (region_key, region) in map.iter_mut() {
        if children(region, "admin2").next().is_none() {
            continue;
        }
        let region_name = record_name(region, region_key)?.to_string();

        let Some(districts) = region.get_mut("admin2").and_then(Value::as_object_mut) else {
            continue;
        };
        for (district_key, district) in districts.iter_mut() {
            set_field(district, "admin1", &region_name);

            if children(district, "unclassified").next().is_none() {
                continue;
            }
            let district_name = record_name(district, district_key)?.to_string();

            if let Some(places) = district.get_mut("unclassified").and_then(Value::as_object_mut) {
                for place in places.values_mut() {
                    set_field(place, "admin1", &region_name);
                    set_field(place, "admin2", &district_name);
                }
            }
        }
    }
    Ok(())
}

fn children<'a>(record: &'a Value, field: &str) -> impl Iterator<Item = (&'a String, &'a Value)> {
    record
        .get(field)
        .and_then(Value::as_object)
        .into_iter()
        .flatten()
}

fn set_field(record: &mut Value, field: &str, value: &str) {
    if let Some(object) = record.as_object_mut() {
        object.insert(field.to_string(), Value::String(value.to_string()));
    }
}
