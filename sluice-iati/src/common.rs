//! Common classification keys and string helpers

use indexmap::IndexMap;
use serde_json::Value;

/// Organisation roles in an activity
pub const ROLES: &[&str] = &["implementing", "programming", "funding"];

/// Geographic reach of an organisation
pub const SCOPES: &[&str] = &["local", "regional", "international", "unknown"];

/// Sector vocabularies
pub const SECTOR_TYPES: &[&str] = &["dac", "humanitarian"];

/// Subnational location levels, coarsest first
pub const LOCATION_TYPES: &[&str] = &["admin1", "admin2", "unclassified"];

/// Collapses runs of whitespace to one space and trims the ends
///
/// Case and punctuation are kept. Blank input yields `None`.
pub fn normalise_string(s: &str) -> Option<String> {
    let normalised = s.split_whitespace().collect::<Vec<_>>().join(" ");
    (!normalised.is_empty()).then_some(normalised)
}

/// Lookup token for a name: lowercase words separated by single spaces,
/// with punctuation removed
pub fn make_token(s: &str) -> String {
    s.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalises a location name and capitalises each word
pub fn fix_location(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Appends `element` unless it is blank or already present
///
/// Returns true if the element was added.
pub fn add_unique(list: &mut Vec<String>, element: &str) -> bool {
    if element.trim().is_empty() || list.iter().any(|existing| existing == element) {
        return false;
    }
    list.push(element.to_string());
    true
}

/// Appends a JSON object unless its `key` is blank or already used by an
/// element of the list
pub fn add_unique_by_key(list: &mut Vec<Value>, element: Value, key: &str) -> bool {
    let Some(wanted) = key_string(&element, key) else {
        return false;
    };
    if list
        .iter()
        .any(|existing| key_string(existing, key).as_deref() == Some(wanted.as_str()))
    {
        return false;
    }
    list.push(element);
    true
}

fn key_string(value: &Value, key: &str) -> Option<String> {
    let text = match value.get(key)? {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    (!text.trim().is_empty()).then_some(text)
}

/// Merges every list of the map into one, first occurrence wins
pub fn flatten(map: &IndexMap<String, Vec<String>>, excludes: &[&str]) -> Vec<String> {
    let mut result = Vec::new();
    for (key, values) in map {
        if excludes.contains(&key.as_str()) {
            continue;
        }
        for value in values {
            if !result.contains(value) {
                result.push(value.clone());
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalise_string() {
        assert_eq!(
            normalise_string("  Save the\tChildren \n International "),
            Some("Save the Children International".to_string())
        );
        assert_eq!(normalise_string("U.N. (OCHA)"), Some("U.N. (OCHA)".to_string()));
        assert_eq!(normalise_string(""), None);
        assert_eq!(normalise_string(" \t "), None);
    }

    #[test]
    fn test_make_token() {
        assert_eq!(make_token("  Médecins Sans-Frontières! "), "médecins sans frontières");
        assert_eq!(make_token("U.N.-OCHA"), "u n ocha");
        assert_eq!(make_token("snake_case"), "snake_case");
        assert_eq!(make_token("---"), "");
    }

    #[test]
    fn test_fix_location() {
        assert_eq!(fix_location("  BANADIR   region"), "Banadir Region");
        assert_eq!(fix_location("lower shabelle"), "Lower Shabelle");
        assert_eq!(fix_location(""), "");
    }

    #[test]
    fn test_add_unique() {
        let mut list = vec!["wash".to_string()];
        assert!(add_unique(&mut list, "health"));
        assert!(!add_unique(&mut list, "wash"));
        assert!(!add_unique(&mut list, "  "));
        assert_eq!(list, vec!["wash", "health"]);
    }

    #[test]
    fn test_add_unique_by_key() {
        let mut list = vec![json!({"code": "12220", "name": "Basic health"})];
        assert!(!add_unique_by_key(&mut list, json!({"code": "12220", "name": "dup"}), "code"));
        assert!(add_unique_by_key(&mut list, json!({"code": 140}), "code"));
        assert!(!add_unique_by_key(&mut list, json!({"code": "140"}), "code"));
        assert!(!add_unique_by_key(&mut list, json!({"name": "no code"}), "code"));
        assert!(!add_unique_by_key(&mut list, json!({"code": null}), "code"));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_flatten() {
        let mut map = IndexMap::new();
        map.insert("implementing".to_string(), vec!["A".to_string(), "B".to_string()]);
        map.insert("funding".to_string(), vec!["B".to_string(), "C".to_string()]);
        map.insert("programming".to_string(), vec!["D".to_string()]);

        assert_eq!(flatten(&map, &[]), vec!["A", "B", "C", "D"]);
        assert_eq!(flatten(&map, &["funding"]), vec!["A", "B", "D"]);
    }
}
