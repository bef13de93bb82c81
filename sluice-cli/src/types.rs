//! Common types used across CLI modules

use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A run id as typed by the user: a full UUID or a prefix of one
///
/// Prefixes ignore case and dashes, so `3f2a9c1e00` and `3F2A9C1E-00` name
/// the same runs, as does the short id shown in container names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrPrefix {
    Full(Uuid),
    /// Lowercase hex digits, dashes removed
    Prefix(String),
}

impl IdOrPrefix {
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            IdOrPrefix::Full(uuid) => Some(*uuid),
            IdOrPrefix::Prefix(_) => None,
        }
    }

    /// True if `id` is this identifier or starts with this prefix
    pub fn matches(&self, id: Uuid) -> bool {
        match self {
            IdOrPrefix::Full(uuid) => *uuid == id,
            IdOrPrefix::Prefix(prefix) => id.simple().to_string().starts_with(prefix.as_str()),
        }
    }
}

impl FromStr for IdOrPrefix {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if let Ok(uuid) = Uuid::parse_str(input) {
            return Ok(IdOrPrefix::Full(uuid));
        }

        let prefix: String = input
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        if prefix.is_empty() {
            return Err("run id cannot be empty".to_string());
        }
        if let Some(bad) = prefix.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(format!("'{}' is not a run id: unexpected '{}'", input, bad));
        }

        Ok(IdOrPrefix::Prefix(prefix))
    }
}

impl fmt::Display for IdOrPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdOrPrefix::Full(uuid) => write!(f, "{}", uuid),
            IdOrPrefix::Prefix(prefix) => write!(f, "{}", prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Uuid {
        Uuid::parse_str("3f2a9c1e-0b7d-4000-8000-000000000000").unwrap()
    }

    #[test]
    fn test_parse() {
        assert_eq!(id().to_string().parse(), Ok(IdOrPrefix::Full(id())));
        assert_eq!(
            " 3F2A-9C ".parse(),
            Ok(IdOrPrefix::Prefix("3f2a9c".to_string()))
        );
        assert!("".parse::<IdOrPrefix>().is_err());
        assert!("---".parse::<IdOrPrefix>().is_err());
        assert!("run-42".parse::<IdOrPrefix>().unwrap_err().contains("'r'"));
    }

    #[test]
    fn test_prefix_matches_with_or_without_dashes() {
        let dashed: IdOrPrefix = "3f2a9c1e-0b".parse().unwrap();
        let compact: IdOrPrefix = "3f2a9c1e0b7d".parse().unwrap();
        let other: IdOrPrefix = "3f2b".parse().unwrap();

        assert!(dashed.matches(id()));
        assert!(compact.matches(id()));
        assert!(!other.matches(id()));
        assert_eq!(compact.as_uuid(), None);
        assert!(IdOrPrefix::Full(id()).matches(id()));
        assert_eq!(IdOrPrefix::Full(id()).as_uuid(), Some(id()));
    }
}
