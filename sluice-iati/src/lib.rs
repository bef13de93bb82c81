//! Sluice IATI data helpers
//!
//! The data-generation side of the site pipeline: the build targets run
//! these to turn downloaded activity data into the published JSON files.
//!
//! - Common classification keys and string helpers
//! - Lookup tables for organisations and (hierarchical) locations
//! - The per-location activity index

pub mod common;
pub mod error;
pub mod index;
pub mod lookup;

pub use error::{IatiError, Result};
pub use index::{Activity, ActivityRef, LocationEntry, LocationIndex, build_location_index};
pub use lookup::{LocationLookup, LookupTable, OrgLookup};
