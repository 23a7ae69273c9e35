//! # Mapping Tables
//!
//! Static translation tables between remote bibliographic vocabulary and
//! local ontology terms, embedded at compile time from `data/mapping/`.
//!
//! Two shapes exist:
//!
//! - **Priority maps** (remote name to an ordered candidate list of terms).
//!   The first candidate that resolves against the local schema wins.
//! - **Flat maps** (term to remote name, one-to-one). Iteration preserves
//!   file order, which callers rely on for deterministic output.
//!
//! An unmapped entry is represented by an empty candidate list and is never
//! an error; the corresponding data is simply skipped.

use crate::{Result, SyncError};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// A local ontology term split into its vocabulary prefix and local name,
/// parsed from the `prefix:localName` form used throughout the mapping files.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TermRef {
    pub prefix: String,
    pub local_name: String,
}

impl TermRef {
    /// Parse `prefix:localName`. Returns `None` for the empty string or a
    /// string without a colon, both of which mark an unmapped slot.
    pub fn parse(term: &str) -> Option<Self> {
        let (prefix, local_name) = term.split_once(':')?;
        if prefix.is_empty() || local_name.is_empty() {
            return None;
        }
        Some(Self {
            prefix: prefix.to_string(),
            local_name: local_name.to_string(),
        })
    }
}

impl fmt::Display for TermRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prefix, self.local_name)
    }
}

/// Remote name to ordered term candidates.
#[derive(Debug, Clone, Default)]
pub struct PriorityMap {
    entries: HashMap<String, Vec<TermRef>>,
}

impl PriorityMap {
    fn from_json(raw: &str) -> Result<Self> {
        let parsed: HashMap<String, Vec<String>> =
            serde_json::from_str(raw).map_err(|e| SyncError::Serialization(e.to_string()))?;

        let entries = parsed
            .into_iter()
            .map(|(name, terms)| {
                let candidates = terms.iter().filter_map(|t| TermRef::parse(t)).collect();
                (name, candidates)
            })
            .collect();

        Ok(Self { entries })
    }

    /// Ordered candidates for a remote name. Unknown or unmapped names
    /// yield an empty slice.
    pub fn candidates(&self, name: &str) -> &[TermRef] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

/// Term to remote name, one-to-one, in file order.
#[derive(Debug, Clone, Default)]
pub struct FlatMap {
    entries: Vec<(String, String)>,
}

impl FlatMap {
    fn from_json(raw: &str) -> Result<Self> {
        // Deserialized through Value to keep the file's key order.
        let parsed: Value =
            serde_json::from_str(raw).map_err(|e| SyncError::Serialization(e.to_string()))?;
        let object = parsed
            .as_object()
            .ok_or_else(|| SyncError::Serialization("Mapping file is not an object".to_string()))?;

        let mut entries = Vec::with_capacity(object.len());
        for (key, value) in object {
            let name = value.as_str().ok_or_else(|| {
                SyncError::Serialization(format!("Mapping value for {} is not a string", key))
            })?;
            entries.push((key.clone(), name.to_string()));
        }

        Ok(Self { entries })
    }

    pub fn get(&self, term: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == term)
            .map(|(_, name)| name.as_str())
    }

    /// Entries in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The reverse view, remote name to term, still in file order. With
    /// duplicate remote names the earlier entry shadows on lookup.
    pub fn invert(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(term, name)| (name.clone(), term.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All translation tables, loaded together.
#[derive(Debug, Clone)]
pub struct MappingTables {
    /// Remote item type to class term candidates.
    pub item_type: PriorityMap,
    /// Remote field name to property term candidates.
    pub item_field: PriorityMap,
    /// Remote creator type to property term candidates.
    pub creator_type: PriorityMap,
    /// Class term to remote item type, for export.
    pub resource_class: FlatMap,
    /// Property term to remote field name, for export.
    pub property: FlatMap,
    /// Property term to remote creator type, for export. Order decides
    /// which creator slot a multi-mapped value lands in.
    pub creator_name: FlatMap,
}

impl MappingTables {
    /// Load every table from the embedded mapping files.
    pub fn load() -> Result<Self> {
        Ok(Self {
            item_type: PriorityMap::from_json(include_str!("../data/mapping/item_type_map.json"))?,
            item_field: PriorityMap::from_json(include_str!(
                "../data/mapping/item_field_map.json"
            ))?,
            creator_type: PriorityMap::from_json(include_str!(
                "../data/mapping/creator_type_map.json"
            ))?,
            resource_class: FlatMap::from_json(include_str!(
                "../data/mapping/resource_class_map.json"
            ))?,
            property: FlatMap::from_json(include_str!("../data/mapping/property_map.json"))?,
            creator_name: FlatMap::from_json(include_str!(
                "../data/mapping/creator_name_map.json"
            ))?,
        })
    }
}
