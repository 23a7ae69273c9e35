//! # Schema Cache
//!
//! One-shot snapshot of the host's ontology, taken at the start of a sync
//! run so that mapping lookups never touch the store mid-pipeline.
//!
//! Classes and properties are indexed by `(vocabulary prefix, local name)`.
//! A vocabulary the host does not have installed simply contributes no
//! entries; lookups against it miss and the mapped data is skipped.

use crate::mapping::TermRef;
use crate::Result;
use bridge_traits::ResourceStore;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Vocabularies consulted during mapping, as (prefix, namespace URI).
pub const VOCABULARIES: &[(&str, &str)] = &[
    ("dcterms", "http://purl.org/dc/terms/"),
    ("dctype", "http://purl.org/dc/dcmitype/"),
    ("bibo", "http://purl.org/ontology/bibo/"),
];

/// Indexed snapshot of the host's classes and properties.
#[derive(Debug, Clone, Default)]
pub struct SchemaCache {
    classes: HashMap<(String, String), i64>,
    properties: HashMap<(String, String), i64>,
}

impl SchemaCache {
    /// Snapshot every vocabulary in [`VOCABULARIES`] from the store.
    pub async fn load(store: &dyn ResourceStore) -> Result<Self> {
        let mut cache = Self::default();

        for (prefix, namespace_uri) in VOCABULARIES {
            let classes = store.resource_classes(namespace_uri).await?;
            let properties = store.properties(namespace_uri).await?;

            if classes.is_empty() && properties.is_empty() {
                warn!(prefix, "Vocabulary not installed, its mappings will be skipped");
                continue;
            }

            debug!(
                prefix,
                classes = classes.len(),
                properties = properties.len(),
                "Cached vocabulary"
            );

            for class in classes {
                cache
                    .classes
                    .insert((prefix.to_string(), class.local_name), class.id);
            }
            for property in properties {
                cache
                    .properties
                    .insert((prefix.to_string(), property.local_name), property.id);
            }
        }

        Ok(cache)
    }

    /// Class id for one term, if its vocabulary is installed.
    pub fn class(&self, term: &TermRef) -> Option<i64> {
        self.classes
            .get(&(term.prefix.clone(), term.local_name.clone()))
            .copied()
    }

    /// Property id for one term, if its vocabulary is installed.
    pub fn property(&self, term: &TermRef) -> Option<i64> {
        self.properties
            .get(&(term.prefix.clone(), term.local_name.clone()))
            .copied()
    }

    /// First class candidate that resolves.
    pub fn resolve_class(&self, candidates: &[TermRef]) -> Option<i64> {
        candidates.iter().find_map(|term| self.class(term))
    }

    /// First property candidate that resolves.
    pub fn resolve_property(&self, candidates: &[TermRef]) -> Option<i64> {
        candidates.iter().find_map(|term| self.property(term))
    }
}
