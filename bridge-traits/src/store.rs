//! Host Resource Store Abstraction
//!
//! The host application owns a store of generic resources (items with typed
//! property values and attached media). The sync engine only ever touches it
//! through this trait: create/read/update/delete by id, id search by
//! structured query, batch-create with a continue-on-per-item-error mode,
//! and vocabulary lookups used to build the job-scoped schema cache.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::error::Result;

/// One property value on a resource payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceValue {
    /// Host-side property id the value is attached to.
    pub property_id: i64,
    #[serde(flatten)]
    pub data: ValueData,
}

/// The datatype-tagged content of a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "value")]
pub enum ValueData {
    Literal(String),
    Uri(String),
}

impl ResourceValue {
    pub fn literal(property_id: i64, value: impl Into<String>) -> Self {
        Self {
            property_id,
            data: ValueData::Literal(value.into()),
        }
    }

    pub fn uri(property_id: i64, value: impl Into<String>) -> Self {
        Self {
            property_id,
            data: ValueData::Uri(value.into()),
        }
    }
}

/// A media ingest directive attached to a payload: the store downloads the
/// file from `ingest_url` when it materializes the resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDirective {
    /// Public source URL recorded on the media.
    pub source: String,
    /// Possibly credentialed URL the store actually fetches.
    pub ingest_url: String,
    /// Property values for the media itself, keyed by term.
    pub values: BTreeMap<String, Vec<ResourceValue>>,
}

/// A resource being created or updated, built incrementally by the mapping
/// functions. Values are keyed by term (`prefix:localName`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePayload {
    pub resource_class_id: Option<i64>,
    pub item_set_ids: Vec<i64>,
    pub values: BTreeMap<String, Vec<ResourceValue>>,
    pub media: Vec<MediaDirective>,
}

/// Reference to a stored resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: i64,
}

/// A stored media record, as read back from the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: i64,
    /// Original source name (usually a filename or URL).
    pub source: Option<String>,
    /// Path of the stored original file, when the host keeps one locally.
    pub storage_path: Option<PathBuf>,
    pub media_type: Option<String>,
    /// True when the media is a stored file (as opposed to embeds, oEmbed
    /// renderers and the like).
    pub is_file: bool,
    /// Creation time, Unix epoch seconds (UTC).
    pub created: i64,
    /// Literal values by term (title, subjects, ...).
    pub values: HashMap<String, Vec<String>>,
}

/// A stored resource, as read back from the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: i64,
    /// Term of the resource class, if any.
    pub resource_class: Option<String>,
    /// Literal values by term.
    pub values: HashMap<String, Vec<String>>,
    pub media: Vec<MediaRecord>,
}

impl ResourceRecord {
    /// First literal value for a term.
    pub fn value(&self, term: &str) -> Option<&str> {
        self.values
            .get(term)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// All literal values for a term.
    pub fn values_of(&self, term: &str) -> &[String] {
        self.values.get(term).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Structured id search over the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuery {
    /// Restrict to resources in any of these sets ("all items in these
    /// sets" expansion).
    pub item_set_ids: Vec<i64>,
    /// Restrict to resources with this class term.
    pub resource_class: Option<String>,
}

/// A resource class as known to the host vocabulary storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceClassInfo {
    pub id: i64,
    pub local_name: String,
    pub term: String,
}

/// A property as known to the host vocabulary storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub id: i64,
    pub local_name: String,
    pub term: String,
}

/// The host resource store contract.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Create one resource.
    async fn create(&self, payload: ResourcePayload) -> Result<ResourceRef>;

    /// Read one resource by id.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotFound`](crate::BridgeError::NotFound) when
    /// the id does not resolve.
    async fn read(&self, id: i64) -> Result<ResourceRecord>;

    /// Fully replace one resource (non-partial update).
    async fn update(&self, id: i64, payload: ResourcePayload) -> Result<ResourceRef>;

    /// Delete one resource by id.
    async fn delete(&self, id: i64) -> Result<()>;

    /// Search, returning bare resource ids.
    async fn search_ids(&self, query: &ResourceQuery) -> Result<Vec<i64>>;

    /// Create a batch of resources. With `continue_on_error`, a failing
    /// payload yields `None` at its position instead of aborting the batch.
    async fn batch_create(
        &self,
        payloads: Vec<ResourcePayload>,
        continue_on_error: bool,
    ) -> Result<Vec<Option<ResourceRef>>>;

    /// All resource classes of one vocabulary, by namespace URI.
    async fn resource_classes(&self, namespace_uri: &str) -> Result<Vec<ResourceClassInfo>>;

    /// All properties of one vocabulary, by namespace URI.
    async fn properties(&self, namespace_uri: &str) -> Result<Vec<PropertyInfo>>;
}
