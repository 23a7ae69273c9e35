//! Zotero API response types
//!
//! Data structures for deserializing Zotero Web API v3 responses. Only the
//! parts of an item payload the sync engine consumes are kept; everything
//! else (library block, meta block) is dropped during deserialization to
//! bound memory on large libraries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::url::LibraryType;

/// One Zotero item, the full form (not only the `data` part).
///
/// Parent and child (attachment, note) items share this shape; a child is
/// recognized by `data.parentItem`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Item key
    pub key: String,

    /// Item version (the API's logical clock)
    #[serde(default)]
    pub version: i64,

    /// Item data fields
    #[serde(default)]
    pub data: ItemData,

    /// Hypermedia links
    #[serde(default)]
    pub links: ItemLinks,
}

impl RemoteItem {
    /// Drop payload parts the pipelines never read, to save memory.
    /// `data` (including its own key/version copy) and the enclosure link
    /// are kept.
    pub fn compact(&mut self) {
        self.version = 0;
        self.links.alternate = None;
        self.links.this = None;
    }

    /// Whether this record is a child of another item.
    pub fn is_child(&self) -> bool {
        self.data.parent_item.is_some()
    }
}

/// The `data` part of a Zotero item.
///
/// See: https://www.zotero.org/support/dev/web_api/v3/basics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemData {
    /// Item key (duplicated from the envelope)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Item version (duplicated from the envelope)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,

    /// Zotero item type (book, journalArticle, attachment, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Add time, ISO 8601 UTC
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_added: Option<String>,

    /// Modification time, ISO 8601 UTC
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_modified: Option<String>,

    /// Parent item key, set on child items only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_item: Option<String>,

    /// Attachment link mode (imported_file, imported_url, linked_file,
    /// linked_url)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_mode: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub creators: Vec<Creator>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,

    /// Every other data field (abstractNote, publisher, url, ...). Field
    /// names vary per item type, so they stay dynamic.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ItemData {
    /// Parse `dateAdded` as Unix epoch seconds (UTC).
    pub fn date_added_timestamp(&self) -> Option<i64> {
        let raw = self.date_added.as_deref()?;
        chrono::DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.timestamp())
    }
}

/// One creator entry. Either a single `name` or a first/last pair is
/// populated, depending on the creator mode chosen in Zotero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub creator_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl Creator {
    /// All present name parts joined with single spaces, in
    /// name/firstName/lastName order. `None` when no part is present.
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [
            self.name.as_deref(),
            self.first_name.as_deref(),
            self.last_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// One tag entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tag {
    pub tag: String,
}

/// Hypermedia links of an item. An enclosure link is only present when the
/// request was made with an API key and the attachment has a stored file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemLinks {
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub this: Option<Link>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate: Option<Link>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enclosure: Option<Link>,
}

/// One hypermedia link.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Link {
    pub href: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Response of a multi-item write request. All three buckets are keyed by
/// the item's positional index in the submitted array, as a string.
///
/// See: https://www.zotero.org/support/dev/web_api/v3/write_requests
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WriteResponse {
    #[serde(default)]
    pub success: HashMap<String, String>,

    #[serde(default)]
    pub unchanged: HashMap<String, String>,

    #[serde(default)]
    pub failed: HashMap<String, WriteError>,
}

impl WriteResponse {
    /// The key assigned to the item at `index`, whether written or unchanged.
    pub fn key_for(&self, index: usize) -> Option<&str> {
        let idx = index.to_string();
        self.success
            .get(&idx)
            .or_else(|| self.unchanged.get(&idx))
            .map(String::as_str)
    }

    /// The failure recorded for the item at `index`.
    pub fn failure_for(&self, index: usize) -> Option<&WriteError> {
        self.failed.get(&index.to_string())
    }
}

/// One failed entry of a write response.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteError {
    pub code: i64,
    pub message: String,
}

/// Response of an upload-authorization request. The file may already exist
/// server-side (same hash uploaded by anyone), in which case no transfer is
/// needed.
///
/// See: https://www.zotero.org/support/dev/web_api/v3/file_upload
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UploadAuthorization {
    Exists { exists: u8 },
    Pending(UploadTarget),
}

/// Storage target of an authorized upload. The raw file bytes are posted to
/// `url` wrapped in `prefix` and `suffix`, then registered with `upload_key`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
    pub url: String,
    pub content_type: String,
    pub prefix: String,
    pub suffix: String,
    pub upload_key: String,
}

/// API key introspection response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeyPermissions {
    #[serde(rename = "userID")]
    pub user_id: Option<u64>,

    #[serde(default)]
    pub access: KeyAccess,
}

/// The `access` block of a key introspection response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeyAccess {
    #[serde(default)]
    pub user: Option<AccessFlags>,

    /// Per-group access, keyed by group id, with an optional `all` entry.
    #[serde(default)]
    pub groups: HashMap<String, AccessFlags>,
}

/// Access flags of one library grant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessFlags {
    #[serde(default)]
    pub library: bool,

    #[serde(default)]
    pub files: bool,

    #[serde(default)]
    pub write: bool,
}

impl KeyPermissions {
    /// Whether the key grants library access to the given library. For user
    /// libraries the key's owner must be the library owner; for group
    /// libraries an all-groups grant or a per-group grant suffices.
    pub fn grants_library_access(&self, library_type: LibraryType, library_id: u64) -> bool {
        match library_type {
            LibraryType::User => {
                self.user_id == Some(library_id)
                    && self.access.user.as_ref().is_some_and(|a| a.library)
            }
            LibraryType::Group => {
                let all = self.access.groups.get("all").is_some_and(|a| a.library);
                let this = self
                    .access
                    .groups
                    .get(&library_id.to_string())
                    .is_some_and(|a| a.library);
                all || this
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_remote_item() {
        let json = r#"{
            "key": "ABCD2345",
            "version": 312,
            "library": {"type": "user", "id": 475425, "name": "Z"},
            "links": {
                "self": {"href": "https://api.zotero.org/users/475425/items/ABCD2345", "type": "application/json"},
                "enclosure": {"href": "https://api.zotero.org/users/475425/items/ABCD2345/file", "type": "application/pdf", "title": "paper.pdf"}
            },
            "data": {
                "key": "ABCD2345",
                "version": 312,
                "itemType": "journalArticle",
                "title": "On Sync",
                "abstractNote": "An abstract.",
                "dateAdded": "2024-03-01T10:00:00Z",
                "dateModified": "2024-03-02T10:00:00Z",
                "creators": [
                    {"creatorType": "author", "firstName": "Ada", "lastName": "Lovelace"}
                ],
                "tags": [{"tag": "history"}],
                "collections": ["COLL1234"]
            }
        }"#;

        let item: RemoteItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.key, "ABCD2345");
        assert_eq!(item.version, 312);
        assert_eq!(item.data.item_type.as_deref(), Some("journalArticle"));
        assert_eq!(item.data.title.as_deref(), Some("On Sync"));
        assert!(!item.is_child());
        assert!(item.links.enclosure.is_some());
        assert_eq!(
            item.data.fields.get("abstractNote").and_then(|v| v.as_str()),
            Some("An abstract.")
        );
        assert_eq!(
            item.data.date_added_timestamp(),
            Some(1709287200)
        );
    }

    #[test]
    fn test_compact_keeps_enclosure() {
        let json = r#"{
            "key": "K",
            "version": 5,
            "links": {
                "self": {"href": "a"},
                "alternate": {"href": "b"},
                "enclosure": {"href": "c"}
            },
            "data": {"itemType": "attachment", "parentItem": "P"}
        }"#;

        let mut item: RemoteItem = serde_json::from_str(json).unwrap();
        item.compact();
        assert!(item.links.this.is_none());
        assert!(item.links.alternate.is_none());
        assert!(item.links.enclosure.is_some());
        assert!(item.is_child());
    }

    #[test]
    fn test_creator_full_name() {
        let single = Creator {
            creator_type: "author".to_string(),
            name: Some("Institute of Things".to_string()),
            ..Default::default()
        };
        assert_eq!(single.full_name().as_deref(), Some("Institute of Things"));

        let split = Creator {
            creator_type: "author".to_string(),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            ..Default::default()
        };
        assert_eq!(split.full_name().as_deref(), Some("Ada Lovelace"));

        let empty = Creator {
            creator_type: "author".to_string(),
            ..Default::default()
        };
        assert_eq!(empty.full_name(), None);
    }

    #[test]
    fn test_write_response_buckets() {
        let json = r#"{
            "success": {"0": "KEY0"},
            "unchanged": {"2": "KEY2"},
            "failed": {"1": {"code": 400, "message": "Invalid creator"}}
        }"#;

        let response: WriteResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.key_for(0), Some("KEY0"));
        assert_eq!(response.key_for(2), Some("KEY2"));
        assert_eq!(response.key_for(1), None);
        let failure = response.failure_for(1).unwrap();
        assert_eq!(failure.code, 400);
        assert_eq!(failure.message, "Invalid creator");
    }

    #[test]
    fn test_upload_authorization_shapes() {
        let exists: UploadAuthorization = serde_json::from_str(r#"{"exists": 1}"#).unwrap();
        assert!(matches!(exists, UploadAuthorization::Exists { exists: 1 }));

        let pending: UploadAuthorization = serde_json::from_str(
            r#"{
                "url": "https://storage.example.org/upload",
                "contentType": "application/pdf",
                "prefix": "--pre--",
                "suffix": "--suf--",
                "uploadKey": "UPLOADKEY"
            }"#,
        )
        .unwrap();
        match pending {
            UploadAuthorization::Pending(target) => {
                assert_eq!(target.url, "https://storage.example.org/upload");
                assert_eq!(target.upload_key, "UPLOADKEY");
            }
            UploadAuthorization::Exists { .. } => panic!("expected pending upload"),
        }
    }

    #[test]
    fn test_key_permission_truth_table() {
        let json = r#"{
            "key": "abc",
            "userID": 475425,
            "access": {
                "user": {"library": true, "files": true, "write": true},
                "groups": {
                    "all": {"library": false, "write": false},
                    "169947": {"library": true, "write": true}
                }
            }
        }"#;

        let perms: KeyPermissions = serde_json::from_str(json).unwrap();
        assert!(perms.grants_library_access(LibraryType::User, 475425));
        assert!(!perms.grants_library_access(LibraryType::User, 1));
        assert!(perms.grants_library_access(LibraryType::Group, 169947));
        assert!(!perms.grants_library_access(LibraryType::Group, 2));

        let all_groups: KeyPermissions = serde_json::from_str(
            r#"{"userID": 1, "access": {"groups": {"all": {"library": true}}}}"#,
        )
        .unwrap();
        assert!(all_groups.grants_library_access(LibraryType::Group, 99));
        assert!(!all_groups.grants_library_access(LibraryType::User, 1));
    }
}
