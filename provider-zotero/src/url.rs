//! Zotero API endpoint URL construction
//!
//! Pure string building, no side effects. Library identity is validated at
//! construction so every later builder call is infallible.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ZoteroError};

/// Zotero API base URI.
pub const BASE: &str = "https://api.zotero.org";

/// The two kinds of Zotero libraries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryType {
    User,
    Group,
}

impl LibraryType {
    /// The URL path segment for this library type.
    pub fn path_segment(&self) -> &'static str {
        match self {
            LibraryType::User => "users",
            LibraryType::Group => "groups",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryType::User => "user",
            LibraryType::Group => "group",
        }
    }
}

impl FromStr for LibraryType {
    type Err = ZoteroError;

    /// Accepts singular and plural spellings.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" | "users" => Ok(LibraryType::User),
            "group" | "groups" => Ok(LibraryType::Group),
            other => Err(ZoteroError::InvalidLibraryType(other.to_string())),
        }
    }
}

impl fmt::Display for LibraryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// URL builder bound to one Zotero library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryUrl {
    library_type: LibraryType,
    id: u64,
}

impl LibraryUrl {
    pub fn new(library_type: LibraryType, id: u64) -> Self {
        Self { library_type, id }
    }

    /// Parse library identity from strings, validating both parts before any
    /// request can be issued.
    pub fn parse(library_type: &str, id: &str) -> Result<Self> {
        let library_type = library_type.parse::<LibraryType>()?;
        let id = id
            .parse::<u64>()
            .map_err(|_| ZoteroError::InvalidLibraryId(id.to_string()))?;
        Ok(Self { library_type, id })
    }

    pub fn library_type(&self) -> LibraryType {
        self.library_type
    }

    pub fn library_id(&self) -> u64 {
        self.id
    }

    fn prefix(&self) -> String {
        format!("{}/{}/{}", BASE, self.library_type.path_segment(), self.id)
    }

    /// The set of all items in the library.
    pub fn items(&self, params: &[(&str, &str)]) -> String {
        format!("{}/items{}", self.prefix(), query(params))
    }

    /// A single item.
    pub fn item(&self, item_key: &str) -> String {
        format!("{}/items/{}", self.prefix(), item_key)
    }

    /// The set of child items (attachments, notes) of an item.
    pub fn item_children(&self, item_key: &str, params: &[(&str, &str)]) -> String {
        format!("{}/items/{}/children{}", self.prefix(), item_key, query(params))
    }

    /// The URL to an item file.
    pub fn item_file(&self, item_key: &str, params: &[(&str, &str)]) -> String {
        format!("{}/items/{}/file{}", self.prefix(), item_key, query(params))
    }

    /// The set of items within a specific collection in the library.
    pub fn collection_items(&self, collection_key: &str, params: &[(&str, &str)]) -> String {
        format!(
            "{}/collections/{}/items{}",
            self.prefix(),
            collection_key,
            query(params)
        )
    }
}

/// The new-item template for an item type. Not library-scoped.
pub fn template(item_type: &str, link_mode: Option<&str>) -> String {
    let mut params = vec![("itemType", item_type)];
    if let Some(mode) = link_mode {
        params.push(("linkMode", mode));
    }
    format!("{}/items/new{}", BASE, query(&params))
}

/// The user id and privileges of the given API key.
pub fn key(api_key: &str) -> String {
    format!("{}/keys/{}?v=3", BASE, urlencoding::encode(api_key))
}

/// Build a query string from pairs, keeping insertion order, RFC 3986
/// percent-encoded.
fn query(params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return String::new();
    }
    let encoded: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    format!("?{}", encoded.join("&"))
}
