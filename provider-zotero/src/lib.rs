//! # Zotero Provider
//!
//! Client for the Zotero Web API v3.
//!
//! ## Overview
//!
//! This module provides:
//! - Endpoint URL construction for user and group libraries
//! - Versioned listings (`format=versions`) and batched item fetches
//! - `Link` header pagination and `Last-Modified-Version` cursor access
//! - Write requests protected by a per-request write token
//! - Item-type templates for building write payloads
//! - The three-step file upload protocol
//! - API key introspection

pub mod connector;
pub mod error;
pub mod types;
pub mod url;

pub use connector::{FileUpload, UploadOutcome, ZoteroConnector};
pub use error::{Result, ZoteroError};
pub use types::{
    Creator, ItemData, ItemLinks, KeyPermissions, Link, RemoteItem, Tag, UploadAuthorization,
    UploadTarget, WriteError, WriteResponse,
};
pub use url::{LibraryType, LibraryUrl};
