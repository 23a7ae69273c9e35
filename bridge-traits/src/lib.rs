//! # Host Bridge Traits
//!
//! Contracts between the sync engine and its host environment.
//!
//! ## Overview
//!
//! The sync engine treats everything outside the synchronization logic as an
//! external collaborator reached through a narrow trait:
//!
//! - [`HttpClient`](http::HttpClient) - generic HTTP transport (headers,
//!   timeout, raw body, response status/headers/body)
//! - [`ResourceStore`](store::ResourceStore) - the host's CRUD/search API over
//!   generic resources, including batch-create with per-item error recovery
//! - [`JobDispatcher`](job::JobDispatcher) - the host's background job runner
//!
//! Implementations live elsewhere (`bridge-reqwest` for HTTP; the host
//! application for store and jobs). All traits require `Send + Sync` so
//! pipelines can hold them across `.await` points.
//!
//! ## Error Handling
//!
//! Every trait uses [`BridgeError`](error::BridgeError). `NotFound` is a
//! distinct variant because the undo pipeline and the export pipeline both
//! treat a concurrently-deleted resource as an already-satisfied condition,
//! not a failure.

pub mod error;
pub mod http;
pub mod job;
pub mod store;

pub use error::BridgeError;
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use job::{JobDispatcher, JobHandle, JobKind, JobStatus};
pub use store::{
    MediaDirective, MediaRecord, PropertyInfo, ResourceClassInfo, ResourcePayload, ResourceQuery,
    ResourceRecord, ResourceRef, ResourceStore, ResourceValue, ValueData,
};
