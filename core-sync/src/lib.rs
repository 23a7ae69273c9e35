//! # Sync Core
//!
//! Bidirectional synchronization between a remote Zotero library and the
//! host's resource store.
//!
//! The crate is organized around three pipelines that run inside the host's
//! job runner:
//!
//! - **Import** ([`run_import`]): versioned listing, chunked fetch,
//!   vocabulary mapping, batch creation or in-place update, link recording.
//! - **Export** ([`run_export`]): resource selection, template-driven item
//!   construction, batched writes, attachment file upload.
//! - **Undo** ([`run_undo`]): deletion of everything an import created.
//!
//! [`SessionService`] is the front door: it validates API keys, probes the
//! remote library, creates the [`SyncSession`] row and dispatches the job.
//! Session state lives in SQLite behind [`SessionRepository`]; all host
//! interaction goes through the `bridge-traits` contracts.

pub mod db;
pub mod engine;
pub mod error;
pub mod export;
pub mod import;
pub mod mapping;
pub mod repository;
pub mod schema;
pub mod service;
pub mod session;
pub mod undo;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use engine::{FetchedItems, SyncConfig, SyncEngine};
pub use error::{Result, SyncError};
pub use export::{run_export, ExportArgs, ExportOutcome};
pub use import::{run_import, ImportArgs, ImportOutcome};
pub use mapping::{FlatMap, MappingTables, PriorityMap, TermRef};
pub use repository::{SessionRepository, SqliteSessionRepository};
pub use schema::{SchemaCache, VOCABULARIES};
pub use service::{ExportRequest, ImportRequest, LibraryProbe, SessionService};
pub use session::{OnExisting, SyncLink, SyncSession};
pub use undo::run_undo;
