//! # Sync Engine
//!
//! Shared state and remote-fetch plumbing for the import and export
//! pipelines: the connector, the library address, the schema snapshot, the
//! mapping tables, the session repository and the cancellation token, bundled
//! so the pipelines take one argument instead of seven.

use crate::mapping::MappingTables;
use crate::repository::SessionRepository;
use crate::schema::SchemaCache;
use crate::Result;
use provider_zotero::{LibraryUrl, RemoteItem, ZoteroConnector};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Tunables shared by both pipelines.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Items per remote request, bounded by the API's per-request maximum.
    pub chunk_size: usize,
    /// Unix-seconds cutoff for imports; remote items added strictly before
    /// it are skipped. Zero disables the filter.
    pub cutoff: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            cutoff: 0,
        }
    }
}

/// Remote items fetched for one import run, parents separated from their
/// attachment and note children.
#[derive(Debug, Default)]
pub struct FetchedItems {
    /// Top-level items, in listing order.
    pub parents: Vec<RemoteItem>,
    /// Child items grouped by parent key.
    pub children: HashMap<String, Vec<RemoteItem>>,
}

/// Everything a pipeline invocation needs.
pub struct SyncEngine {
    pub connector: ZoteroConnector,
    pub library: LibraryUrl,
    pub schema: SchemaCache,
    pub mappings: MappingTables,
    pub repository: Arc<dyn SessionRepository>,
    pub config: SyncConfig,
    cancel: CancellationToken,
}

impl SyncEngine {
    pub fn new(
        connector: ZoteroConnector,
        library: LibraryUrl,
        schema: SchemaCache,
        mappings: MappingTables,
        repository: Arc<dyn SessionRepository>,
        config: SyncConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connector,
            library,
            schema,
            mappings,
            repository,
            config,
            cancel,
        }
    }

    /// True once a stop has been requested. Pipelines poll this between
    /// chunks and wind down with partial results.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fetch the full records for `keys` in listing order, chunked to the
    /// configured size, with the cutoff filter applied and each record
    /// stripped of its per-response envelope.
    ///
    /// Stops between chunks when cancellation is requested; the caller must
    /// treat the result as partial in that case (see [`Self::is_cancelled`]).
    pub async fn fetch_remote_items(&self, keys: &[String]) -> Result<FetchedItems> {
        let mut fetched = FetchedItems::default();

        for chunk in keys.chunks(self.config.chunk_size.max(1)) {
            if self.is_cancelled() {
                info!("Stop requested, ending remote fetch early");
                break;
            }

            let items = self.connector.items_by_keys(&self.library, chunk).await?;
            for mut item in items {
                if let Some(added) = item.data.date_added_timestamp() {
                    if self.config.cutoff > 0 && added < self.config.cutoff {
                        debug!(key = %item.key, "Skipping item added before cutoff");
                        continue;
                    }
                }

                item.compact();
                match item.data.parent_item.clone() {
                    Some(parent_key) if item.is_child() => {
                        fetched.children.entry(parent_key).or_default().push(item);
                    }
                    _ => fetched.parents.push(item),
                }
            }
        }

        info!(
            parents = fetched.parents.len(),
            with_children = fetched.children.len(),
            "Fetched remote items"
        );
        Ok(fetched)
    }
}
