//! # Undo Pipeline
//!
//! Deletes every resource a session's import created, walking the session's
//! links in insertion order. A resource that was already deleted by hand is
//! not an error; its link is removed all the same, so a completed undo
//! always leaves the session with zero links.

use crate::repository::SessionRepository;
use crate::Result;
use bridge_traits::{BridgeError, ResourceStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// How many records are processed between stop-request polls.
const STOP_POLL_INTERVAL: usize = 50;

/// Run one undo, returning the number of resources actually deleted.
#[instrument(skip(repository, store, cancel))]
pub async fn run_undo(
    repository: &Arc<dyn SessionRepository>,
    store: &dyn ResourceStore,
    cancel: &CancellationToken,
    session_id: i64,
) -> Result<u64> {
    let links = repository.links_for_session(session_id).await?;
    info!(count = links.len(), "Undoing imported resources");

    let mut deleted = 0u64;
    for (index, link) in links.iter().enumerate() {
        if index % STOP_POLL_INTERVAL == 0 && cancel.is_cancelled() {
            info!(deleted, "Stop requested, ending undo early");
            return Ok(deleted);
        }

        match store.delete(link.resource_id).await {
            Ok(()) => deleted += 1,
            Err(BridgeError::NotFound(id)) => {
                debug!(resource_id = id, "Resource already gone");
            }
            Err(e) => {
                warn!(resource_id = link.resource_id, error = %e, "Failed to delete resource");
                return Err(e.into());
            }
        }

        // The link goes away even when the resource was already gone.
        repository.delete_link(link.id).await?;
    }

    info!(deleted, "Undo finished");
    Ok(deleted)
}
