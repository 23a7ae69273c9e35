//! Sync session domain model
//!
//! A [`SyncSession`] tracks one import or export relationship with a remote
//! library: its display name, its public URL, the version cursor, and the
//! background jobs attached to it. The [`SyncLink`] rows it owns record
//! which local resource each remote item became.

use bridge_traits::JobHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;

/// One sync run's persisted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSession {
    /// Storage-assigned id.
    pub id: i64,

    /// The import/export job, once dispatched.
    pub job_id: Option<JobHandle>,

    /// The undo job, once dispatched.
    pub undo_job_id: Option<JobHandle>,

    /// Display name, taken from the remote library when reachable.
    pub name: String,

    /// Public URL of the remote library.
    pub url: String,

    /// Remote library version cursor. Bootstraps at 0 and is refreshed from
    /// the remote response after each read/write cycle; monotonically
    /// non-decreasing.
    pub version: i64,
}

/// One local-resource / remote-key link owned by a session.
///
/// Every run records links for the resources it created or updated, so a
/// remote key accumulates one row per run that touched it; the lowest-id
/// link is treated as canonical when resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLink {
    pub id: i64,
    pub session_id: i64,
    pub resource_id: i64,
    pub remote_key: String,
}

/// What to do when a record on one side already has a counterpart on the
/// other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnExisting {
    /// Always create a new counterpart.
    #[default]
    Create,
    /// Update the already-linked counterpart in place.
    Replace,
}

impl OnExisting {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnExisting::Create => "create",
            OnExisting::Replace => "replace",
        }
    }
}

impl FromStr for OnExisting {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(OnExisting::Create),
            "replace" => Ok(OnExisting::Replace),
            other => Err(SyncError::InvalidArgument(format!(
                "Unknown existing-record action: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for OnExisting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
