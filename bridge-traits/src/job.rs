//! Background Job Abstraction
//!
//! Long-running sync work is handed to the host's job runner rather than
//! executed inline. The host owns scheduling, persistence of job state, and
//! the cancellation signal; the engine only dispatches by kind and polls
//! status by handle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Opaque identifier for a dispatched job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(pub String);

impl JobHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kinds of background work the engine dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Import,
    Export,
    UndoImport,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Import => "import",
            JobKind::Export => "export",
            JobKind::UndoImport => "undo_import",
        }
    }
}

impl FromStr for JobKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "import" => Ok(JobKind::Import),
            "export" => Ok(JobKind::Export),
            "undo_import" => Ok(JobKind::UndoImport),
            other => Err(BridgeError::OperationFailed(format!(
                "Unknown job kind: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a dispatched job, as reported by the host runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Stopped,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Stopped => "stopped",
            JobStatus::Error => "error",
        }
    }

    /// True once the job can no longer make progress. Undo is only permitted
    /// against terminal imports.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Stopped | JobStatus::Error
        )
    }
}

impl FromStr for JobStatus {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "stopped" => Ok(JobStatus::Stopped),
            "error" => Ok(JobStatus::Error),
            other => Err(BridgeError::OperationFailed(format!(
                "Unknown job status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The host's background job runner.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Queue a job of `kind` with JSON arguments, returning its handle.
    async fn dispatch(&self, kind: JobKind, args: serde_json::Value) -> Result<JobHandle>;

    /// Report the current status of a previously dispatched job.
    async fn status(&self, handle: &JobHandle) -> Result<JobStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_round_trip() {
        for kind in [JobKind::Import, JobKind::Export, JobKind::UndoImport] {
            assert_eq!(kind.as_str().parse::<JobKind>().unwrap(), kind);
        }
        assert!("compact".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_job_status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Stopped.is_terminal());
        assert!(JobStatus::Error.is_terminal());
    }
}
