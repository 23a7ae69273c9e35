//! Error types for the sync engine

use thiserror::Error;

/// Sync engine errors
#[derive(Error, Debug)]
pub enum SyncError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Migration failed
    #[error("Migration error: {0}")]
    Migration(String),

    /// Session not found
    #[error("Sync session not found: {session_id}")]
    SessionNotFound { session_id: i64 },

    /// A precondition on the caller's input failed, before any request
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Undo was requested while the sync job can still make progress
    #[error("Sync job for session {session_id} is still running")]
    SyncStillRunning { session_id: i64 },

    /// Mapping table or job argument (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Remote API failure, fatal to the current pipeline invocation
    #[error(transparent)]
    Remote(#[from] provider_zotero::ZoteroError),

    /// Host bridge failure
    #[error(transparent)]
    Bridge(#[from] bridge_traits::BridgeError),
}

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SyncError::SessionNotFound { session_id: 7 };
        assert_eq!(error.to_string(), "Sync session not found: 7");

        let error = SyncError::SyncStillRunning { session_id: 7 };
        assert_eq!(error.to_string(), "Sync job for session 7 is still running");
    }

    #[test]
    fn test_remote_error_conversion() {
        let remote = provider_zotero::ZoteroError::InvalidLibraryType("blog".to_string());
        let error: SyncError = remote.into();
        assert!(matches!(error, SyncError::Remote(_)));
    }
}
