//! Error types for the Zotero provider

use thiserror::Error;

/// Zotero provider errors
#[derive(Error, Debug)]
pub enum ZoteroError {
    /// The library type is not `user` or `group`
    #[error("Invalid Zotero library type: {0}")]
    InvalidLibraryType(String),

    /// The library id is not numeric
    #[error("Invalid Zotero library ID: {0}")]
    InvalidLibraryId(String),

    /// The API answered with a non-success status. Fatal to the calling
    /// pipeline invocation; never retried here.
    #[error("Requested \"{url}\" got status {status}: {body}")]
    RequestFailed { url: String, status: u16, body: String },

    /// Failed to parse an API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Transport-level failure
    #[error(transparent)]
    Bridge(#[from] bridge_traits::error::BridgeError),
}

/// Result type for Zotero operations
pub type Result<T> = std::result::Result<T, ZoteroError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_failed_display() {
        let error = ZoteroError::RequestFailed {
            url: "https://api.zotero.org/users/1/items".to_string(),
            status: 403,
            body: "Forbidden".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Requested \"https://api.zotero.org/users/1/items\" got status 403: Forbidden"
        );
    }
}
