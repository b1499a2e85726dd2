//! Error types for appupdate.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for update operations.
pub type UpdateResult<T> = std::result::Result<T, UpdateError>;

/// Errors that can occur during update operations.
///
/// Status and availability queries never return these; they fail closed to a
/// sentinel instead. Errors only come out of enqueueing, inspecting, sharing
/// and dispatching.
#[derive(Debug, Error)]
pub enum UpdateError {
    // Download service errors
    #[error("Download service '{provider}' is disabled or unavailable")]
    ServiceUnavailable { provider: String },

    #[error("Failed to enqueue download: {message}")]
    EnqueueFailed { message: String },

    #[error("Download service query failed: {message}")]
    QueryFailed { message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Download failed: {message}")]
    DownloadFailed { message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // Package errors
    #[error("Failed to read package archive {path}: {message}")]
    PackageUnreadable { path: PathBuf, message: String },

    #[error("Package {package} is not installed")]
    PackageNotInstalled { package: String },

    // Location errors
    #[error("Path {path} is not shareable through authority {authority}")]
    NotShareable { authority: String, path: PathBuf },

    // Installation errors
    #[error("Install dispatch failed: {message}")]
    InstallFailed { message: String },

    #[error("Failed to open settings for {provider}: {message}")]
    SettingsFailed { provider: String, message: String },

    // Config errors
    #[error("Failed to load config: {message}")]
    ConfigError { message: String },

    // File system errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UpdateError {
    /// Check if this error is retriable on a later invocation.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::DownloadFailed { .. }
                | Self::QueryFailed { .. }
                | Self::ServiceUnavailable { .. }
        )
    }

    /// Check if this error came from the download transport.
    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Network(_) | Self::DownloadFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable() {
        let err = UpdateError::ServiceUnavailable {
            provider: "downloads".to_string(),
        };
        assert!(err.is_retriable());
        assert!(!err.is_network_error());

        let err = UpdateError::InstallFailed {
            message: "no installer".to_string(),
        };
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_display_mentions_provider() {
        let err = UpdateError::ServiceUnavailable {
            provider: "downloads".to_string(),
        };
        assert!(err.to_string().contains("downloads"));
    }
}
