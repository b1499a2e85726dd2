//! Download service interface.
//!
//! The transport itself lives behind [`DownloadService`]; the orchestrator only
//! enqueues requests and reads back records by handle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::UpdateResult;

/// MIME type of an installable package archive.
pub const PACKAGE_ARCHIVE_MIME: &str = "application/vnd.android.package-archive";

/// Opaque identifier of an enqueued download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadHandle(pub u64);

impl std::fmt::Display for DownloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DownloadHandle {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Status of a download as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    Running,
    Paused,
    Successful,
    Failed,
    /// No record found, or the query itself failed
    Unknown,
}

impl DownloadStatus {
    /// Platform status code.
    pub fn code(&self) -> i32 {
        match self {
            Self::Pending => 1,
            Self::Running => 2,
            Self::Paused => 4,
            Self::Successful => 8,
            Self::Failed => 16,
            Self::Unknown => -1,
        }
    }

    /// Map a platform status code; anything unrecognised is `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Pending,
            2 => Self::Running,
            4 => Self::Paused,
            8 => Self::Successful,
            16 => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Still moving towards a terminal state.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Paused)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Failed)
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A request handed to the download service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: url::Url,
    /// Where the service must materialize the file
    pub destination: PathBuf,
    pub title: Option<String>,
    pub description: Option<String>,
    pub mime_type: String,
}

impl DownloadRequest {
    /// Create a package-archive request for `url` landing at `destination`.
    pub fn new(url: url::Url, destination: PathBuf) -> Self {
        Self {
            url,
            destination,
            title: None,
            description: None,
            mime_type: PACKAGE_ARCHIVE_MIME.to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One row of the download service's records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub handle: DownloadHandle,
    pub status: DownloadStatus,
    /// Raw local URI column, unset until the service has picked a file
    pub local_uri: Option<String>,
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
    pub last_modified: DateTime<Utc>,
}

impl DownloadRecord {
    /// A fresh pending record.
    pub fn pending(handle: DownloadHandle) -> Self {
        Self {
            handle,
            status: DownloadStatus::Pending,
            local_uri: None,
            bytes_downloaded: 0,
            total_bytes: None,
            last_modified: Utc::now(),
        }
    }
}

/// Result set of a service query.
///
/// Holds whatever the service needs released once the caller is done; the
/// release hook runs exactly once when the cursor is dropped, on every exit
/// path.
pub struct RecordCursor {
    records: std::vec::IntoIter<DownloadRecord>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl RecordCursor {
    /// Cursor over `records` with nothing to release.
    pub fn new(records: Vec<DownloadRecord>) -> Self {
        Self {
            records: records.into_iter(),
            on_close: None,
        }
    }

    /// Cursor that runs `on_close` when dropped.
    pub fn with_release<F>(records: Vec<DownloadRecord>, on_close: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            records: records.into_iter(),
            on_close: Some(Box::new(on_close)),
        }
    }

    /// Move to the first row and take it, releasing the cursor.
    pub fn first(mut self) -> Option<DownloadRecord> {
        self.records.next()
    }
}

impl Iterator for RecordCursor {
    type Item = DownloadRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()
    }
}

impl Drop for RecordCursor {
    fn drop(&mut self) {
        if let Some(close) = self.on_close.take() {
            close();
        }
    }
}

impl std::fmt::Debug for RecordCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCursor")
            .field("remaining", &self.records.len())
            .finish()
    }
}

/// The platform download service.
///
/// All calls are short and synchronous; the transfer itself runs elsewhere.
pub trait DownloadService: Send + Sync {
    /// Enqueue a download and return its handle.
    fn enqueue(&self, request: DownloadRequest) -> UpdateResult<DownloadHandle>;

    /// Query the records matching `handle`.
    fn query(&self, handle: DownloadHandle) -> UpdateResult<RecordCursor>;

    /// The service's own idea of where a finished download lives.
    fn uri_for_downloaded_file(&self, handle: DownloadHandle) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_status_codes() {
        for status in [
            DownloadStatus::Pending,
            DownloadStatus::Running,
            DownloadStatus::Paused,
            DownloadStatus::Successful,
            DownloadStatus::Failed,
            DownloadStatus::Unknown,
        ] {
            assert_eq!(DownloadStatus::from_code(status.code()), status);
        }
        assert_eq!(DownloadStatus::from_code(3), DownloadStatus::Unknown);
        assert_eq!(DownloadStatus::Unknown.code(), -1);
    }

    #[test]
    fn test_status_classification() {
        assert!(DownloadStatus::Paused.is_in_progress());
        assert!(!DownloadStatus::Unknown.is_in_progress());
        assert!(!DownloadStatus::Unknown.is_terminal());
        assert!(DownloadStatus::Failed.is_terminal());
    }

    #[test]
    fn test_cursor_releases_once_on_drop() {
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed);
        let cursor = RecordCursor::with_release(
            vec![
                DownloadRecord::pending(DownloadHandle(1)),
                DownloadRecord::pending(DownloadHandle(2)),
            ],
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        let first = cursor.first().unwrap();
        assert_eq!(first.handle, DownloadHandle(1));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_request_defaults_to_package_mime() {
        let url = url::Url::parse("https://example.com/app.apk").unwrap();
        let request = DownloadRequest::new(url, PathBuf::from("/tmp/app.apk")).with_title("Update");
        assert_eq!(request.mime_type, PACKAGE_ARCHIVE_MIME);
        assert_eq!(request.title.as_deref(), Some("Update"));
    }
}
