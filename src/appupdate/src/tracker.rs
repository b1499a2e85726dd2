//! Download status and local reference lookups.

use std::path::PathBuf;
use std::sync::Arc;

use crate::service::{DownloadHandle, DownloadRecord, DownloadService, DownloadStatus};

/// Reads the current state of a download from the service.
///
/// Nothing is cached: every call re-queries, since the service updates its
/// records on its own schedule. Failed or empty queries map to sentinels.
#[derive(Clone)]
pub struct DownloadStateTracker {
    service: Arc<dyn DownloadService>,
}

impl DownloadStateTracker {
    pub fn new(service: Arc<dyn DownloadService>) -> Self {
        Self { service }
    }

    /// Current status, or [`DownloadStatus::Unknown`] when no record is readable.
    pub fn status(&self, handle: DownloadHandle) -> DownloadStatus {
        self.first_record(handle)
            .map(|record| record.status)
            .unwrap_or(DownloadStatus::Unknown)
    }

    /// Raw local URI column of the record, unresolved.
    pub fn local_reference(&self, handle: DownloadHandle) -> Option<String> {
        self.first_record(handle).and_then(|record| record.local_uri)
    }

    /// Filesystem path of a successfully finished download.
    ///
    /// Records in any other state yield `None`, as do local references that
    /// are neither a `file:` URI nor a plain path.
    pub fn downloaded_file(&self, handle: DownloadHandle) -> Option<PathBuf> {
        let record = self.first_record(handle)?;
        if record.status != DownloadStatus::Successful {
            return None;
        }

        let raw = record.local_uri.filter(|uri| !uri.is_empty())?;
        match url::Url::parse(&raw) {
            Ok(uri) if uri.scheme() == "file" => uri.to_file_path().ok(),
            Ok(_) => None,
            Err(_) => Some(PathBuf::from(raw)),
        }
    }

    /// First record for `handle`; the cursor is released before returning.
    fn first_record(&self, handle: DownloadHandle) -> Option<DownloadRecord> {
        match self.service.query(handle) {
            Ok(cursor) => {
                let record = cursor.first();
                if record.is_none() {
                    tracing::debug!("No download record for handle {}", handle);
                }
                record
            }
            Err(e) => {
                tracing::warn!("Download query for handle {} failed: {}", handle, e);
                None
            }
        }
    }
}

impl std::fmt::Debug for DownloadStateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadStateTracker").finish_non_exhaustive()
    }
}
