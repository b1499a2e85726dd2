//! HTTP download service.
//!
//! Transfers run as tokio tasks; records live in an in-memory table that the
//! synchronous [`DownloadService`] calls read from.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;

use crate::error::{UpdateError, UpdateResult};
use crate::gate::{ComponentState, ComponentStateQuery};
use crate::service::{
    DownloadHandle, DownloadRecord, DownloadRequest, DownloadService, DownloadStatus, RecordCursor,
};

type RecordTable = Arc<Mutex<HashMap<DownloadHandle, DownloadRecord>>>;

/// Download service backed by reqwest.
pub struct HttpDownloadService {
    client: Client,
    runtime: Handle,
    provider_id: String,
    state: Mutex<ComponentState>,
    records: RecordTable,
    next_id: AtomicU64,
    open_cursors: Arc<AtomicUsize>,
}

impl HttpDownloadService {
    /// Create a service spawning transfers on `runtime`.
    pub fn new(provider_id: impl Into<String>, runtime: Handle) -> Self {
        Self::with_client(provider_id, runtime, Client::new())
    }

    pub fn with_client(provider_id: impl Into<String>, runtime: Handle, client: Client) -> Self {
        Self {
            client,
            runtime,
            provider_id: provider_id.into(),
            state: Mutex::new(ComponentState::Default),
            records: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            open_cursors: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Provider id this service answers state queries for.
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Change the enabled state of the service.
    pub fn set_state(&self, state: ComponentState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn state(&self) -> ComponentState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of query cursors not yet released.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }
}

fn lock(records: &RecordTable) -> MutexGuard<'_, HashMap<DownloadHandle, DownloadRecord>> {
    records.lock().unwrap_or_else(|e| e.into_inner())
}

fn update_record<F>(records: &RecordTable, handle: DownloadHandle, f: F)
where
    F: FnOnce(&mut DownloadRecord),
{
    if let Some(record) = lock(records).get_mut(&handle) {
        f(record);
        record.last_modified = Utc::now();
    }
}

impl DownloadService for HttpDownloadService {
    fn enqueue(&self, request: DownloadRequest) -> UpdateResult<DownloadHandle> {
        if self.state().is_disabled() {
            return Err(UpdateError::ServiceUnavailable {
                provider: self.provider_id.clone(),
            });
        }

        if !matches!(request.url.scheme(), "http" | "https") {
            return Err(UpdateError::EnqueueFailed {
                message: format!("Unsupported scheme '{}' in {}", request.url.scheme(), request.url),
            });
        }

        let handle = DownloadHandle(self.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.records).insert(handle, DownloadRecord::pending(handle));

        tracing::info!(
            "Enqueued download {} of {} to {}",
            handle,
            request.url,
            request.destination.display()
        );

        let client = self.client.clone();
        let records = Arc::clone(&self.records);
        self.runtime.spawn(async move {
            update_record(&records, handle, |r| r.status = DownloadStatus::Running);

            match transfer(&client, &request, &records, handle).await {
                Ok(()) => {
                    let local_uri = url::Url::from_file_path(&request.destination)
                        .map(String::from)
                        .unwrap_or_else(|_| request.destination.display().to_string());
                    update_record(&records, handle, |r| {
                        r.status = DownloadStatus::Successful;
                        r.local_uri = Some(local_uri);
                    });
                    tracing::info!("Download {} finished", handle);
                }
                Err(e) => {
                    tracing::warn!(
                        network = e.is_network_error(),
                        retriable = e.is_retriable(),
                        "Download {} failed: {}",
                        handle,
                        e
                    );
                    let _ = tokio::fs::remove_file(&request.destination).await;
                    update_record(&records, handle, |r| r.status = DownloadStatus::Failed);
                }
            }
        });

        Ok(handle)
    }

    fn query(&self, handle: DownloadHandle) -> UpdateResult<RecordCursor> {
        let rows: Vec<DownloadRecord> = lock(&self.records).get(&handle).cloned().into_iter().collect();

        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        let open = Arc::clone(&self.open_cursors);
        Ok(RecordCursor::with_release(rows, move || {
            open.fetch_sub(1, Ordering::SeqCst);
        }))
    }

    fn uri_for_downloaded_file(&self, handle: DownloadHandle) -> Option<String> {
        lock(&self.records)
            .get(&handle)
            .filter(|r| r.status == DownloadStatus::Successful)
            .and_then(|r| r.local_uri.clone())
    }
}

impl ComponentStateQuery for HttpDownloadService {
    fn provider_enabled_state(&self, provider_id: &str) -> UpdateResult<ComponentState> {
        if provider_id != self.provider_id {
            return Err(UpdateError::QueryFailed {
                message: format!("Unknown provider {}", provider_id),
            });
        }
        Ok(self.state())
    }
}

/// Stream `request.url` into `request.destination`, recording progress.
async fn transfer(
    client: &Client,
    request: &DownloadRequest,
    records: &RecordTable,
    handle: DownloadHandle,
) -> UpdateResult<()> {
    let response = client.get(request.url.clone()).send().await?;

    if !response.status().is_success() {
        return Err(UpdateError::DownloadFailed {
            message: format!("HTTP {}", response.status()),
        });
    }

    let total = response.content_length();
    update_record(records, handle, |r| r.total_bytes = total);

    prepare_destination(&request.destination).await?;
    let mut file = tokio::fs::File::create(&request.destination).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result?;

        file.write_all(&chunk).await?;

        downloaded += chunk.len() as u64;
        update_record(records, handle, |r| r.bytes_downloaded = downloaded);
    }

    file.flush().await?;

    Ok(())
}

async fn prepare_destination(dest: &Path) -> UpdateResult<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::try_exists(dest).await? {
        tokio::fs::remove_file(dest).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn wait_terminal(service: &HttpDownloadService, handle: DownloadHandle) -> DownloadRecord {
        for _ in 0..200 {
            if let Some(record) = service.query(handle).unwrap().first() {
                if record.status.is_terminal() {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("download {handle} never finished");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_download_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app.apk"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"package-bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("Downloads").join("app.apk");
        let service = HttpDownloadService::new("downloads", Handle::current());
        let url = url::Url::parse(&format!("{}/app.apk", server.uri())).unwrap();

        let handle = service.enqueue(DownloadRequest::new(url, dest.clone())).unwrap();
        let record = wait_terminal(&service, handle).await;

        assert_eq!(record.status, DownloadStatus::Successful);
        assert_eq!(record.bytes_downloaded, 13);
        assert_eq!(std::fs::read(&dest).unwrap(), b"package-bytes");
        assert_eq!(service.uri_for_downloaded_file(handle), record.local_uri);
        assert_eq!(service.open_cursors(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_download_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app.apk"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("app.apk");
        let service = HttpDownloadService::new("downloads", Handle::current());
        let url = url::Url::parse(&format!("{}/app.apk", server.uri())).unwrap();

        let handle = service.enqueue(DownloadRequest::new(url, dest.clone())).unwrap();
        let record = wait_terminal(&service, handle).await;

        assert_eq!(record.status, DownloadStatus::Failed);
        assert!(!dest.exists());
        assert_eq!(service.uri_for_downloaded_file(handle), None);
    }

    #[tokio::test]
    async fn test_handles_are_unique() {
        let dir = TempDir::new().unwrap();
        let service = HttpDownloadService::new("downloads", Handle::current());
        // Port 9 is discard; the transfers fail but the handles are issued.
        let url = url::Url::parse("http://127.0.0.1:9/app.apk").unwrap();

        let a = service
            .enqueue(DownloadRequest::new(url.clone(), dir.path().join("a.apk")))
            .unwrap();
        let b = service
            .enqueue(DownloadRequest::new(url, dir.path().join("b.apk")))
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_disabled_service_refuses() {
        let service = HttpDownloadService::new("downloads", Handle::current());
        service.set_state(ComponentState::DisabledByUser);

        let url = url::Url::parse("http://127.0.0.1:9/app.apk").unwrap();
        let result = service.enqueue(DownloadRequest::new(url, "/tmp/app.apk".into()));
        assert!(matches!(result, Err(UpdateError::ServiceUnavailable { .. })));
        assert_eq!(
            service.provider_enabled_state("downloads").unwrap(),
            ComponentState::DisabledByUser
        );
        assert!(service.provider_enabled_state("other").is_err());
    }

    #[tokio::test]
    async fn test_unsupported_scheme_is_rejected() {
        let service = HttpDownloadService::new("downloads", Handle::current());
        let url = url::Url::parse("ftp://example.com/app.apk").unwrap();

        let result = service.enqueue(DownloadRequest::new(url, "/tmp/app.apk".into()));
        assert!(matches!(result, Err(UpdateError::EnqueueFailed { .. })));
        assert!(service.query(DownloadHandle(1)).unwrap().first().is_none());
    }

    #[tokio::test]
    async fn test_transport_error_is_network() {
        let dir = TempDir::new().unwrap();
        let records: RecordTable = Arc::new(Mutex::new(HashMap::new()));
        let url = url::Url::parse("http://127.0.0.1:9/app.apk").unwrap();
        let request = DownloadRequest::new(url, dir.path().join("app.apk"));

        let err = transfer(&Client::new(), &request, &records, DownloadHandle(1))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::Network(_)));
        assert!(err.is_network_error());
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_query_unknown_handle() {
        let service = HttpDownloadService::new("downloads", Handle::current());
        assert!(service.query(DownloadHandle(99)).unwrap().first().is_none());
        assert_eq!(service.open_cursors(), 0);
    }
}
