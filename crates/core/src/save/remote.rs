use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use reqwest::StatusCode;
use tracing::debug;

use super::identity::DeviceIdentity;
use crate::{
    error::StoreError,
    snapshot::{self, ProgressSnapshot},
};

/// Default read cap for remote progress objects (1 MiB).
pub const MAX_DOWNLOAD_BYTES: u64 = 1024 * 1024;

/// Remote blob store holding one progress object per device identity.
///
/// Enum dispatch keeps the async methods usable without boxing futures.
#[derive(Debug, Clone)]
pub enum RemoteSync {
    /// HTTP object store addressed as `<root>/<identity>`.
    Http(HttpBlobStore),
    /// In-process store; useful for tests and offline play-throughs.
    Memory(MemoryBlobStore),
}

impl RemoteSync {
    /// Replace the remote object for `identity` with `snapshot`.
    pub async fn upload(
        &self,
        snapshot: &ProgressSnapshot,
        identity: &DeviceIdentity,
    ) -> Result<(), StoreError> {
        match self {
            Self::Http(store) => store.upload(snapshot, identity).await,
            Self::Memory(store) => store.upload(snapshot, identity),
        }
    }

    /// Fetch and decode the object for `identity`, refusing anything larger
    /// than `max_bytes`.
    pub async fn download(
        &self,
        identity: &DeviceIdentity,
        max_bytes: u64,
    ) -> Result<ProgressSnapshot, StoreError> {
        match self {
            Self::Http(store) => store.download(identity, max_bytes).await,
            Self::Memory(store) => store.download(identity, max_bytes),
        }
    }

    /// Human-readable backend name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Memory(_) => "memory",
        }
    }
}

/// Remote store speaking plain `GET`/`PUT` against an object root URL.
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    root_url: String,
}

impl HttpBlobStore {
    /// Build a client whose requests give up after `timeout`.
    pub fn new(root_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            root_url: root_url.into(),
        })
    }

    /// URL of the object that belongs to `identity`.
    pub fn object_url(&self, identity: &DeviceIdentity) -> String {
        format!("{}/{}", self.root_url.trim_end_matches('/'), identity)
    }

    async fn upload(
        &self,
        snapshot: &ProgressSnapshot,
        identity: &DeviceIdentity,
    ) -> Result<(), StoreError> {
        let url = self.object_url(identity);
        let body = snapshot::encode(snapshot)?;
        let response = self
            .client
            .put(&url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(%url, gold = snapshot.gold, "Progress uploaded");
            return Ok(());
        }
        let detail = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_owned());
        match status {
            StatusCode::PAYLOAD_TOO_LARGE
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INSUFFICIENT_STORAGE => {
                Err(StoreError::QuotaExceeded(format!("{status}: {detail}")))
            }
            _ => Err(StoreError::Network(format!(
                "upload to {url} returned {status}: {detail}"
            ))),
        }
    }

    async fn download(
        &self,
        identity: &DeviceIdentity,
        max_bytes: u64,
    ) -> Result<ProgressSnapshot, StoreError> {
        let url = self.object_url(identity);
        let mut response = self.client.get(&url).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound);
        }
        if !status.is_success() {
            return Err(StoreError::Network(format!(
                "download from {url} returned {status}"
            )));
        }
        if let Some(size) = response.content_length() {
            if size > max_bytes {
                return Err(StoreError::TooLarge {
                    size,
                    limit: max_bytes,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let size = (body.len() + chunk.len()) as u64;
            if size > max_bytes {
                return Err(StoreError::TooLarge {
                    size,
                    limit: max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        debug!(%url, bytes = body.len(), "Progress downloaded");
        snapshot::decode(&body)
    }
}

/// Shared in-memory object map with a switch to simulate connectivity loss.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    objects: HashMap<String, Vec<u8>>,
    offline: bool,
    uploads: usize,
}

impl MemoryBlobStore {
    /// Empty, online store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a network error (or stop doing so).
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// Store raw bytes under `identity`, bypassing encoding.
    pub fn put_raw(&self, identity: &DeviceIdentity, bytes: Vec<u8>) {
        self.inner
            .lock()
            .objects
            .insert(identity.as_str().to_string(), bytes);
    }

    /// Decoded object for `identity`, if present and valid.
    pub fn get(&self, identity: &DeviceIdentity) -> Option<ProgressSnapshot> {
        let inner = self.inner.lock();
        inner
            .objects
            .get(identity.as_str())
            .and_then(|bytes| snapshot::decode(bytes).ok())
    }

    /// Number of successful uploads so far.
    pub fn upload_count(&self) -> usize {
        self.inner.lock().uploads
    }

    fn upload(
        &self,
        snapshot: &ProgressSnapshot,
        identity: &DeviceIdentity,
    ) -> Result<(), StoreError> {
        let bytes = snapshot::encode(snapshot)?;
        let mut inner = self.inner.lock();
        if inner.offline {
            return Err(StoreError::Network("store is offline".to_string()));
        }
        inner.objects.insert(identity.as_str().to_string(), bytes);
        inner.uploads += 1;
        Ok(())
    }

    fn download(
        &self,
        identity: &DeviceIdentity,
        max_bytes: u64,
    ) -> Result<ProgressSnapshot, StoreError> {
        let inner = self.inner.lock();
        if inner.offline {
            return Err(StoreError::Network("store is offline".to_string()));
        }
        let bytes = inner
            .objects
            .get(identity.as_str())
            .ok_or(StoreError::NotFound)?;
        if bytes.len() as u64 > max_bytes {
            return Err(StoreError::TooLarge {
                size: bytes.len() as u64,
                limit: max_bytes,
            });
        }
        snapshot::decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    /// Serve exactly one canned HTTP response and hand back the request head.
    async fn serve_once(
        status: &'static str,
        body: Vec<u8>,
    ) -> Result<(String, tokio::task::JoinHandle<String>)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return String::new();
            };
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let Ok(read) = socket.read(&mut buf).await else {
                    break;
                };
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
                if let Some(head_end) = find_head_end(&request) {
                    let head = String::from_utf8_lossy(&request[..head_end]).to_lowercase();
                    let expected = head
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|value| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + expected {
                        break;
                    }
                }
            }
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&request).to_string()
        });
        Ok((format!("http://{addr}/saves"), handle))
    }

    fn find_head_end(request: &[u8]) -> Option<usize> {
        request.windows(4).position(|window| window == b"\r\n\r\n")
    }

    fn store(root: String) -> RemoteSync {
        RemoteSync::Http(HttpBlobStore::new(root, Duration::from_secs(5)).unwrap())
    }

    #[tokio::test]
    async fn download_decodes_remote_object() -> Result<()> {
        let snapshot = ProgressSnapshot {
            gold: 321.0,
            resource_levels: vec![2, 1],
        };
        let (root, server) = serve_once("200 OK", snapshot::encode(&snapshot)?).await?;
        let identity = DeviceIdentity::new("device-a");

        let fetched = store(root).download(&identity, MAX_DOWNLOAD_BYTES).await?;
        assert_eq!(fetched, snapshot);
        let request = server.await?;
        assert!(request.starts_with("GET /saves/device-a "));
        Ok(())
    }

    #[tokio::test]
    async fn missing_object_is_not_found() -> Result<()> {
        let (root, _server) = serve_once("404 Not Found", Vec::new()).await?;
        let result = store(root)
            .download(&DeviceIdentity::new("nobody"), MAX_DOWNLOAD_BYTES)
            .await;
        assert!(matches!(result, Err(StoreError::NotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn oversized_object_is_rejected() -> Result<()> {
        let (root, _server) = serve_once("200 OK", vec![b' '; 2048]).await?;
        let result = store(root)
            .download(&DeviceIdentity::new("device-a"), 1024)
            .await;
        assert!(matches!(
            result,
            Err(StoreError::TooLarge { limit: 1024, .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn garbage_object_is_decode_error() -> Result<()> {
        let (root, _server) = serve_once("200 OK", b"<html>oops</html>".to_vec()).await?;
        let result = store(root)
            .download(&DeviceIdentity::new("device-a"), MAX_DOWNLOAD_BYTES)
            .await;
        assert!(matches!(result, Err(StoreError::Decode(_))));
        Ok(())
    }

    #[tokio::test]
    async fn upload_puts_encoded_snapshot() -> Result<()> {
        let (root, server) = serve_once("200 OK", Vec::new()).await?;
        let snapshot = ProgressSnapshot {
            gold: 12.5,
            resource_levels: vec![1],
        };
        store(root)
            .upload(&snapshot, &DeviceIdentity::new("device-b"))
            .await?;

        let request = server.await?;
        assert!(request.starts_with("PUT /saves/device-b "));
        let body_start = request.find("\r\n\r\n").map(|i| i + 4).unwrap_or(0);
        assert_eq!(snapshot::decode(request[body_start..].as_bytes())?, snapshot);
        Ok(())
    }

    #[tokio::test]
    async fn rejected_upload_maps_to_quota_exceeded() -> Result<()> {
        let (root, _server) = serve_once("507 Insufficient Storage", Vec::new()).await?;
        let result = store(root)
            .upload(&ProgressSnapshot::default(), &DeviceIdentity::new("device-c"))
            .await;
        assert!(matches!(result, Err(StoreError::QuotaExceeded(_))));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        drop(listener);
        let result = store(format!("http://{addr}"))
            .download(&DeviceIdentity::new("device-a"), MAX_DOWNLOAD_BYTES)
            .await;
        assert!(matches!(result, Err(StoreError::Network(_))));
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_honours_offline_switch() -> Result<()> {
        let memory = MemoryBlobStore::new();
        let remote = RemoteSync::Memory(memory.clone());
        let identity = DeviceIdentity::new("device-m");

        memory.set_offline(true);
        assert!(matches!(
            remote.upload(&ProgressSnapshot::default(), &identity).await,
            Err(StoreError::Network(_))
        ));
        memory.set_offline(false);
        remote.upload(&ProgressSnapshot::default(), &identity).await?;
        assert_eq!(memory.upload_count(), 1);
        assert_eq!(memory.get(&identity), Some(ProgressSnapshot::default()));
        Ok(())
    }
}
