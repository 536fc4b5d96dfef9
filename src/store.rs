//! Backing stores that serve byte ranges.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;

use crate::error::{CogResult, TransportError};

/// The narrow capability a [`ChunkedSource`] needs from its backing store.
///
/// Implementations are handed to the source by injection, so anything that
/// can serve `(offset, length)` reads works: HTTP Range requests, a local
/// file, an object store, or an in-memory buffer in tests.
///
/// A store may return fewer bytes than requested only when the range runs
/// past the end of the resource; the source turns that into a
/// [`ShortRead`](crate::CogError::ShortRead).
///
/// [`ChunkedSource`]: crate::ChunkedSource
pub trait RangeStore: Debug + Send + Sync {
    /// Fetch `length` bytes starting at `offset`.
    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, CogResult<Bytes>>;

    /// Total size of the resource in bytes.
    fn len(&self) -> u64;

    /// Returns `true` if the resource is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable identity of the resource (URL or path).
    fn name(&self) -> &str;
}

impl RangeStore for Arc<dyn RangeStore> {
    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, CogResult<Bytes>> {
        self.as_ref().read_range(offset, length)
    }

    fn len(&self) -> u64 {
        self.as_ref().len()
    }

    fn name(&self) -> &str {
        self.as_ref().name()
    }
}

/// A backing store that reads from a URL using HTTP Range requests.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    url: reqwest::Url,
    name: String,
    length: u64,
}

impl HttpStore {
    /// Open a URL, discovering the total size via a `HEAD` request and
    /// falling back to the `Content-Range` total of a one-byte ranged `GET`
    /// for servers that omit `Content-Length` on `HEAD`.
    pub async fn open(client: reqwest::Client, url: reqwest::Url) -> CogResult<Self> {
        if let Ok(head) = client.head(url.clone()).send().await {
            if head.status().is_success() {
                if let Some(length) = header_u64(head.headers().get(CONTENT_LENGTH)) {
                    return Ok(Self::with_length(client, url, length));
                }
            }
        }

        let probe = client
            .get(url.clone())
            .header(RANGE, "bytes=0-0")
            .send()
            .await
            .map_err(TransportError::Http)?;
        if probe.status() != StatusCode::PARTIAL_CONTENT {
            return Err(TransportError::UnexpectedStatus(probe.status().as_u16()).into());
        }
        let total = probe
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| {
                TransportError::Other("server did not report a total size".to_string())
            })?;
        Ok(Self::with_length(client, url, total))
    }

    /// Construct a store for a resource whose total size is already known.
    pub fn with_length(client: reqwest::Client, url: reqwest::Url, length: u64) -> Self {
        let name = url.to_string();
        Self {
            client,
            url,
            name,
            length,
        }
    }
}

fn header_u64(value: Option<&reqwest::header::HeaderValue>) -> Option<u64> {
    value.and_then(|v| v.to_str().ok()).and_then(|v| v.parse().ok())
}

impl RangeStore for HttpStore {
    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, CogResult<Bytes>> {
        let client = self.client.clone();
        let url = self.url.clone();
        // HTTP ranges are inclusive on both ends
        let range = format!("bytes={}-{}", offset, offset + length - 1);
        async move {
            let response = client
                .get(url)
                .header(RANGE, range)
                .send()
                .await
                .map_err(TransportError::Http)?;
            if response.status() != StatusCode::PARTIAL_CONTENT {
                return Err(TransportError::UnexpectedStatus(response.status().as_u16()).into());
            }
            Ok(response.bytes().await.map_err(TransportError::Http)?)
        }
        .boxed()
    }

    fn len(&self) -> u64 {
        self.length
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A backing store that reads a local file.
///
/// The file handle is shared behind a mutex because seeking requires mutable
/// access; contention is expected to be low since the chunked source issues
/// at most one fetch per chunk.
#[derive(Debug)]
pub struct FileStore {
    file: tokio::sync::Mutex<tokio::fs::File>,
    name: String,
    length: u64,
}

impl FileStore {
    /// Open a file and capture its length.
    pub async fn open(path: impl AsRef<Path>) -> CogResult<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await.map_err(TransportError::Io)?;
        let length = file.metadata().await.map_err(TransportError::Io)?.len();
        Ok(Self {
            file: tokio::sync::Mutex::new(file),
            name: path.display().to_string(),
            length,
        })
    }
}

impl RangeStore for FileStore {
    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, CogResult<Bytes>> {
        async move {
            use std::io::SeekFrom;
            use tokio::io::{AsyncReadExt, AsyncSeekExt};

            let mut file = self.file.lock().await;
            file.seek(SeekFrom::Start(offset))
                .await
                .map_err(TransportError::Io)?;

            let mut buf = vec![0u8; length as usize];
            let mut filled = 0;
            while filled < buf.len() {
                let n = file
                    .read(&mut buf[filled..])
                    .await
                    .map_err(TransportError::Io)?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            buf.truncate(filled);
            Ok(Bytes::from(buf))
        }
        .boxed()
    }

    fn len(&self) -> u64 {
        self.length
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A backing store over any [`ObjectStore`] implementation.
///
/// [`ObjectStore`]: object_store::ObjectStore
#[cfg(feature = "object_store")]
#[derive(Debug, Clone)]
pub struct ObjectStoreStore {
    store: Arc<dyn object_store::ObjectStore>,
    path: object_store::path::Path,
    name: String,
    length: u64,
}

#[cfg(feature = "object_store")]
impl ObjectStoreStore {
    /// Open an object, discovering its size with a `head` call.
    pub async fn open(
        store: Arc<dyn object_store::ObjectStore>,
        path: object_store::path::Path,
    ) -> CogResult<Self> {
        let meta = store.head(&path).await.map_err(TransportError::ObjectStore)?;
        let name = path.to_string();
        Ok(Self {
            store,
            path,
            name,
            length: meta.size as u64,
        })
    }
}

#[cfg(feature = "object_store")]
impl RangeStore for ObjectStoreStore {
    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, CogResult<Bytes>> {
        let range = offset as _..(offset + length) as _;
        async move {
            Ok(self
                .store
                .get_range(&self.path, range)
                .await
                .map_err(TransportError::ObjectStore)?)
        }
        .boxed()
    }

    fn len(&self) -> u64 {
        self.length
    }

    fn name(&self) -> &str {
        &self.name
    }
}
