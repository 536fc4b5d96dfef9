//! The chunked byte source: maps arbitrary `(offset, length)` reads onto
//! fixed-size cacheable chunks served by a backing store.
//!
//! Chunks move through `Empty -> Fetching -> Ready` and never backward; a
//! chunk's bytes are stored exactly once, atomically with the transition to
//! `Ready`. Concurrent readers of the same chunk share one backing fetch.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use bytes::{Bytes, BytesMut};
use tokio::sync::Notify;
use tracing::trace;

use crate::error::{CogError, CogResult};
use crate::store::RangeStore;
use crate::tags::FieldType;
use crate::value::Value;

/// Default chunk size: 64 KiB. Large enough to swallow a typical COG header
/// in one fetch, small enough to not waste bandwidth on a single tile probe.
pub const DEFAULT_CHUNK_SIZE: u64 = 64 * 1024;

/// Smallest permitted chunk size; guarantees the TIFF header fits in chunk 0.
pub const MIN_CHUNK_SIZE: u64 = 8;

/// Byte order of the underlying TIFF stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

/// Observable state of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Not requested yet.
    Empty,
    /// A fetch is outstanding.
    Fetching,
    /// Resident in the chunk table.
    Ready,
}

/// A byte source that serves typed reads out of fixed-size cached chunks.
///
/// Every read is translated to the covering chunk range; missing chunks are
/// fetched from the injected [`RangeStore`], ready chunks are sliced
/// zero-copy, and reads straddling a chunk boundary are stitched. The chunk
/// table only grows; tile-sized working sets stay small because a COG's
/// header and tile extents cluster in few chunks.
#[derive(Debug)]
pub struct ChunkedSource {
    store: Arc<dyn RangeStore>,
    chunk_size: u64,
    /// Ready chunks, keyed by dense chunk id.
    chunks: RwLock<BTreeMap<u64, Bytes>>,
    /// Outstanding fetches; one completion primitive per chunk.
    in_flight: Mutex<HashMap<u64, Arc<Notify>>>,
    byte_order: OnceLock<ByteOrder>,
    version: OnceLock<u16>,
}

impl ChunkedSource {
    /// Wrap a backing store with the default chunk size.
    pub fn new(store: Arc<dyn RangeStore>) -> Self {
        Self::with_chunk_size(store, DEFAULT_CHUNK_SIZE)
    }

    /// Wrap a backing store with a custom chunk size.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is smaller than [`MIN_CHUNK_SIZE`] or not a
    /// multiple of 4 (alignment keeps 16/32-bit primitives from straddling
    /// chunk boundaries).
    pub fn with_chunk_size(store: Arc<dyn RangeStore>, chunk_size: u64) -> Self {
        assert!(
            chunk_size >= MIN_CHUNK_SIZE && chunk_size % 4 == 0,
            "chunk size must be >= {MIN_CHUNK_SIZE} and a multiple of 4"
        );
        Self {
            store,
            chunk_size,
            chunks: RwLock::new(BTreeMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            byte_order: OnceLock::new(),
            version: OnceLock::new(),
        }
    }

    /// Total length of the backing resource in bytes.
    pub fn len(&self) -> u64 {
        self.store.len()
    }

    /// Returns `true` if the backing resource is empty.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Identity of the backing resource (URL or path).
    pub fn name(&self) -> &str {
        self.store.name()
    }

    /// The configured chunk size in bytes.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Byte order detected at header parse. Little-endian until then.
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
            .get()
            .copied()
            .unwrap_or(ByteOrder::LittleEndian)
    }

    /// TIFF version word captured at header parse.
    pub fn version(&self) -> Option<u16> {
        self.version.get().copied()
    }

    pub(crate) fn set_byte_order(&self, byte_order: ByteOrder) {
        let _ = self.byte_order.set(byte_order);
    }

    pub(crate) fn set_version(&self, version: u16) {
        let _ = self.version.set(version);
    }

    /// Observable state of the chunk with the given id.
    pub fn chunk_state(&self, id: u64) -> ChunkState {
        if self
            .chunks
            .read()
            .expect("chunk table poisoned")
            .contains_key(&id)
        {
            ChunkState::Ready
        } else if self
            .in_flight
            .lock()
            .expect("in-flight table poisoned")
            .contains_key(&id)
        {
            ChunkState::Fetching
        } else {
            ChunkState::Empty
        }
    }

    /// Ids of the chunks currently resident, in ascending order.
    pub fn resident_chunks(&self) -> Vec<u64> {
        self.chunks
            .read()
            .expect("chunk table poisoned")
            .keys()
            .copied()
            .collect()
    }

    /// Returns `true` iff every chunk covering `[offset, offset + length)`
    /// is already resident. Never triggers a fetch.
    pub fn has_bytes(&self, offset: u64, length: u64) -> bool {
        if length == 0 {
            return offset <= self.len();
        }
        match offset.checked_add(length) {
            Some(end) if end <= self.len() => {}
            _ => return false,
        }
        let first = offset / self.chunk_size;
        let last = (offset + length - 1) / self.chunk_size;
        let table = self.chunks.read().expect("chunk table poisoned");
        (first..=last).all(|id| table.contains_key(&id))
    }

    /// Read `length` bytes at `offset`, fetching any missing chunks.
    pub async fn get_bytes(&self, offset: u64, length: u64) -> CogResult<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        match offset.checked_add(length) {
            Some(end) if end <= self.len() => {}
            _ => return Err(CogError::OffsetOutOfRange(offset)),
        }

        let first = offset / self.chunk_size;
        let last = (offset + length - 1) / self.chunk_size;

        if first == last {
            let chunk = self.chunk(first).await?;
            let lo = (offset - first * self.chunk_size) as usize;
            return Ok(chunk.slice(lo..lo + length as usize));
        }

        // Stitch the trailing bytes of each chunk onto the next.
        let mut out = BytesMut::with_capacity(length as usize);
        let mut cursor = offset;
        let mut remaining = length as usize;
        for id in first..=last {
            let chunk = self.chunk(id).await?;
            let lo = (cursor - id * self.chunk_size) as usize;
            let take = remaining.min(chunk.len() - lo);
            out.extend_from_slice(&chunk[lo..lo + take]);
            cursor += take as u64;
            remaining -= take;
        }
        Ok(out.freeze())
    }

    /// Read a `u16` at `offset` honoring the detected byte order.
    pub async fn u16(&self, offset: u64) -> CogResult<u16> {
        let buf = self.get_bytes(offset, 2).await?;
        Ok(match self.byte_order() {
            ByteOrder::LittleEndian => LittleEndian::read_u16(&buf),
            ByteOrder::BigEndian => BigEndian::read_u16(&buf),
        })
    }

    /// Read a `u32` at `offset` honoring the detected byte order.
    pub async fn u32(&self, offset: u64) -> CogResult<u32> {
        let buf = self.get_bytes(offset, 4).await?;
        Ok(match self.byte_order() {
            ByteOrder::LittleEndian => LittleEndian::read_u32(&buf),
            ByteOrder::BigEndian => BigEndian::read_u32(&buf),
        })
    }

    /// Read `count` elements of `field_type` at `offset` as a [`Value`].
    pub async fn read_type(
        &self,
        offset: u64,
        field_type: FieldType,
        count: u64,
    ) -> CogResult<Value> {
        let length = count
            .checked_mul(field_type.size())
            .ok_or(CogError::OffsetOutOfRange(offset))?;
        let buf = self.get_bytes(offset, length).await?;
        Ok(Value::decode(&buf, self.byte_order(), field_type, count))
    }

    /// Warm the chunks covering `[offset, offset + length)`.
    pub async fn prefetch(&self, offset: u64, length: u64) -> CogResult<()> {
        if length == 0 {
            return Ok(());
        }
        match offset.checked_add(length) {
            Some(end) if end <= self.len() => {}
            _ => return Err(CogError::OffsetOutOfRange(offset)),
        }
        let first = offset / self.chunk_size;
        let last = (offset + length - 1) / self.chunk_size;
        for id in first..=last {
            self.chunk(id).await?;
        }
        Ok(())
    }

    /// The bytes of chunk `id`, fetching it if necessary.
    ///
    /// Concurrent callers for the same id share a single backing fetch; the
    /// backing store sees at most one outstanding request per chunk. A
    /// caller cancelled mid-fetch leaves the chunk `Empty` and wakes any
    /// co-waiters so one of them can retry.
    pub async fn chunk(&self, id: u64) -> CogResult<Bytes> {
        loop {
            if let Some(bytes) = self
                .chunks
                .read()
                .expect("chunk table poisoned")
                .get(&id)
            {
                return Ok(bytes.clone());
            }

            let role = {
                let mut in_flight = self.in_flight.lock().expect("in-flight table poisoned");
                match in_flight.get(&id) {
                    Some(notify) => Role::Waiter(notify.clone()),
                    None => {
                        let notify = Arc::new(Notify::new());
                        in_flight.insert(id, notify.clone());
                        Role::Leader(notify)
                    }
                }
            };

            match role {
                Role::Waiter(notify) => {
                    let notified = notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();
                    // The leader may have finished between the lookup above
                    // and registering interest; only wait while its entry is
                    // still outstanding.
                    let still_fetching = self
                        .in_flight
                        .lock()
                        .expect("in-flight table poisoned")
                        .contains_key(&id);
                    if still_fetching {
                        notified.await;
                    }
                }
                Role::Leader(notify) => {
                    let _guard = FlightGuard {
                        source: self,
                        id,
                        notify,
                    };
                    let bytes = self.fetch_chunk(id).await?;
                    self.chunks
                        .write()
                        .expect("chunk table poisoned")
                        .insert(id, bytes.clone());
                    return Ok(bytes);
                }
            }
        }
    }

    /// One backing-store round trip for chunk `id`.
    async fn fetch_chunk(&self, id: u64) -> CogResult<Bytes> {
        let offset = id.saturating_mul(self.chunk_size);
        let total = self.len();
        if offset >= total {
            return Err(CogError::OffsetOutOfRange(offset));
        }
        // The final chunk may be shorter than chunk_size.
        let want = self.chunk_size.min(total - offset);
        trace!(chunk = id, offset, len = want, "fetching chunk");
        let bytes = self.store.read_range(offset, want).await?;
        if bytes.len() as u64 != want {
            return Err(CogError::ShortRead {
                offset,
                want,
                got: bytes.len() as u64,
            });
        }
        Ok(bytes)
    }
}

enum Role {
    Leader(Arc<Notify>),
    Waiter(Arc<Notify>),
}

/// Removes the in-flight entry and wakes waiters when the leader finishes
/// or is cancelled. Runs after a successful leader has already published its
/// chunk, so waiters either find the chunk `Ready` or retry from `Empty`.
struct FlightGuard<'a> {
    source: &'a ChunkedSource,
    id: u64,
    notify: Arc<Notify>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.source
            .in_flight
            .lock()
            .expect("in-flight table poisoned")
            .remove(&self.id);
        self.notify.notify_waiters();
    }
}
