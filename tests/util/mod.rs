//! Shared helpers: an in-memory counting store and little-endian TIFF
//! byte-layout builders.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chunktiff::store::RangeStore;
use chunktiff::CogResult;
use futures::future::BoxFuture;
use futures::FutureExt;

/// An in-memory backing store that counts range fetches, so tests can
/// assert how many round trips an operation costs.
#[derive(Debug)]
pub struct MemoryStore {
    data: Bytes,
    fetches: AtomicUsize,
}

impl MemoryStore {
    pub fn new(data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            data: Bytes::from(data),
            fetches: AtomicUsize::new(0),
        })
    }

    /// Number of `read_range` calls seen so far.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl RangeStore for MemoryStore {
    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, CogResult<Bytes>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let end = (offset + length).min(self.data.len() as u64);
        let slice = self.data.slice(offset as usize..end as usize);
        async move { Ok(slice) }.boxed()
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// Field type codes as they appear on disk.
pub const TYPE_ASCII: u16 = 2;
pub const TYPE_SHORT: u16 = 3;
pub const TYPE_LONG: u16 = 4;
pub const TYPE_DOUBLE: u16 = 12;

/// A little-endian classic TIFF header pointing at `first_ifd`.
pub fn header(first_ifd: u32) -> Vec<u8> {
    let mut buf = vec![0x49, 0x49, 0x2A, 0x00];
    buf.extend_from_slice(&first_ifd.to_le_bytes());
    buf
}

/// Append a 12-byte IFD entry.
pub fn push_entry(buf: &mut Vec<u8>, code: u16, field_type: u16, count: u32, value: [u8; 4]) {
    buf.extend_from_slice(&code.to_le_bytes());
    buf.extend_from_slice(&field_type.to_le_bytes());
    buf.extend_from_slice(&count.to_le_bytes());
    buf.extend_from_slice(&value);
}

/// An inline SHORT value, left-justified in the 4 value bytes.
pub fn inline_short(v: u16) -> [u8; 4] {
    let b = v.to_le_bytes();
    [b[0], b[1], 0, 0]
}

/// An inline LONG value (also used as an out-of-line value offset).
pub fn inline_long(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}

/// Two inline SHORT values packed into the 4 value bytes.
pub fn inline_two_shorts(a: u16, b: u16) -> [u8; 4] {
    let a = a.to_le_bytes();
    let b = b.to_le_bytes();
    [a[0], a[1], b[0], b[1]]
}

/// Zero-fill the buffer up to `offset`.
pub fn pad_to(buf: &mut Vec<u8>, offset: usize) {
    assert!(buf.len() <= offset, "layout overlap at {offset}");
    buf.resize(offset, 0);
}

pub fn push_u16s(buf: &mut Vec<u8>, values: &[u16]) {
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

pub fn push_u32s(buf: &mut Vec<u8>, values: &[u32]) {
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

pub fn push_f64s(buf: &mut Vec<u8>, values: &[f64]) {
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}
