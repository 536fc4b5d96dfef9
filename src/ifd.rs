//! Lazy parsing of the Image File Directory chain.
//!
//! Tag values larger than the 4 inline bytes live elsewhere in the file. If
//! the chunk covering such a value is already resident when the IFD is
//! parsed, the value is decoded eagerly; otherwise the entry is stored
//! *deferred* and resolved with a single chunk fetch on first use. This is
//! what lets a COG header parse out of one or two range reads even when tag
//! arrays point deep into the file.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::error::{CogError, CogResult};
use crate::source::ChunkedSource;
use crate::tags::{FieldType, Tag};
use crate::value::Value;

/// Size of one IFD entry on disk: code, type, count, value-or-offset.
const IFD_ENTRY_SIZE: u64 = 12;

/// Tag values up to this many bytes are stored inline in the entry itself.
const MAX_INLINE_VALUE: u64 = 4;

/// A parsed tag entry: either resolved, or deferred until its chunk is
/// fetched.
///
/// The only transitions are `Deferred -> Resolved` (via
/// [`Ifd::resolve`]); a resolved entry never reverts.
#[derive(Debug, Clone)]
pub enum TagValue {
    Resolved(Value),
    Deferred {
        offset: u64,
        field_type: FieldType,
        count: u64,
    },
}

/// One Image File Directory: a tag map plus its position in the chain.
#[derive(Debug)]
pub struct Ifd {
    /// Zero-based position in the IFD chain; 0 is the base image.
    pub(crate) index: usize,
    /// Byte offset of this IFD in the file.
    pub(crate) offset: u64,
    pub(crate) tags: HashMap<Tag, RwLock<TagValue>>,
}

impl Ifd {
    /// Walk the IFD chain starting at `first_offset`, parsing each IFD in
    /// order. A `next_ifd_offset` of 0 ends the chain, as does an IFD whose
    /// structure runs past the end of the source (some writers emit a
    /// truncated trailer instead of a terminating zero).
    pub(crate) async fn read_chain(
        source: &ChunkedSource,
        first_offset: u64,
    ) -> CogResult<Vec<Ifd>> {
        let mut ifds: Vec<Ifd> = Vec::new();
        let mut next = first_offset;
        while next != 0 {
            match Self::read(source, next, ifds.len()).await {
                Ok((ifd, next_offset)) => {
                    next = next_offset;
                    ifds.push(ifd);
                }
                Err(CogError::OffsetOutOfRange(offset)) => {
                    debug!(offset, "IFD chain truncated; stopping walk");
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(ifds)
    }

    /// Parse one IFD at `offset`, returning it with the offset of the next.
    async fn read(
        source: &ChunkedSource,
        offset: u64,
        index: usize,
    ) -> CogResult<(Ifd, u64)> {
        let tag_count = u64::from(source.u16(offset).await?);
        let mut tags = HashMap::with_capacity(tag_count as usize);
        for i in 0..tag_count {
            let entry_offset = offset + 2 + IFD_ENTRY_SIZE * i;
            if let Some((tag, value)) = read_entry(source, entry_offset).await? {
                // A duplicated tag code keeps its first occurrence.
                tags.entry(tag).or_insert_with(|| RwLock::new(value));
            }
        }
        let next = source.u32(offset + 2 + IFD_ENTRY_SIZE * tag_count).await?;
        Ok((
            Ifd {
                index,
                offset,
                tags,
            },
            u64::from(next),
        ))
    }

    /// Zero-based position of this IFD in the chain.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Byte offset of this IFD in the file.
    pub fn on_disk_offset(&self) -> u64 {
        self.offset
    }

    /// Number of tags kept from this IFD.
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Returns `true` if the IFD carries the given tag, resolved or not.
    pub fn contains(&self, tag: Tag) -> bool {
        self.tags.contains_key(&tag)
    }

    /// Returns `true` if the tag is present but its value has not been
    /// fetched yet.
    pub fn is_deferred(&self, tag: Tag) -> bool {
        self.tags.get(&tag).is_some_and(|slot| {
            matches!(*slot.read().expect("tag slot poisoned"), TagValue::Deferred { .. })
        })
    }

    /// The resolved value of a tag, or `None` if the tag is absent or still
    /// deferred. Use [`Ifd::resolve`] to force a deferred tag.
    pub fn value(&self, tag: Tag) -> Option<Value> {
        let slot = self.tags.get(&tag)?;
        match &*slot.read().expect("tag slot poisoned") {
            TagValue::Resolved(value) => Some(value.clone()),
            TagValue::Deferred { .. } => None,
        }
    }

    /// Human-readable names of the tags kept from this IFD, in no
    /// particular order.
    pub fn tag_names(&self) -> Vec<&'static str> {
        self.tags.keys().map(|tag| tag.name()).collect()
    }

    /// The value of a tag, fetching the chunk holding a deferred value if
    /// needed. The entry is replaced in place, so resolution happens at
    /// most once per tag.
    pub(crate) async fn resolve(
        &self,
        source: &ChunkedSource,
        tag: Tag,
    ) -> CogResult<Option<Value>> {
        let Some(slot) = self.tags.get(&tag) else {
            return Ok(None);
        };
        let (offset, field_type, count) = {
            match &*slot.read().expect("tag slot poisoned") {
                TagValue::Resolved(value) => return Ok(Some(value.clone())),
                TagValue::Deferred {
                    offset,
                    field_type,
                    count,
                } => (*offset, *field_type, *count),
            }
        };

        // The fetch happens outside the lock; a concurrent resolver of the
        // same tag decodes the same bytes, and whichever writes second finds
        // the entry already resolved.
        let value = source.read_type(offset, field_type, count).await?;
        let mut slot = slot.write().expect("tag slot poisoned");
        if matches!(*slot, TagValue::Deferred { .. }) {
            *slot = TagValue::Resolved(value.clone());
        }
        Ok(Some(value))
    }
}

/// Parse the 12-byte entry at `entry_offset`. Returns `None` for entries
/// that are skipped (unknown tag code or unknown field type).
async fn read_entry(
    source: &ChunkedSource,
    entry_offset: u64,
) -> CogResult<Option<(Tag, TagValue)>> {
    let code = source.u16(entry_offset).await?;
    let type_code = source.u16(entry_offset + 2).await?;
    let count = u64::from(source.u32(entry_offset + 4).await?);

    let Some(tag) = Tag::from_code(code) else {
        debug!(code, "skipping unknown tag");
        return Ok(None);
    };
    let Ok(field_type) = FieldType::try_from(type_code) else {
        debug!(code, type_code, "skipping tag with unknown field type");
        return Ok(None);
    };

    let value_length = count * field_type.size();
    if value_length <= MAX_INLINE_VALUE {
        let inline = source.get_bytes(entry_offset + 8, MAX_INLINE_VALUE).await?;
        let value = Value::decode(
            &inline[..value_length as usize],
            source.byte_order(),
            field_type,
            count,
        );
        return Ok(Some((tag, TagValue::Resolved(value))));
    }

    let value_offset = u64::from(source.u32(entry_offset + 8).await?);
    if source.has_bytes(value_offset, value_length) {
        let value = source.read_type(value_offset, field_type, count).await?;
        Ok(Some((tag, TagValue::Resolved(value))))
    } else {
        Ok(Some((
            tag,
            TagValue::Deferred {
                offset: value_offset,
                field_type,
                count,
            },
        )))
    }
}
