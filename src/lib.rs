#![doc = include_str!("../README.md")]

mod cog;
mod error;
pub mod geo;
mod ifd;
mod image;
mod source;
pub mod store;
mod tags;
mod tile;
mod value;

pub use cog::Cog;
pub use error::{CogError, CogResult, TransportError};
pub use ifd::{Ifd, TagValue};
pub use image::{Image, TileGrid};
pub use source::{ByteOrder, ChunkState, ChunkedSource, DEFAULT_CHUNK_SIZE, MIN_CHUNK_SIZE};
pub use store::{FileStore, HttpStore, RangeStore};
pub use tags::{media_type, FieldType, Tag};
pub use tile::RawTile;
pub use value::Value;
