//! Per-IFD image views: resolved tags plus derived geometry.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::error::{CogError, CogResult};
use crate::geo::{AffineTransform, GeoKeyDirectory};
use crate::ifd::Ifd;
use crate::source::ChunkedSource;
use crate::tags::{media_type, Tag};
use crate::tile::RawTile;
use crate::value::Value;

/// Dimensions of an image's tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    /// Number of tile columns: `ceil(ImageWidth / TileWidth)`.
    pub across: u32,
    /// Number of tile rows: `ceil(ImageLength / TileLength)`.
    pub down: u32,
}

impl TileGrid {
    /// Total number of tiles in the grid.
    pub fn count(&self) -> u64 {
        u64::from(self.across) * u64::from(self.down)
    }
}

/// One resolution level of a COG: an IFD bound to its owning source.
///
/// All geometry is derived from tags on demand. Accessors over tags that are
/// always inline (image and tile dimensions, compression) are synchronous;
/// accessors over out-of-line arrays (the model-space geometry) are async
/// because the backing chunk may not have been fetched yet.
#[derive(Debug)]
pub struct Image {
    source: Arc<ChunkedSource>,
    ifd: Ifd,
    tile_offsets: OnceCell<Arc<Vec<u64>>>,
    tile_byte_counts: OnceCell<Arc<Vec<u64>>>,
}

impl Image {
    pub(crate) fn new(source: Arc<ChunkedSource>, ifd: Ifd) -> Self {
        Self {
            source,
            ifd,
            tile_offsets: OnceCell::new(),
            tile_byte_counts: OnceCell::new(),
        }
    }

    /// The underlying IFD.
    pub fn ifd(&self) -> &Ifd {
        &self.ifd
    }

    /// Zero-based position in the IFD chain; 0 is the base image.
    pub fn index(&self) -> usize {
        self.ifd.index()
    }

    /// The resolved value of a tag; `None` if absent or still deferred.
    pub fn tag(&self, tag: Tag) -> Option<Value> {
        self.ifd.value(tag)
    }

    /// The value of a tag, fetching a deferred value's chunk if needed.
    pub async fn fetch_tag(&self, tag: Tag) -> CogResult<Option<Value>> {
        self.ifd.resolve(&self.source, tag).await
    }

    /// Human-readable names of this image's tags, in no particular order.
    pub fn tag_list(&self) -> Vec<&'static str> {
        self.ifd.tag_names()
    }

    fn tag_u32(&self, tag: Tag) -> Option<u32> {
        self.ifd.value(tag).and_then(|v| v.as_u32())
    }

    /// The number of columns in the image, i.e., the number of pixels per row.
    pub fn width(&self) -> Option<u32> {
        self.tag_u32(Tag::ImageWidth)
    }

    /// The number of rows of pixels in the image.
    pub fn height(&self) -> Option<u32> {
        self.tag_u32(Tag::ImageLength)
    }

    /// `(width, height)` in pixels; `None` unless both tags are present.
    pub fn size(&self) -> Option<(u32, u32)> {
        Some((self.width()?, self.height()?))
    }

    /// `(TileWidth, TileLength)` in pixels; `None` for strip-organized
    /// images.
    pub fn tile_size(&self) -> Option<(u32, u32)> {
        Some((
            self.tag_u32(Tag::TileWidth)?,
            self.tag_u32(Tag::TileLength)?,
        ))
    }

    /// Whether the image stores its pixels in tiles.
    pub fn is_tiled(&self) -> bool {
        self.ifd.contains(Tag::TileWidth)
    }

    /// The tile grid dimensions; `None` unless the image is tiled and sized.
    pub fn tile_grid(&self) -> Option<TileGrid> {
        let (width, height) = self.size()?;
        let (tile_width, tile_height) = self.tile_size()?;
        Some(TileGrid {
            across: width.div_ceil(tile_width),
            down: height.div_ceil(tile_height),
        })
    }

    /// Number of bits per component.
    pub fn bits_per_sample(&self) -> Option<Vec<u16>> {
        self.ifd.value(Tag::BitsPerSample).and_then(|v| v.to_u16_vec())
    }

    /// The number of components per pixel.
    pub fn samples_per_pixel(&self) -> Option<u16> {
        self.ifd.value(Tag::SamplesPerPixel).and_then(|v| v.as_u16())
    }

    /// The color space of the image data.
    pub fn photometric_interpretation(&self) -> Option<u16> {
        self.ifd
            .value(Tag::PhotometricInterpretation)
            .and_then(|v| v.as_u16())
    }

    /// The raw Compression tag value.
    pub fn compression_code(&self) -> Option<u16> {
        self.ifd.value(Tag::Compression).and_then(|v| v.as_u16())
    }

    /// Media type of the tile payloads, `None` for absent or unknown
    /// compression codes.
    pub fn compression(&self) -> Option<&'static str> {
        media_type(self.compression_code()?)
    }

    /// Model-space coordinates of pixel `(0, 0)`: `ModelTiepoint[3..6]`.
    pub async fn origin(&self) -> CogResult<[f64; 3]> {
        let tiepoint = self
            .fetch_tag(Tag::ModelTiepoint)
            .await?
            .and_then(|v| v.to_f64_vec())
            .ok_or(CogError::MissingTag("ModelTiepoint"))?;
        if tiepoint.len() != 6 {
            return Err(CogError::MissingTag("ModelTiepoint"));
        }
        Ok([tiepoint[3], tiepoint[4], tiepoint[5]])
    }

    /// Model units per pixel on each axis.
    ///
    /// The Y scale is negated: pixel rows grow southward while model Y grows
    /// northward.
    pub async fn resolution(&self) -> CogResult<[f64; 3]> {
        let scale = self
            .fetch_tag(Tag::ModelPixelScale)
            .await?
            .and_then(|v| v.to_f64_vec())
            .ok_or(CogError::MissingTag("ModelPixelScale"))?;
        if scale.len() < 3 {
            return Err(CogError::MissingTag("ModelPixelScale"));
        }
        Ok([scale[0], -scale[1], scale[2]])
    }

    /// `[min x, min y, max x, max y]` of the image in model space.
    pub async fn bbox(&self) -> CogResult<[f64; 4]> {
        let (width, height) = self.size().ok_or(CogError::MissingTag("ImageWidth"))?;
        let origin = self.origin().await?;
        let resolution = self.resolution().await?;
        let x2 = origin[0] + resolution[0] * f64::from(width);
        let y2 = origin[1] + resolution[1] * f64::from(height);
        Ok([
            origin[0].min(x2),
            origin[1].min(y2),
            origin[0].max(x2),
            origin[1].max(y2),
        ])
    }

    /// The pixel-to-model affine of this image.
    pub async fn transform(&self) -> CogResult<AffineTransform> {
        let origin = self.origin().await?;
        let resolution = self.resolution().await?;
        Ok(AffineTransform::new(
            resolution[0],
            0.0,
            origin[0],
            0.0,
            resolution[1],
            origin[1],
        ))
    }

    /// The parsed geo key directory, or `None` if the image carries no
    /// GeoKeyDirectory tag.
    pub async fn geo_key_directory(&self) -> CogResult<Option<GeoKeyDirectory>> {
        let Some(directory) = self.fetch_tag(Tag::GeoKeyDirectory).await? else {
            return Ok(None);
        };
        let directory = directory
            .to_u16_vec()
            .ok_or(CogError::MissingTag("GeoKeyDirectory"))?;
        let doubles = self
            .fetch_tag(Tag::GeoDoubleParams)
            .await?
            .and_then(|v| v.to_f64_vec());
        let ascii = self.fetch_tag(Tag::GeoAsciiParams).await?;
        let ascii = ascii.as_ref().and_then(|v| v.as_str());
        GeoKeyDirectory::parse(&directory, doubles.as_deref(), ascii).map(Some)
    }

    async fn tile_offsets(&self) -> CogResult<Arc<Vec<u64>>> {
        let offsets = self
            .tile_offsets
            .get_or_try_init(|| async {
                let values = self
                    .fetch_tag(Tag::TileOffsets)
                    .await?
                    .and_then(|v| v.to_u64_vec())
                    .ok_or(CogError::MissingTag("TileOffsets"))?;
                Ok::<_, CogError>(Arc::new(values))
            })
            .await?;
        Ok(offsets.clone())
    }

    async fn tile_byte_counts(&self) -> CogResult<Arc<Vec<u64>>> {
        let counts = self
            .tile_byte_counts
            .get_or_try_init(|| async {
                let values = self
                    .fetch_tag(Tag::TileByteCounts)
                    .await?
                    .and_then(|v| v.to_u64_vec())
                    .ok_or(CogError::MissingTag("TileByteCounts"))?;
                Ok::<_, CogError>(Arc::new(values))
            })
            .await?;
        Ok(counts.clone())
    }

    /// On-disk extent of tile `(x, y)`: `(offset, byte count)`.
    ///
    /// Tiles index row-major with the row stride being the number of tile
    /// *columns*; rows grow downward in pixel space.
    pub(crate) async fn tile_location(&self, x: u32, y: u32) -> CogResult<(u64, u64)> {
        let grid = self.tile_grid().ok_or(CogError::NotTiled)?;
        if x >= grid.across || y >= grid.down {
            return Err(CogError::TileOutOfRange { x, y });
        }
        let idx = (u64::from(y) * u64::from(grid.across) + u64::from(x)) as usize;

        // The two arrays have no ordering between them; resolve concurrently.
        let (offsets, counts) =
            futures::future::try_join(self.tile_offsets(), self.tile_byte_counts()).await?;
        let offset = *offsets.get(idx).ok_or(CogError::TileOutOfRange { x, y })?;
        let length = *counts.get(idx).ok_or(CogError::TileOutOfRange { x, y })?;
        Ok((offset, length))
    }

    /// Fetch the compressed payload of tile `(x, y)`.
    pub async fn fetch_tile_raw(&self, x: u32, y: u32) -> CogResult<RawTile> {
        if !self.is_tiled() {
            return Err(CogError::NotTiled);
        }
        let (offset, length) = self.tile_location(x, y).await?;
        let bytes = self.source.get_bytes(offset, length).await?;
        Ok(RawTile::new(x, y, self.compression(), bytes))
    }
}
