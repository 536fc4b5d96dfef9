//! The COG facade: open a source, walk the IFD chain, serve raw tiles.

use std::sync::Arc;

use crate::error::{CogError, CogResult};
use crate::ifd::Ifd;
use crate::image::Image;
use crate::source::{ByteOrder, ChunkedSource};
use crate::tile::RawTile;

/// Version word of a classic TIFF. BigTIFF (43) is rejected.
const TIFF_VERSION: u16 = 42;

/// A Cloud-Optimized GeoTIFF bound to a chunked byte source.
///
/// Opening parses the header and the whole IFD chain; after that the image
/// list is fixed and only tile fetches grow the chunk table. Images are
/// indexed in chain order: 0 is the full-resolution base image, higher
/// indices are overviews of decreasing resolution. Consumers thinking in
/// map-zoom terms must pre-invert: `ifd_index = num_images - 1 - zoom`.
#[derive(Debug)]
pub struct Cog {
    source: Arc<ChunkedSource>,
    images: Vec<Image>,
}

impl Cog {
    /// Open a COG: verify the header, capture byte order and version, and
    /// parse every IFD in the chain.
    pub async fn open(source: Arc<ChunkedSource>) -> CogResult<Self> {
        if source.len() < 8 {
            return Err(CogError::BadMagic);
        }
        let header = source.get_bytes(0, 8).await?;
        match (header[0], header[1]) {
            (0x49, 0x49) => source.set_byte_order(ByteOrder::LittleEndian),
            // Valid TIFF magic, but out of profile for now. One branch to
            // flip when big-endian support lands.
            (0x4D, 0x4D) => return Err(CogError::UnsupportedByteOrder),
            _ => return Err(CogError::BadMagic),
        }

        let version = source.u16(2).await?;
        if version != TIFF_VERSION {
            return Err(CogError::UnsupportedVersion(version));
        }
        source.set_version(version);

        let first_ifd_offset = u64::from(source.u32(4).await?);
        let ifds = Ifd::read_chain(&source, first_ifd_offset).await?;
        let images = ifds
            .into_iter()
            .map(|ifd| Image::new(source.clone(), ifd))
            .collect();

        Ok(Self { source, images })
    }

    /// All resolution levels, base image first.
    pub fn images(&self) -> &[Image] {
        &self.images
    }

    /// The image at overview index `z`.
    pub fn image(&self, z: usize) -> CogResult<&Image> {
        self.images.get(z).ok_or(CogError::NoSuchOverview(z))
    }

    /// Fetch the compressed payload of tile `(x, y)` at overview index `z`.
    pub async fn get_tile_raw(&self, x: u32, y: u32, z: usize) -> CogResult<RawTile> {
        self.image(z)?.fetch_tile_raw(x, y).await
    }

    /// Fetch several tiles of one overview, resolving every tile extent
    /// before the first payload fetch.
    pub async fn get_tiles_raw(
        &self,
        coords: &[(u32, u32)],
        z: usize,
    ) -> CogResult<Vec<RawTile>> {
        let image = self.image(z)?;
        if !image.is_tiled() {
            return Err(CogError::NotTiled);
        }

        let mut locations = Vec::with_capacity(coords.len());
        for &(x, y) in coords {
            locations.push((x, y, image.tile_location(x, y).await?));
        }

        let media_type = image.compression();
        let mut tiles = Vec::with_capacity(locations.len());
        for (x, y, (offset, length)) in locations {
            let bytes = self.source.get_bytes(offset, length).await?;
            tiles.push(RawTile::new(x, y, media_type, bytes));
        }
        Ok(tiles)
    }

    /// The EPSG code declared by the base image, if any.
    pub async fn epsg(&self) -> CogResult<Option<u16>> {
        let Some(image) = self.images.first() else {
            return Ok(None);
        };
        Ok(image
            .geo_key_directory()
            .await?
            .and_then(|keys| keys.epsg_code()))
    }

    /// The underlying chunked source, for introspection.
    pub fn source(&self) -> &ChunkedSource {
        &self.source
    }
}
