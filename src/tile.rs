use bytes::Bytes;

/// A tile payload exactly as stored in the file.
///
/// No decompression and no payload framing checks happen here; the bytes
/// are handed over together with the media type declared by the image's
/// Compression tag so a consumer can pick a decoder.
#[derive(Debug, Clone)]
pub struct RawTile {
    x: u32,
    y: u32,
    media_type: Option<&'static str>,
    bytes: Bytes,
}

impl RawTile {
    pub(crate) fn new(x: u32, y: u32, media_type: Option<&'static str>, bytes: Bytes) -> Self {
        Self {
            x,
            y,
            media_type,
            bytes,
        }
    }

    /// The column index of this tile.
    pub fn x(&self) -> u32 {
        self.x
    }

    /// The row index of this tile.
    pub fn y(&self) -> u32 {
        self.y
    }

    /// Media type of the payload, `None` for unknown compression codes.
    pub fn media_type(&self) -> Option<&'static str> {
        self.media_type
    }

    /// The compressed payload.
    ///
    /// [`Bytes`] is reference-counted, so cloning is cheap if the payload
    /// needs to outlive the tile.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Consume the tile, keeping only the payload.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}
