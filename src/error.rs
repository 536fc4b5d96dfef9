use thiserror::Error;

/// Enum with all errors in this crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CogError {
    /// The first two bytes are neither `II` nor `MM`.
    #[error("not a TIFF: bad magic bytes")]
    BadMagic,

    /// The version word is not 42. BigTIFF (43) lands here.
    #[error("unsupported TIFF version {0} (classic TIFF is 42)")]
    UnsupportedVersion(u16),

    /// Big-endian (`MM`) sources are rejected in the current profile.
    #[error("big-endian byte order is not supported")]
    UnsupportedByteOrder,

    /// A read was requested past the end of the source.
    #[error("offset {0} out of range for source")]
    OffsetOutOfRange(u64),

    /// The backing store returned fewer bytes than the chunk requires.
    #[error("short read at offset {offset}: wanted {want} bytes, got {got}")]
    ShortRead { offset: u64, want: u64, got: u64 },

    /// A backing store failure. Whether to retry is the caller's choice.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A required tag is absent or malformed.
    #[error("required tag {0} missing or malformed")]
    MissingTag(&'static str),

    /// No image at the requested overview index.
    #[error("no overview at index {0}")]
    NoSuchOverview(usize),

    /// The image has no TileWidth tag; strips are not served as tiles.
    #[error("image is not tiled")]
    NotTiled,

    /// Tile coordinates outside the tile grid.
    #[error("tile ({x}, {y}) out of range")]
    TileOutOfRange { x: u32, y: u32 },
}

/// Failures surfaced by a backing store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// A range request answered with something other than 206.
    #[error("range request returned HTTP {0}")]
    UnexpectedStatus(u16),

    #[cfg(feature = "object_store")]
    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for CogError {
    fn from(err: std::io::Error) -> Self {
        CogError::Transport(TransportError::Io(err))
    }
}

impl From<reqwest::Error> for CogError {
    fn from(err: reqwest::Error) -> Self {
        CogError::Transport(TransportError::Http(err))
    }
}

#[cfg(feature = "object_store")]
impl From<object_store::Error> for CogError {
    fn from(err: object_store::Error) -> Self {
        CogError::Transport(TransportError::ObjectStore(err))
    }
}

/// Crate-specific result type.
pub type CogResult<T> = std::result::Result<T, CogError>;
