//! Static TIFF tag, field-type, and compression registries.

use num_enum::TryFromPrimitive;

/// Tag codes resolved by the IFD parser.
///
/// Codes outside this registry are skipped during parsing (with a debug log)
/// so that unknown vendor tags never abort a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u16)]
pub enum Tag {
    NewSubfileType = 254,
    ImageWidth = 256,
    ImageLength = 257,
    BitsPerSample = 258,
    Compression = 259,
    PhotometricInterpretation = 262,
    SamplesPerPixel = 277,
    Software = 305,
    DateTime = 306,
    Predictor = 317,
    TileWidth = 322,
    TileLength = 323,
    TileOffsets = 324,
    TileByteCounts = 325,
    SampleFormat = 339,
    JpegTables = 347,
    ModelPixelScale = 33550,
    ModelTiepoint = 33922,
    GeoKeyDirectory = 34735,
    GeoDoubleParams = 34736,
    GeoAsciiParams = 34737,
}

impl Tag {
    /// Look up a tag by its on-disk code.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::try_from(code).ok()
    }

    /// The on-disk code of this tag.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// The human-readable tag name.
    pub fn name(self) -> &'static str {
        match self {
            Tag::NewSubfileType => "NewSubfileType",
            Tag::ImageWidth => "ImageWidth",
            Tag::ImageLength => "ImageLength",
            Tag::BitsPerSample => "BitsPerSample",
            Tag::Compression => "Compression",
            Tag::PhotometricInterpretation => "PhotometricInterpretation",
            Tag::SamplesPerPixel => "SamplesPerPixel",
            Tag::Software => "Software",
            Tag::DateTime => "DateTime",
            Tag::Predictor => "Predictor",
            Tag::TileWidth => "TileWidth",
            Tag::TileLength => "TileLength",
            Tag::TileOffsets => "TileOffsets",
            Tag::TileByteCounts => "TileByteCounts",
            Tag::SampleFormat => "SampleFormat",
            Tag::JpegTables => "JpegTables",
            Tag::ModelPixelScale => "ModelPixelScale",
            Tag::ModelTiepoint => "ModelTiepoint",
            Tag::GeoKeyDirectory => "GeoKeyDirectory",
            Tag::GeoDoubleParams => "GeoDoubleParams",
            Tag::GeoAsciiParams => "GeoAsciiParams",
        }
    }
}

/// On-disk field types of tag values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u16)]
pub enum FieldType {
    Byte = 1,
    Ascii = 2,
    Short = 3,
    Long = 4,
    Rational = 5,
    SByte = 6,
    Undefined = 7,
    SShort = 8,
    SLong = 9,
    SRational = 10,
    Float = 11,
    Double = 12,
}

impl FieldType {
    /// Size in bytes of a single element of this type.
    pub const fn size(self) -> u64 {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Float => 4,
            FieldType::Rational | FieldType::SRational | FieldType::Double => 8,
        }
    }
}

/// Map a Compression tag value to the media type of the tile payload.
///
/// Unknown codes map to `None`; the payload is still served, the caller just
/// gets no content-type hint.
pub fn media_type(compression: u16) -> Option<&'static str> {
    match compression {
        1 => Some("none"),
        5 => Some("image/x-lzw"),
        // 6 is the deprecated old-style JPEG, 7 the modern one
        6 | 7 => Some("image/jpeg"),
        8 => Some("image/deflate"),
        34712 => Some("image/jp2"),
        50001 => Some("image/webp"),
        _ => None,
    }
}
