//! GeoTIFF support: the geo key directory and the pixel/model affine.

use num_enum::TryFromPrimitive;
use tracing::debug;

use crate::error::{CogError, CogResult};
use crate::tags::Tag;

/// Geo keys resolved out of the GeoKeyDirectory tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u16)]
pub(crate) enum GeoKey {
    ModelType = 1024,
    RasterType = 1025,
    Citation = 1026,
    GeographicType = 2048,
    GeogCitation = 2049,
    GeogAngularUnits = 2054,
    GeogSemiMajorAxis = 2057,
    ProjectedType = 3072,
    ProjCitation = 3073,
    ProjLinearUnits = 3076,
}

/// The parsed GeoKeyDirectory of an image.
///
/// Key entries mirror the tag-entry layout: `(key id, location, count,
/// value)`, where a location of 0 means the value is the short itself and
/// locations 34736/34737 index into GeoDoubleParams/GeoAsciiParams.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoKeyDirectory {
    pub model_type: Option<u16>,
    pub raster_type: Option<u16>,
    pub citation: Option<String>,
    pub geographic_type: Option<u16>,
    pub geog_citation: Option<String>,
    pub geog_angular_units: Option<u16>,
    pub geog_semi_major_axis: Option<f64>,
    pub projected_type: Option<u16>,
    pub proj_citation: Option<String>,
    pub proj_linear_units: Option<u16>,
}

impl GeoKeyDirectory {
    /// The EPSG code of the image's CRS: the projected CRS if one is
    /// declared, otherwise the geographic CRS.
    pub fn epsg_code(&self) -> Option<u16> {
        self.projected_type.or(self.geographic_type)
    }

    /// Parse the short array of the GeoKeyDirectory tag, resolving double
    /// and ASCII values out of their companion tags.
    pub(crate) fn parse(
        directory: &[u16],
        doubles: Option<&[f64]>,
        ascii: Option<&str>,
    ) -> CogResult<Self> {
        let header = directory
            .get(..4)
            .ok_or(CogError::MissingTag("GeoKeyDirectory"))?;
        if header[0] != 1 {
            return Err(CogError::MissingTag("GeoKeyDirectory"));
        }
        let key_count = header[3] as usize;

        let mut keys = Self::default();
        for entry in directory[4..].chunks_exact(4).take(key_count) {
            let (key_id, location, count, value) = (entry[0], entry[1], entry[2], entry[3]);
            let Ok(key) = GeoKey::try_from(key_id) else {
                debug!(key_id, "skipping unknown geo key");
                continue;
            };

            match key {
                GeoKey::ModelType => keys.model_type = short_value(location, value),
                GeoKey::RasterType => keys.raster_type = short_value(location, value),
                GeoKey::Citation => keys.citation = ascii_value(location, count, value, ascii),
                GeoKey::GeographicType => keys.geographic_type = short_value(location, value),
                GeoKey::GeogCitation => {
                    keys.geog_citation = ascii_value(location, count, value, ascii)
                }
                GeoKey::GeogAngularUnits => keys.geog_angular_units = short_value(location, value),
                GeoKey::GeogSemiMajorAxis => {
                    keys.geog_semi_major_axis = double_value(location, value, doubles)
                }
                GeoKey::ProjectedType => keys.projected_type = short_value(location, value),
                GeoKey::ProjCitation => {
                    keys.proj_citation = ascii_value(location, count, value, ascii)
                }
                GeoKey::ProjLinearUnits => keys.proj_linear_units = short_value(location, value),
            }
        }
        Ok(keys)
    }
}

fn short_value(location: u16, value: u16) -> Option<u16> {
    (location == 0).then_some(value)
}

fn double_value(location: u16, value: u16, doubles: Option<&[f64]>) -> Option<f64> {
    if location != Tag::GeoDoubleParams.code() {
        return None;
    }
    doubles?.get(value as usize).copied()
}

fn ascii_value(location: u16, count: u16, value: u16, ascii: Option<&str>) -> Option<String> {
    if location != Tag::GeoAsciiParams.code() {
        return None;
    }
    let start = value as usize;
    let text = ascii?.get(start..start + count as usize)?;
    // The stored slice conventionally ends with the `|` separator.
    Some(text.strip_suffix('|').unwrap_or(text).to_string())
}

/// The trivial pixel-to-model affine of a north-up image.
///
/// Built from ModelPixelScale and ModelTiepoint; rotation terms are always
/// zero in this profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform(f64, f64, f64, f64, f64, f64);

impl AffineTransform {
    pub(crate) fn new(a: f64, b: f64, xoff: f64, d: f64, e: f64, yoff: f64) -> Self {
        Self(a, b, xoff, d, e, yoff)
    }

    pub fn a(&self) -> f64 {
        self.0
    }

    pub fn b(&self) -> f64 {
        self.1
    }

    pub fn c(&self) -> f64 {
        self.2
    }

    pub fn d(&self) -> f64 {
        self.3
    }

    pub fn e(&self) -> f64 {
        self.4
    }

    pub fn f(&self) -> f64 {
        self.5
    }

    /// Map a pixel coordinate to model space.
    pub fn pixel_to_model(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.0 * col + self.1 * row + self.2,
            self.3 * col + self.4 * row + self.5,
        )
    }
}
