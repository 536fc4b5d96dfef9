//! Decoded tag values.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

use crate::source::ByteOrder;
use crate::tags::FieldType;

/// A decoded TIFF tag value.
///
/// A value with `count == 1` collapses to its scalar variant; multi-element
/// values become a [`Value::List`] of scalars. `Ascii` data becomes a string
/// cut at the first NUL. Rationals stay as numerator/denominator pairs; this
/// crate never divides them.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(u8),
    SignedByte(i8),
    Short(u16),
    SignedShort(i16),
    Unsigned(u32),
    Signed(i32),
    Float(f32),
    Double(f64),
    Rational(u32, u32),
    SRational(i32, i32),
    Ascii(String),
    List(Vec<Value>),
}

fn read_u16(order: ByteOrder, buf: &[u8]) -> u16 {
    match order {
        ByteOrder::LittleEndian => LittleEndian::read_u16(buf),
        ByteOrder::BigEndian => BigEndian::read_u16(buf),
    }
}

fn read_u32(order: ByteOrder, buf: &[u8]) -> u32 {
    match order {
        ByteOrder::LittleEndian => LittleEndian::read_u32(buf),
        ByteOrder::BigEndian => BigEndian::read_u32(buf),
    }
}

fn read_f32(order: ByteOrder, buf: &[u8]) -> f32 {
    match order {
        ByteOrder::LittleEndian => LittleEndian::read_f32(buf),
        ByteOrder::BigEndian => BigEndian::read_f32(buf),
    }
}

fn read_f64(order: ByteOrder, buf: &[u8]) -> f64 {
    match order {
        ByteOrder::LittleEndian => LittleEndian::read_f64(buf),
        ByteOrder::BigEndian => BigEndian::read_f64(buf),
    }
}

impl Value {
    /// Decode `count` elements of `field_type` from `buf`.
    ///
    /// `buf` must hold exactly `count * field_type.size()` bytes.
    pub(crate) fn decode(
        buf: &[u8],
        order: ByteOrder,
        field_type: FieldType,
        count: u64,
    ) -> Value {
        debug_assert_eq!(buf.len() as u64, count * field_type.size());

        if field_type == FieldType::Ascii {
            // Bytes up to the first NUL, terminator stripped.
            let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            return Value::Ascii(String::from_utf8_lossy(&buf[..end]).into_owned());
        }

        let size = field_type.size() as usize;
        let one = |element: &[u8]| -> Value {
            match field_type {
                FieldType::Byte | FieldType::Undefined => Value::Byte(element[0]),
                FieldType::SByte => Value::SignedByte(element[0] as i8),
                FieldType::Short => Value::Short(read_u16(order, element)),
                FieldType::SShort => Value::SignedShort(read_u16(order, element) as i16),
                FieldType::Long => Value::Unsigned(read_u32(order, element)),
                FieldType::SLong => Value::Signed(read_u32(order, element) as i32),
                FieldType::Float => Value::Float(read_f32(order, element)),
                FieldType::Double => Value::Double(read_f64(order, element)),
                FieldType::Rational => Value::Rational(
                    read_u32(order, &element[..4]),
                    read_u32(order, &element[4..]),
                ),
                FieldType::SRational => Value::SRational(
                    read_u32(order, &element[..4]) as i32,
                    read_u32(order, &element[4..]) as i32,
                ),
                FieldType::Ascii => unreachable!("handled above"),
            }
        };

        match count {
            1 => one(buf),
            _ => Value::List(
                (0..count as usize)
                    .map(|i| one(&buf[i * size..(i + 1) * size]))
                    .collect(),
            ),
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Value::Byte(v) => Some(u16::from(*v)),
            Value::Short(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Byte(v) => Some(u32::from(*v)),
            Value::Short(v) => Some(u32::from(*v)),
            Value::Unsigned(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_u32().map(u64::from)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Ascii(s) => Some(s),
            _ => None,
        }
    }

    /// Unsigned-integer elements as a vector. A scalar yields one element.
    pub fn to_u64_vec(&self) -> Option<Vec<u64>> {
        match self {
            Value::List(values) => values.iter().map(Value::as_u64).collect(),
            other => other.as_u64().map(|v| vec![v]),
        }
    }

    /// Short elements as a vector. A scalar yields one element.
    pub fn to_u16_vec(&self) -> Option<Vec<u16>> {
        match self {
            Value::List(values) => values.iter().map(Value::as_u16).collect(),
            other => other.as_u16().map(|v| vec![v]),
        }
    }

    /// Floating-point elements as a vector. A scalar yields one element.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Value::List(values) => values.iter().map(Value::as_f64).collect(),
            other => other.as_f64().map(|v| vec![v]),
        }
    }
}
