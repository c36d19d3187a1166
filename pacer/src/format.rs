//! Record layout descriptors.
//!
//! A descriptor is written as a compact layout string: an optional leading
//! byte-order marker followed by field codes, each optionally preceded by a
//! repeat count.
//!
//! ```text
//! <7d           seven little-endian f64                       56 bytes
//! <iidddddddd   two i32 then eight f64, little-endian         72 bytes
//! >2h q         two big-endian i16 then one i64               12 bytes
//! ```
//!
//! | Marker   | Byte order |
//! |----------|------------|
//! | `<`      | little     |
//! | `>`, `!` | big        |
//! | `=`, `@` | host       |
//!
//! | Code | Field | Width |
//! |------|-------|-------|
//! | `b`  | i8    | 1     |
//! | `h`  | i16   | 2     |
//! | `i`  | i32   | 4     |
//! | `q`  | i64   | 8     |
//! | `f`  | f32   | 4     |
//! | `d`  | f64   | 8     |
//!
//! Fields are packed densely in declaration order. `@` is accepted for
//! compatibility but never inserts alignment padding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::row::Value;

/// Upper bound on the number of fields a descriptor may declare.
pub const MAX_FIELDS: usize = 65_536;

/// Scalar type of a single record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `b`: signed 8-bit integer.
    I8,
    /// `h`: signed 16-bit integer.
    I16,
    /// `i`: signed 32-bit integer.
    I32,
    /// `q`: signed 64-bit integer.
    I64,
    /// `f`: 32-bit float.
    F32,
    /// `d`: 64-bit float.
    F64,
}

impl FieldType {
    /// Maps a layout code to its field type.
    #[must_use]
    pub const fn from_code(code: char) -> Option<Self> {
        match code {
            'b' => Some(Self::I8),
            'h' => Some(Self::I16),
            'i' => Some(Self::I32),
            'q' => Some(Self::I64),
            'f' => Some(Self::F32),
            'd' => Some(Self::F64),
            _ => None,
        }
    }

    /// Layout code of this field type.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::I8 => 'b',
            Self::I16 => 'h',
            Self::I32 => 'i',
            Self::I64 => 'q',
            Self::F32 => 'f',
            Self::F64 => 'd',
        }
    }

    /// Encoded width in bytes.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::I8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    /// Returns `true` for the signed integer types.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        !self.is_float()
    }

    /// Returns `true` for `f32` and `f64`.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Byte order used for multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    Little,
    Big,
    /// Host byte order.
    #[default]
    Native,
}

impl ByteOrder {
    /// Maps a leading marker character to a byte order.
    #[must_use]
    pub const fn from_marker(marker: char) -> Option<Self> {
        match marker {
            '<' => Some(Self::Little),
            '>' | '!' => Some(Self::Big),
            '=' | '@' => Some(Self::Native),
            _ => None,
        }
    }

    /// Canonical marker character.
    #[must_use]
    pub const fn marker(self) -> char {
        match self {
            Self::Little => '<',
            Self::Big => '>',
            Self::Native => '=',
        }
    }
}

/// Error parsing a layout string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("unknown field code {code:?} at position {position}")]
    UnknownCode { code: char, position: usize },
    #[error("byte order marker {marker:?} at position {position} must come first")]
    MisplacedByteOrder { marker: char, position: usize },
    #[error("repeat count at position {position} is not followed by a field code")]
    DanglingCount { position: usize },
    #[error("repeat count at position {position} exceeds {MAX_FIELDS} fields")]
    CountOverflow { position: usize },
    #[error("layout declares no fields")]
    Empty,
}

/// Error decoding a record with a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record is {found} bytes, layout expects {expected}")]
    Length { expected: usize, found: usize },
}

/// Parsed, validated record layout.
///
/// Invariant: at least one field, at most [`MAX_FIELDS`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FormatDescriptor {
    order: ByteOrder,
    fields: Vec<FieldType>,
    record_len: usize,
}

impl FormatDescriptor {
    /// Parses a layout string such as `<7d`.
    ///
    /// # Errors
    ///
    /// Returns a [`FormatError`] describing the first offending character.
    pub fn parse(layout: &str) -> Result<Self, FormatError> {
        let mut order = ByteOrder::default();
        let mut fields = Vec::new();
        let mut pending: Option<(usize, usize)> = None;

        for (position, ch) in layout.char_indices() {
            if let Some(marker) = ByteOrder::from_marker(ch) {
                if position != 0 {
                    return Err(FormatError::MisplacedByteOrder { marker: ch, position });
                }
                order = marker;
                continue;
            }

            if let Some(digit) = ch.to_digit(10) {
                let (start, count) = pending.unwrap_or((position, 0));
                let count = count
                    .checked_mul(10)
                    .and_then(|c| c.checked_add(digit as usize))
                    .filter(|c| *c <= MAX_FIELDS)
                    .ok_or(FormatError::CountOverflow { position: start })?;
                pending = Some((start, count));
                continue;
            }

            if ch.is_ascii_whitespace() {
                if let Some((start, _)) = pending {
                    return Err(FormatError::DanglingCount { position: start });
                }
                continue;
            }

            let ty = FieldType::from_code(ch).ok_or(FormatError::UnknownCode { code: ch, position })?;
            let (start, count) = pending.take().unwrap_or((position, 1));
            if fields.len() + count > MAX_FIELDS {
                return Err(FormatError::CountOverflow { position: start });
            }
            fields.extend(std::iter::repeat_n(ty, count));
        }

        if let Some((start, _)) = pending {
            return Err(FormatError::DanglingCount { position: start });
        }

        Self::from_fields(order, fields)
    }

    /// Builds a descriptor from an explicit field list.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Empty`] for an empty list and
    /// [`FormatError::CountOverflow`] above [`MAX_FIELDS`].
    pub fn from_fields(order: ByteOrder, fields: Vec<FieldType>) -> Result<Self, FormatError> {
        if fields.is_empty() {
            return Err(FormatError::Empty);
        }
        if fields.len() > MAX_FIELDS {
            return Err(FormatError::CountOverflow { position: 0 });
        }
        let record_len = fields.iter().map(|f| f.width()).sum();
        Ok(Self { order, fields, record_len })
    }

    /// Descriptor with `count` fields of the same type.
    ///
    /// # Errors
    ///
    /// Same as [`from_fields`](Self::from_fields): zero fields are
    /// [`FormatError::Empty`], more than [`MAX_FIELDS`] are
    /// [`FormatError::CountOverflow`].
    pub fn uniform(order: ByteOrder, ty: FieldType, count: usize) -> Result<Self, FormatError> {
        match count {
            0 => Err(FormatError::Empty),
            n if n > MAX_FIELDS => Err(FormatError::CountOverflow { position: 0 }),
            n => Ok(Self {
                order,
                fields: vec![ty; n],
                record_len: ty.width() * n,
            }),
        }
    }

    /// Returns the byte order.
    #[must_use]
    pub const fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Returns the field types in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldType] {
        &self.fields
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Size of one encoded record in bytes.
    #[must_use]
    pub const fn record_len(&self) -> usize {
        self.record_len
    }

    /// Decodes one record back into values.
    ///
    /// Integer fields decode to [`Value::Int`], float fields to [`Value::Float`].
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Length`] when `bytes` is not exactly one record.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<Value>, DecodeError> {
        if bytes.len() != self.record_len {
            return Err(DecodeError::Length {
                expected: self.record_len,
                found: bytes.len(),
            });
        }

        let mut cursor = 0;
        let values = self
            .fields
            .iter()
            .map(|&ty| {
                let raw = &bytes[cursor..cursor + ty.width()];
                cursor += ty.width();
                decode_field(raw, ty, self.order)
            })
            .collect();
        Ok(values)
    }
}

macro_rules! read_ordered {
    ($ty:ty, $raw:expr, $order:expr) => {{
        let mut buf = [0u8; std::mem::size_of::<$ty>()];
        buf.copy_from_slice($raw);
        match $order {
            ByteOrder::Little => <$ty>::from_le_bytes(buf),
            ByteOrder::Big => <$ty>::from_be_bytes(buf),
            ByteOrder::Native => <$ty>::from_ne_bytes(buf),
        }
    }};
}

fn decode_field(raw: &[u8], ty: FieldType, order: ByteOrder) -> Value {
    match ty {
        FieldType::I8 => Value::Int(i64::from(read_ordered!(i8, raw, order))),
        FieldType::I16 => Value::Int(i64::from(read_ordered!(i16, raw, order))),
        FieldType::I32 => Value::Int(i64::from(read_ordered!(i32, raw, order))),
        FieldType::I64 => Value::Int(read_ordered!(i64, raw, order)),
        FieldType::F32 => Value::Float(f64::from(read_ordered!(f32, raw, order))),
        FieldType::F64 => Value::Float(read_ordered!(f64, raw, order)),
    }
}

/// Seven little-endian doubles (`<7d`), the layout of a six-axis pose plus
/// timestamp.
impl Default for FormatDescriptor {
    fn default() -> Self {
        Self {
            order: ByteOrder::Little,
            fields: vec![FieldType::F64; 7],
            record_len: 56,
        }
    }
}

impl FromStr for FormatDescriptor {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FormatDescriptor {
    type Error = FormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FormatDescriptor> for String {
    fn from(descriptor: FormatDescriptor) -> Self {
        descriptor.to_string()
    }
}

/// Canonical form: marker, then run-length encoded codes (`<2i3d`).
impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.order.marker())?;
        let mut rest = self.fields.as_slice();
        while let Some(&ty) = rest.first() {
            let run = rest.iter().take_while(|&&t| t == ty).count();
            if run > 1 {
                write!(f, "{run}")?;
            }
            write!(f, "{}", ty.code())?;
            rest = &rest[run..];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uniform_doubles() {
        let fmt = FormatDescriptor::parse("<7d").unwrap();
        assert_eq!(fmt.byte_order(), ByteOrder::Little);
        assert_eq!(fmt.fields(), &[FieldType::F64; 7]);
        assert_eq!(fmt.record_len(), 56);
    }

    #[test]
    fn parses_mixed_layout_without_counts() {
        let fmt = FormatDescriptor::parse("<iidddddddd").unwrap();
        assert_eq!(fmt.field_count(), 10);
        assert_eq!(fmt.fields()[..2], [FieldType::I32, FieldType::I32]);
        assert_eq!(fmt.record_len(), 72);
    }

    #[test]
    fn repeat_counts_apply_to_following_code() {
        let fmt = FormatDescriptor::parse("<2i3d").unwrap();
        assert_eq!(
            fmt.fields(),
            &[
                FieldType::I32,
                FieldType::I32,
                FieldType::F64,
                FieldType::F64,
                FieldType::F64
            ]
        );
        assert_eq!(fmt.record_len(), 32);

        let wide = FormatDescriptor::parse("12b").unwrap();
        assert_eq!(wide.field_count(), 12);
    }

    #[test]
    fn every_marker_maps_to_an_order() {
        for (layout, order) in [
            ("<d", ByteOrder::Little),
            (">d", ByteOrder::Big),
            ("!d", ByteOrder::Big),
            ("=d", ByteOrder::Native),
            ("@d", ByteOrder::Native),
            ("d", ByteOrder::Native),
        ] {
            assert_eq!(FormatDescriptor::parse(layout).unwrap().byte_order(), order, "{layout}");
        }
    }

    #[test]
    fn whitespace_between_items_is_ignored() {
        let fmt = FormatDescriptor::parse(">2h q").unwrap();
        assert_eq!(fmt.fields(), &[FieldType::I16, FieldType::I16, FieldType::I64]);
        assert_eq!(fmt.record_len(), 12);
    }

    #[test]
    fn rejects_unknown_code() {
        assert_eq!(
            FormatDescriptor::parse("<3x").unwrap_err(),
            FormatError::UnknownCode { code: 'x', position: 2 }
        );
    }

    #[test]
    fn rejects_marker_after_fields() {
        assert_eq!(
            FormatDescriptor::parse("<2i3d>").unwrap_err(),
            FormatError::MisplacedByteOrder { marker: '>', position: 5 }
        );
    }

    #[test]
    fn rejects_dangling_counts() {
        assert_eq!(
            FormatDescriptor::parse("<2d3").unwrap_err(),
            FormatError::DanglingCount { position: 3 }
        );
        assert_eq!(
            FormatDescriptor::parse("4 d").unwrap_err(),
            FormatError::DanglingCount { position: 0 }
        );
    }

    #[test]
    fn rejects_empty_layouts() {
        assert_eq!(FormatDescriptor::parse("").unwrap_err(), FormatError::Empty);
        assert_eq!(FormatDescriptor::parse("<").unwrap_err(), FormatError::Empty);
        assert_eq!(FormatDescriptor::parse("<0d").unwrap_err(), FormatError::Empty);
    }

    #[test]
    fn rejects_huge_counts() {
        assert!(matches!(
            FormatDescriptor::parse("<99999999999999999999999d"),
            Err(FormatError::CountOverflow { position: 1 })
        ));
        assert!(matches!(
            FormatDescriptor::parse("65536d1b"),
            Err(FormatError::CountOverflow { .. })
        ));
    }

    #[test]
    fn uniform_checks_count_like_parse() {
        let fmt = FormatDescriptor::uniform(ByteOrder::Big, FieldType::I16, MAX_FIELDS).unwrap();
        assert_eq!(fmt.field_count(), MAX_FIELDS);
        assert_eq!(fmt.record_len(), 2 * MAX_FIELDS);
        assert_eq!(
            FormatDescriptor::uniform(ByteOrder::Big, FieldType::I16, MAX_FIELDS + 1).unwrap_err(),
            FormatError::CountOverflow { position: 0 }
        );
        assert_eq!(
            FormatDescriptor::uniform(ByteOrder::Little, FieldType::F64, 0).unwrap_err(),
            FormatError::Empty
        );
    }

    #[test]
    fn default_is_seven_little_endian_doubles() {
        let fmt = FormatDescriptor::default();
        assert_eq!(fmt, FormatDescriptor::parse("<7d").unwrap());
        assert_eq!(
            fmt,
            FormatDescriptor::uniform(ByteOrder::Little, FieldType::F64, 7).unwrap()
        );
    }

    #[test]
    fn display_is_canonical_and_reparses() {
        for layout in ["<7d", "<iidddddddd", "!hhq", "@bfd"] {
            let fmt = FormatDescriptor::parse(layout).unwrap();
            let again = FormatDescriptor::parse(&fmt.to_string()).unwrap();
            assert_eq!(fmt, again, "{layout}");
        }
        assert_eq!(FormatDescriptor::parse("<iidddddddd").unwrap().to_string(), "<2i8d");
        assert_eq!(FormatDescriptor::parse("!hhq").unwrap().to_string(), ">2hq");
    }

    #[test]
    fn decode_reads_declared_order() {
        let fmt = FormatDescriptor::parse(">hd").unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(-2i16).to_be_bytes());
        bytes.extend_from_slice(&1.5f64.to_be_bytes());
        assert_eq!(fmt.decode(&bytes).unwrap(), vec![Value::Int(-2), Value::Float(1.5)]);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let fmt = FormatDescriptor::parse("<2d").unwrap();
        assert_eq!(
            fmt.decode(&[0u8; 15]).unwrap_err(),
            DecodeError::Length { expected: 16, found: 15 }
        );
    }

    #[test]
    fn serde_uses_layout_string() {
        let fmt = FormatDescriptor::parse("<2i3d").unwrap();
        let json = serde_json::to_string(&fmt).unwrap();
        assert_eq!(json, "\"<2i3d\"");
        let back: FormatDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fmt);
        assert!(serde_json::from_str::<FormatDescriptor>("\"<z\"").is_err());
    }
}
