//! Row encoding into fixed-layout binary records.
//!
//! Every value of a row is cast to the type its position declares in the
//! [`FormatDescriptor`] and written densely in the descriptor's byte order.
//! Batch encoding is partial-failure tolerant: a row that cannot be cast is
//! logged and dropped, blank rows are skipped, and everything else comes out
//! in input order.

use std::fmt;

use thiserror::Error;

use crate::format::{ByteOrder, FieldType, FormatDescriptor};
use crate::row::{Dataset, Row, Value};
use crate::trace::warn;

/// One encoded row. Immutable once built.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BinaryRecord(Box<[u8]>);

impl BinaryRecord {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for BinaryRecord {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for BinaryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BinaryRecord({} bytes)", self.0.len())
    }
}

/// Why a single value could not be cast.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CastError {
    #[error("missing value")]
    Null,
    #[error("{0:?} is not numeric")]
    NotNumeric(String),
    #[error("value is not finite")]
    NotFinite,
    #[error("value out of range")]
    OutOfRange,
}

/// What was wrong with a rejected row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowErrorKind {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("field {field}{label}: cannot convert to {ty}: {cause}", label = .column.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Field {
        field: usize,
        column: Option<String>,
        ty: FieldType,
        cause: CastError,
    },
}

/// A row that could not be encoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {row}: {kind}")]
pub struct RowConversionError {
    /// Index of the row in its source.
    pub row: usize,
    pub kind: RowErrorKind,
}

/// Result of encoding a batch of rows.
#[derive(Debug, Default)]
pub struct EncodeOutcome {
    /// Encoded records, in input order.
    pub records: Vec<BinaryRecord>,
    /// One entry per rejected row, in input order.
    pub failures: Vec<RowConversionError>,
    /// Number of blank rows skipped.
    pub skipped: usize,
}

impl EncodeOutcome {
    /// Appends another outcome, keeping order.
    pub fn extend(&mut self, other: Self) {
        self.records.extend(other.records);
        self.failures.extend(other.failures);
        self.skipped += other.skipped;
    }
}

/// Encodes rows against a fixed layout.
#[derive(Debug, Clone)]
pub struct RowEncoder {
    format: FormatDescriptor,
}

impl RowEncoder {
    #[must_use]
    pub const fn new(format: FormatDescriptor) -> Self {
        Self { format }
    }

    #[must_use]
    pub const fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    /// Encodes a single row.
    ///
    /// # Errors
    ///
    /// Returns a [`RowConversionError`] when the row has the wrong number of
    /// fields or a value cannot be cast to its declared type.
    pub fn encode_row(&self, row: &Row) -> Result<BinaryRecord, RowConversionError> {
        self.encode_with_columns(row, None)
    }

    /// Encodes a batch, dropping blank and unconvertible rows.
    pub fn encode_all<'a>(&self, rows: impl IntoIterator<Item = &'a Row>) -> EncodeOutcome {
        self.encode_batch(rows, None)
    }

    /// Encodes every row of a dataset; errors carry column names when known.
    pub fn encode_dataset(&self, dataset: &Dataset) -> EncodeOutcome {
        self.encode_batch(&dataset.rows, dataset.columns.as_deref())
    }

    fn encode_batch<'a>(
        &self,
        rows: impl IntoIterator<Item = &'a Row>,
        columns: Option<&[String]>,
    ) -> EncodeOutcome {
        let mut outcome = EncodeOutcome::default();
        for row in rows {
            if row.is_blank() {
                outcome.skipped += 1;
                continue;
            }
            match self.encode_with_columns(row, columns) {
                Ok(record) => outcome.records.push(record),
                Err(err) => {
                    warn!(row = err.row, error = %err, "dropping row");
                    outcome.failures.push(err);
                }
            }
        }
        outcome
    }

    fn encode_with_columns(
        &self,
        row: &Row,
        columns: Option<&[String]>,
    ) -> Result<BinaryRecord, RowConversionError> {
        let fields = self.format.fields();
        if row.len() != fields.len() {
            return Err(RowConversionError {
                row: row.index,
                kind: RowErrorKind::FieldCount {
                    expected: fields.len(),
                    found: row.len(),
                },
            });
        }

        let order = self.format.byte_order();
        let mut buf = Vec::with_capacity(self.format.record_len());
        for (field, (&ty, value)) in fields.iter().zip(&row.values).enumerate() {
            put_field(&mut buf, ty, value, order).map_err(|cause| RowConversionError {
                row: row.index,
                kind: RowErrorKind::Field {
                    field,
                    column: columns.and_then(|c| c.get(field)).cloned(),
                    ty,
                    cause,
                },
            })?;
        }
        debug_assert_eq!(buf.len(), self.format.record_len());
        Ok(BinaryRecord(buf.into_boxed_slice()))
    }
}

/// Encodes a single row against `format`.
///
/// # Errors
///
/// See [`RowEncoder::encode_row`].
pub fn encode_row(row: &Row, format: &FormatDescriptor) -> Result<BinaryRecord, RowConversionError> {
    RowEncoder::new(format.clone()).encode_row(row)
}

/// Encodes a batch of rows against `format`. See [`RowEncoder::encode_all`].
pub fn encode_all<'a>(
    rows: impl IntoIterator<Item = &'a Row>,
    format: &FormatDescriptor,
) -> EncodeOutcome {
    RowEncoder::new(format.clone()).encode_all(rows)
}

macro_rules! put_ordered {
    ($buf:expr, $v:expr, $order:expr) => {{
        let v = $v;
        let bytes = match $order {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
            ByteOrder::Native => v.to_ne_bytes(),
        };
        $buf.extend_from_slice(&bytes);
    }};
}

fn put_field(buf: &mut Vec<u8>, ty: FieldType, value: &Value, order: ByteOrder) -> Result<(), CastError> {
    match ty {
        FieldType::I8 => put_ordered!(buf, narrow::<i8>(as_integer(value)?)?, order),
        FieldType::I16 => put_ordered!(buf, narrow::<i16>(as_integer(value)?)?, order),
        FieldType::I32 => put_ordered!(buf, narrow::<i32>(as_integer(value)?)?, order),
        FieldType::I64 => put_ordered!(buf, as_integer(value)?, order),
        FieldType::F32 => put_ordered!(buf, as_f32(as_float(value)?)?, order),
        FieldType::F64 => put_ordered!(buf, as_float(value)?, order),
    }
    Ok(())
}

fn narrow<T: TryFrom<i64>>(v: i64) -> Result<T, CastError> {
    T::try_from(v).map_err(|_| CastError::OutOfRange)
}

/// Integer cast: floats truncate toward zero, text is parsed.
fn as_integer(value: &Value) -> Result<i64, CastError> {
    match value {
        Value::Null => Err(CastError::Null),
        Value::Int(v) => Ok(*v),
        Value::Float(v) => truncate(*v),
        Value::Text(s) => {
            let s = s.trim();
            if let Ok(v) = s.parse::<i64>() {
                return Ok(v);
            }
            s.parse::<f64>()
                .map_err(|_| CastError::NotNumeric(s.to_owned()))
                .and_then(truncate)
        }
    }
}

fn truncate(v: f64) -> Result<i64, CastError> {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if !v.is_finite() {
        return Err(CastError::NotFinite);
    }
    let t = v.trunc();
    if t < -LIMIT || t >= LIMIT {
        return Err(CastError::OutOfRange);
    }
    Ok(t as i64)
}

/// Float cast: a missing cell becomes NaN so the row keeps its slot.
fn as_float(value: &Value) -> Result<f64, CastError> {
    match value {
        Value::Null => Ok(f64::NAN),
        Value::Int(v) => Ok(*v as f64),
        Value::Float(v) => Ok(*v),
        Value::Text(s) => {
            let s = s.trim();
            s.parse::<f64>().map_err(|_| CastError::NotNumeric(s.to_owned()))
        }
    }
}

fn as_f32(v: f64) -> Result<f32, CastError> {
    if v.is_finite() && v.abs() > f64::from(f32::MAX) {
        return Err(CastError::OutOfRange);
    }
    Ok(v as f32)
}
