//! Tabular input handed over by the external reader.
//!
//! The replay engine does not parse files. A reader produces one [`Dataset`]
//! per source file, each an ordered list of [`Row`]s of loosely typed
//! [`Value`]s; the encoder does the casting.

use std::fmt;

/// A raw field value as produced by the tabular reader.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing cell.
    Null,
    Int(i64),
    Float(f64),
    /// Cell the reader could not type; the encoder tries to parse it.
    Text(String),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// One input row: its position in the source plus ordered field values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Zero-based position of the row in its source.
    pub index: usize,
    /// Cell values in column order.
    pub values: Vec<Value>,
}

impl Row {
    #[must_use]
    pub fn new(index: usize, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self {
            index,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// True when every value is null. Blank trailing lines of a source file
    /// come through as such rows.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.values.iter().all(Value::is_null)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// All rows read from one source, tagged with the source name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    /// Source name (typically the file name); used for prefix selection.
    pub name: String,
    /// Column headers, when the source had them.
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Row>,
}

impl Dataset {
    #[must_use]
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            columns: None,
            rows,
        }
    }

    /// Builds a dataset from bare value lists, numbering rows from zero.
    #[must_use]
    pub fn from_values(name: impl Into<String>, rows: Vec<Vec<Value>>) -> Self {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(index, values)| Row { index, values })
            .collect();
        Self::new(name, rows)
    }

    #[must_use]
    pub fn with_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Header of column `field`, if known.
    #[must_use]
    pub fn column(&self, field: usize) -> Option<&str> {
        self.columns.as_ref()?.get(field).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_rows_are_all_null() {
        assert!(Row::new(0, [Value::Null, Value::Null]).is_blank());
        assert!(Row::new(0, Vec::<Value>::new()).is_blank());
        assert!(!Row::new(0, [Value::Null, Value::Float(0.0)]).is_blank());
        assert!(!Row::new(0, [Value::from("")]).is_blank());
    }

    #[test]
    fn options_map_to_null() {
        let row = Row::new(3, [Some(1.0), None, Some(2.5)]);
        assert_eq!(row.values, vec![Value::Float(1.0), Value::Null, Value::Float(2.5)]);
        assert_eq!(row.index, 3);
    }

    #[test]
    fn dataset_numbers_rows_and_names_columns() {
        let ds = Dataset::from_values(
            "trajectory_01.csv",
            vec![vec![Value::Int(1)], vec![Value::Int(2)]],
        )
        .with_columns(["t"]);
        assert_eq!(ds.rows[1].index, 1);
        assert_eq!(ds.column(0), Some("t"));
        assert_eq!(ds.column(1), None);
    }
}
