//! Dynamically typed tables exchanged with a [`TabularStore`](crate::TabularStore).
//!
//! Query results come back as a [`Table`]; the extractor turns them into typed
//! records, and the aggregates are turned back into a [`Table`] for bulk insert.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Postgres caps identifiers at 63 bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("row has {actual} values but the table has {expected} columns")]
    ArityMismatch { expected: usize, actual: usize },
    #[error("duplicate column `{0}`")]
    DuplicateColumn(String),
}

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
}

impl Value {
    /// Name of the variant, used in decode error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Date(_) => "date",
            Self::Timestamp(_) => "timestamp",
            Self::TimestampTz(_) => "timestamptz",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    BigInt,
    Double,
    Text,
    Date,
    Timestamp,
    TimestampTz,
}

impl ColumnType {
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::BigInt => "BIGINT",
            Self::Double => "DOUBLE PRECISION",
            Self::Text => "TEXT",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
            Self::TimestampTz => "TIMESTAMPTZ",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_type())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    #[must_use]
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
        }
    }
}

/// Column-described rows. Every row has exactly one value per column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// # Errors
    ///
    /// Returns [`TableError::DuplicateColumn`] if two columns share a name.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(TableError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// # Errors
    ///
    /// Returns [`TableError::ArityMismatch`] if `row` does not have one value
    /// per column.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::ArityMismatch {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// SQL text with `$n` placeholders and the values bound to them.
///
/// A NULL parameter carries no type of its own; `null_types` records the
/// column type for every NULL bound through [`SqlStatement::bind_null`].
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
    pub null_types: Vec<(usize, ColumnType)>,
}

impl SqlStatement {
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            null_types: Vec::new(),
        }
    }

    #[must_use]
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Bind a NULL that the store should send as `column_type`.
    #[must_use]
    pub fn bind_null(mut self, column_type: ColumnType) -> Self {
        self.null_types.push((self.params.len(), column_type));
        self.params.push(Value::Null);
        self
    }

    /// Declared type of the NULL at `index`, if it was bound with
    /// [`SqlStatement::bind_null`].
    #[must_use]
    pub fn null_type(&self, index: usize) -> Option<ColumnType> {
        self.null_types
            .iter()
            .find_map(|&(i, column_type)| (i == index).then_some(column_type))
    }
}

/// Returns true for a plain SQL identifier safe to splice into statement text.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
