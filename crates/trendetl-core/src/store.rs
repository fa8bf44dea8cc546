use async_trait::async_trait;
use thiserror::Error;

use crate::table::{SqlStatement, Table};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached: connect, I/O, or pool failures.
    #[error("store unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The store received the statement and refused it.
    #[error("statement rejected: {message}")]
    Rejected {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("invalid SQL identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("cannot decode column `{column}`: {reason}")]
    Decode { column: String, reason: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn rejected(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Rejected {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// A relational store the pipeline reads from and writes to.
///
/// Statements issued between [`begin`](Self::begin) and
/// [`commit`](Self::commit)/[`rollback`](Self::rollback) run in one
/// transaction. Outside a transaction every statement commits on its own.
#[async_trait]
pub trait TabularStore: Send {
    /// Run a query and return its rows.
    async fn query(&mut self, statement: &SqlStatement) -> Result<Table, StoreError>;

    /// Run a statement that returns no rows; yields the affected row count.
    async fn execute(&mut self, statement: &SqlStatement) -> Result<u64, StoreError>;

    /// Append all rows of `rows` to `table_name`, creating the table from the
    /// column description if it does not exist yet. Returns rows inserted.
    async fn bulk_insert(&mut self, table_name: &str, rows: &Table) -> Result<u64, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::Transaction`] if a transaction is already open.
    async fn begin(&mut self) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::Transaction`] if no transaction is open.
    async fn commit(&mut self) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::Transaction`] if no transaction is open.
    async fn rollback(&mut self) -> Result<(), StoreError>;
}
