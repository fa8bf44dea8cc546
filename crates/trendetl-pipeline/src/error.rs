use std::fmt;

use serde::Serialize;
use thiserror::Error;
use trendetl_core::{ConfigError, StoreError, TableError};

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Connect,
    Config,
    Extracting,
    Reducing,
    Aggregating,
    Loading,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Connect => "connect",
            Stage::Config => "config",
            Stage::Extracting => "extracting",
            Stage::Reducing => "reducing",
            Stage::Aggregating => "aggregating",
            Stage::Loading => "loading",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("source query failed: {0}")]
    Store(#[from] StoreError),

    #[error("source result is missing column `{0}`")]
    MissingColumn(String),

    #[error("row {row}: column `{column}` {reason}")]
    InvalidValue {
        row: usize,
        column: String,
        reason: String,
    },

    #[error("record_id {0} appears more than once")]
    DuplicateRecordId(i64),
}

/// Step of a table replacement that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPhase {
    Begin,
    Delete,
    Insert,
    Commit,
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadPhase::Begin => "begin",
            LoadPhase::Delete => "delete",
            LoadPhase::Insert => "insert",
            LoadPhase::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// A destination table could not be replaced.
///
/// `completed` lists the tables whose window was fully replaced and persisted
/// before the failure. `rolled_back` is true when the failed table's changes
/// were undone by a transaction rollback.
#[derive(Debug, Error)]
#[error("{phase} failed for table `{table}`: {source}")]
pub struct LoadError {
    pub table: String,
    pub phase: LoadPhase,
    pub completed: Vec<String>,
    pub rolled_back: bool,
    #[source]
    pub source: StoreError,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("connection failed: {0}")]
    Connection(#[source] StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("aggregation failed: {0}")]
    Aggregation(#[from] TableError),

    #[error("load failed: {0}")]
    Load(#[from] LoadError),
}

impl PipelineError {
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Connection(_) => Stage::Connect,
            PipelineError::Config(_) => Stage::Config,
            PipelineError::Extraction(_) => Stage::Extracting,
            PipelineError::Aggregation(_) => Stage::Aggregating,
            PipelineError::Load(_) => Stage::Loading,
        }
    }

    /// Destination tables that were fully replaced before the failure.
    #[must_use]
    pub fn completed_tables(&self) -> &[String] {
        match self {
            PipelineError::Load(e) => &e.completed,
            _ => &[],
        }
    }
}
