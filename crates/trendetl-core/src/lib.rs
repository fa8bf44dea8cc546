pub mod app_config;
pub mod config;
pub mod store;
pub mod table;
pub mod transform;
pub mod types;

pub use app_config::{AppConfig, Environment, LoadAtomicity};
pub use config::{load_app_config, load_app_config_from_env};
pub use store::{StoreError, TabularStore};
pub use table::{is_valid_identifier, Column, ColumnType, SqlStatement, Table, TableError, Value};
pub use transform::{aggregate, count_by_day, engagement_by_day, reduce_last_state, Aggregates};
pub use types::{
    CountAggregate, DayKey, EngagementAggregate, EntityKey, LastStateRecord, ObservationWindow,
    RawRecord, DATE_FORMAT,
};

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("invalid date for {param}: '{value}' ({reason})")]
    InvalidDate {
        param: String,
        value: String,
        reason: String,
    },

    #[error("window start {start} is after window end {end}")]
    InvertedWindow { start: NaiveDate, end: NaiveDate },
}
