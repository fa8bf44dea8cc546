//! Windowed extract, reduce, aggregate and load over any [`TabularStore`].
//!
//! [`TabularStore`]: trendetl_core::TabularStore

pub mod destination;
pub mod driver;
pub mod error;
pub mod extract;
pub mod load;

pub use destination::{
    count_table, delete_window_statement, destination_tables, engagement_table, DestinationTable,
    EMOTIONS_BY_TIME_CATEGORY, TRENDING_BY_TIME,
};
pub use driver::{run_pipeline, Pipeline, PipelineConfig, RunState, RunSummary};
pub use error::{ExtractionError, LoadError, LoadPhase, PipelineError, Stage};
pub use extract::{extract, extraction_statement, records_from_table};
pub use load::{load_window, LoadReport, TableLoad};
