//! Single-pass run of extract, reduce, aggregate and load over one window.

use std::fmt;

use serde::Serialize;
use trendetl_core::{
    aggregate, reduce_last_state, AppConfig, LoadAtomicity, ObservationWindow, TabularStore,
};

use crate::destination::destination_tables;
use crate::error::{PipelineError, Stage};
use crate::extract::extract;
use crate::load::{load_window, TableLoad};

/// Settings the driver needs, passed in explicitly per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub source_table: String,
    pub load_atomicity: LoadAtomicity,
    /// Stop after aggregation without touching destination tables.
    pub dry_run: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_table: "trending_vids".to_string(),
            load_atomicity: LoadAtomicity::default(),
            dry_run: false,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            source_table: config.source_table.clone(),
            load_atomicity: config.load_atomicity,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Extracting,
    Reducing,
    Aggregating,
    Loading(String),
    Done,
    Failed(Stage),
}

impl RunState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed(_))
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => f.write_str("idle"),
            RunState::Extracting => f.write_str("extracting"),
            RunState::Reducing => f.write_str("reducing"),
            RunState::Aggregating => f.write_str("aggregating"),
            RunState::Loading(table) => write!(f, "loading({table})"),
            RunState::Done => f.write_str("done"),
            RunState::Failed(stage) => write!(f, "failed({stage})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub window: ObservationWindow,
    pub dry_run: bool,
    pub atomicity: LoadAtomicity,
    pub records_extracted: usize,
    pub last_state_records: usize,
    pub count_rows: usize,
    pub engagement_rows: usize,
    pub tables: Vec<TableLoad>,
}

/// Drives runs against a borrowed store.
///
/// After [`Pipeline::run`] returns the state is terminal; calling `run` again
/// starts a fresh history from `Idle`.
pub struct Pipeline<'s, S: TabularStore + ?Sized> {
    store: &'s mut S,
    config: PipelineConfig,
    state: RunState,
    history: Vec<RunState>,
}

impl<'s, S: TabularStore + ?Sized> Pipeline<'s, S> {
    pub fn new(store: &'s mut S, config: PipelineConfig) -> Self {
        Self {
            store,
            config,
            state: RunState::Idle,
            history: vec![RunState::Idle],
        }
    }

    #[must_use]
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Every state entered so far, starting with `Idle`.
    #[must_use]
    pub fn transitions(&self) -> &[RunState] {
        &self.history
    }

    fn enter(&mut self, next: RunState) {
        tracing::debug!(from = %self.state, to = %next, "run state transition");
        self.history.push(next.clone());
        self.state = next;
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        let stage = err.stage();
        tracing::error!(stage = %stage, error = %err, "run failed");
        self.enter(RunState::Failed(stage));
        err
    }

    /// # Errors
    ///
    /// Returns [`PipelineError`] for the first stage that fails. No later
    /// stage is attempted.
    pub async fn run(&mut self, window: ObservationWindow) -> Result<RunSummary, PipelineError> {
        if self.state.is_terminal() {
            self.state = RunState::Idle;
            self.history = vec![RunState::Idle];
        }
        tracing::info!(
            start = %window.start(),
            end = %window.end(),
            atomicity = %self.config.load_atomicity,
            dry_run = self.config.dry_run,
            "starting run"
        );

        self.enter(RunState::Extracting);
        let records = match extract(&mut *self.store, &self.config.source_table, window).await {
            Ok(records) => records,
            Err(e) => return Err(self.fail(e.into())),
        };

        self.enter(RunState::Reducing);
        let last_states = reduce_last_state(&records);

        self.enter(RunState::Aggregating);
        let aggregates = aggregate(&records, &last_states);
        let tables = match destination_tables(&aggregates) {
            Ok(tables) => tables,
            Err(e) => return Err(self.fail(e.into())),
        };

        let mut summary = RunSummary {
            window,
            dry_run: self.config.dry_run,
            atomicity: self.config.load_atomicity,
            records_extracted: records.len(),
            last_state_records: last_states.len(),
            count_rows: aggregates.counts.len(),
            engagement_rows: aggregates.engagement.len(),
            tables: Vec::new(),
        };

        if !self.config.dry_run {
            let state = &mut self.state;
            let history = &mut self.history;
            let result = load_window(
                &mut *self.store,
                window,
                &tables,
                self.config.load_atomicity,
                |table| {
                    let next = RunState::Loading(table.to_string());
                    tracing::debug!(from = %state, to = %next, "run state transition");
                    history.push(next.clone());
                    *state = next;
                },
            )
            .await;
            match result {
                Ok(report) => summary.tables = report.tables,
                Err(e) => return Err(self.fail(e.into())),
            }
        }

        self.enter(RunState::Done);
        tracing::info!(
            records = summary.records_extracted,
            last_states = summary.last_state_records,
            tables = summary.tables.len(),
            "run complete"
        );
        Ok(summary)
    }
}

/// Build a [`Pipeline`] and run it once.
///
/// # Errors
///
/// See [`Pipeline::run`].
pub async fn run_pipeline<S>(
    store: &mut S,
    config: PipelineConfig,
    window: ObservationWindow,
) -> Result<RunSummary, PipelineError>
where
    S: TabularStore + ?Sized,
{
    Pipeline::new(store, config).run(window).await
}
