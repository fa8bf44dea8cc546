//! Replace-by-window loading of the destination tables.
//!
//! Each table is replaced in two steps: delete every row in the window, then
//! append the freshly computed rows. [`LoadAtomicity`] decides whether those
//! steps share a transaction, per table or across the whole run.

use serde::Serialize;
use trendetl_core::{is_valid_identifier, LoadAtomicity, ObservationWindow, StoreError, TabularStore};

use crate::destination::{delete_window_statement, DestinationTable};
use crate::error::{LoadError, LoadPhase};

/// Outcome of replacing one table's window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableLoad {
    pub table: String,
    pub deleted: u64,
    pub inserted: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub atomicity: LoadAtomicity,
    pub tables: Vec<TableLoad>,
}

/// Replace `window` in every destination table, in order.
///
/// `on_table` is called before each table is touched.
///
/// # Errors
///
/// Returns [`LoadError`] naming the table and phase that failed. Tables
/// loaded earlier stay loaded unless `atomicity` is [`LoadAtomicity::Run`].
pub async fn load_window<S, F>(
    store: &mut S,
    window: ObservationWindow,
    tables: &[DestinationTable],
    atomicity: LoadAtomicity,
    mut on_table: F,
) -> Result<LoadReport, LoadError>
where
    S: TabularStore + ?Sized,
    F: FnMut(&str),
{
    let mut loaded: Vec<TableLoad> = Vec::with_capacity(tables.len());

    if atomicity == LoadAtomicity::Run {
        if let Some(first) = tables.first() {
            store
                .begin()
                .await
                .map_err(|source| load_error(first.name, LoadPhase::Begin, &[], false, source))?;
        }
    }

    for dest in tables {
        on_table(dest.name);

        let result = match atomicity {
            LoadAtomicity::Table => replace_in_transaction(store, window, dest).await,
            LoadAtomicity::Statement | LoadAtomicity::Run => {
                replace_table(store, window, dest).await
            }
        };

        match result {
            Ok(load) => {
                tracing::info!(
                    table = %load.table,
                    deleted = load.deleted,
                    inserted = load.inserted,
                    "replaced window"
                );
                loaded.push(load);
            }
            Err((phase, source)) => {
                let rolled_back = match (atomicity, phase) {
                    (LoadAtomicity::Statement, _)
                    | (LoadAtomicity::Table, LoadPhase::Begin | LoadPhase::Commit) => false,
                    (LoadAtomicity::Table | LoadAtomicity::Run, _) => {
                        rollback_best_effort(store, dest.name).await
                    }
                };
                let completed = if atomicity == LoadAtomicity::Run {
                    Vec::new()
                } else {
                    loaded.iter().map(|t| t.table.clone()).collect()
                };
                return Err(load_error(dest.name, phase, &completed, rolled_back, source));
            }
        }
    }

    if atomicity == LoadAtomicity::Run {
        if let Some(last) = tables.last() {
            store
                .commit()
                .await
                .map_err(|source| load_error(last.name, LoadPhase::Commit, &[], false, source))?;
        }
    }

    Ok(LoadReport {
        atomicity,
        tables: loaded,
    })
}

async fn replace_table<S>(
    store: &mut S,
    window: ObservationWindow,
    dest: &DestinationTable,
) -> Result<TableLoad, (LoadPhase, StoreError)>
where
    S: TabularStore + ?Sized,
{
    if !is_valid_identifier(dest.name) {
        return Err((
            LoadPhase::Delete,
            StoreError::InvalidIdentifier(dest.name.to_string()),
        ));
    }

    let deleted = store
        .execute(&delete_window_statement(dest.name, window))
        .await
        .map_err(|e| (LoadPhase::Delete, e))?;
    let inserted = store
        .bulk_insert(dest.name, &dest.rows)
        .await
        .map_err(|e| (LoadPhase::Insert, e))?;

    Ok(TableLoad {
        table: dest.name.to_string(),
        deleted,
        inserted,
    })
}

async fn replace_in_transaction<S>(
    store: &mut S,
    window: ObservationWindow,
    dest: &DestinationTable,
) -> Result<TableLoad, (LoadPhase, StoreError)>
where
    S: TabularStore + ?Sized,
{
    store.begin().await.map_err(|e| (LoadPhase::Begin, e))?;
    let load = replace_table(store, window, dest).await?;
    store.commit().await.map_err(|e| (LoadPhase::Commit, e))?;
    Ok(load)
}

/// Returns whether the rollback went through.
async fn rollback_best_effort<S>(store: &mut S, table: &str) -> bool
where
    S: TabularStore + ?Sized,
{
    match store.rollback().await {
        Ok(()) => {
            tracing::warn!(table, "rolled back after load failure");
            true
        }
        Err(e) => {
            tracing::error!(table, error = %e, "rollback failed after load failure");
            false
        }
    }
}

fn load_error(
    table: &str,
    phase: LoadPhase,
    completed: &[String],
    rolled_back: bool,
    source: StoreError,
) -> LoadError {
    LoadError {
        table: table.to_string(),
        phase,
        completed: completed.to_vec(),
        rolled_back,
        source,
    }
}
