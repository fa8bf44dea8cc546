//! `trendetl run`: one windowed pipeline run against Postgres.
//!
//! Run tracking in `etl_runs` is best-effort. A tracking failure is logged
//! and never replaces the pipeline's own outcome.

use std::fmt::Write as _;

use sqlx::PgPool;
use trendetl_core::{AppConfig, LoadAtomicity, ObservationWindow};
use trendetl_db::{PgStore, PoolConfig};
use trendetl_pipeline::{run_pipeline, PipelineConfig, PipelineError, RunSummary};

use crate::RunArgs;

pub(crate) async fn run_etl(config: &AppConfig, args: &RunArgs) -> anyhow::Result<()> {
    let window = ObservationWindow::parse(&args.start_dt, &args.end_dt)
        .map_err(|e| stage_error(e.into()))?;

    let pipeline_config = pipeline_config(config, args);
    let atomicity = pipeline_config.load_atomicity;

    let pool = trendetl_db::connect_pool(&config.database_url, PoolConfig::from_app_config(config))
        .await
        .map_err(|e| {
            stage_error(PipelineError::Connection(trendetl_db::map_sqlx_error(
                "could not connect to database",
                e,
            )))
        })?;

    // Dry runs never write, so they neither lock nor record.
    let writes = !args.dry_run;
    let lock = if writes && !args.no_lock {
        Some(trendetl_db::try_acquire_run_lock(&pool).await?)
    } else {
        None
    };
    let run_id = if writes {
        record_start(&pool, window, atomicity).await
    } else {
        None
    };

    let mut store = PgStore::new(pool.clone(), config.insert_batch_size);
    let result = run_pipeline(&mut store, pipeline_config, window).await;

    if let Some(id) = run_id {
        record_outcome(&pool, id, &result).await;
    }
    if let Some(lock) = lock {
        if let Err(e) = lock.release().await {
            tracing::warn!(error = %e, "failed to release run lock");
        }
    }

    let summary = result.map_err(stage_error)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        eprintln!("All done.");
    } else {
        println!("All done.");
        print!("{}", format_summary(&summary));
    }
    Ok(())
}

pub(crate) fn pipeline_config(config: &AppConfig, args: &RunArgs) -> PipelineConfig {
    let mut pipeline = PipelineConfig::from_app_config(config);
    pipeline.dry_run = args.dry_run;
    if let Some(atomicity) = args.atomicity {
        pipeline.load_atomicity = atomicity;
    }
    pipeline
}

/// Attach the failing stage and any tables already replaced.
pub(crate) fn stage_error(err: PipelineError) -> anyhow::Error {
    let stage = err.stage();
    let completed = err.completed_tables().join(", ");
    let message = if completed.is_empty() {
        format!("run failed during {stage}")
    } else {
        format!("run failed during {stage} (tables completed: {completed})")
    };
    anyhow::Error::new(err).context(message)
}

pub(crate) fn format_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "window {} ({} load{})",
        summary.window,
        summary.atomicity,
        if summary.dry_run { ", dry run" } else { "" }
    );
    let _ = writeln!(
        out,
        "records extracted: {}, last states: {}",
        summary.records_extracted, summary.last_state_records
    );
    let _ = writeln!(
        out,
        "aggregate rows: {} count, {} engagement",
        summary.count_rows, summary.engagement_rows
    );
    for table in &summary.tables {
        let _ = writeln!(
            out,
            "  {}: deleted {}, inserted {}",
            table.table, table.deleted, table.inserted
        );
    }
    out
}

async fn record_start(
    pool: &PgPool,
    window: ObservationWindow,
    atomicity: LoadAtomicity,
) -> Option<i64> {
    match trendetl_db::create_etl_run(pool, window.start(), window.end(), &atomicity.to_string())
        .await
    {
        Ok(run) => Some(run.id),
        Err(e) => {
            tracing::warn!(error = %e, "failed to record run start");
            None
        }
    }
}

async fn record_outcome(pool: &PgPool, id: i64, result: &Result<RunSummary, PipelineError>) {
    let recorded = match result {
        Ok(summary) => {
            let tables: Vec<String> = summary.tables.iter().map(|t| t.table.clone()).collect();
            let records = i64::try_from(summary.records_extracted).unwrap_or(i64::MAX);
            trendetl_db::complete_etl_run(pool, id, &tables, records).await
        }
        Err(err) => {
            trendetl_db::fail_etl_run(pool, id, err.completed_tables(), &err.to_string()).await
        }
    };
    if let Err(e) = recorded {
        tracing::warn!(run_id = id, error = %e, "failed to record run outcome");
    }
}
