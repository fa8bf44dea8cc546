use sqlx::PgPool;
use trendetl_db::EtlRunRow;

pub(crate) async fn list_runs(pool: &PgPool, limit: i64) -> anyhow::Result<()> {
    let runs = trendetl_db::list_etl_runs(pool, limit).await?;
    if runs.is_empty() {
        println!("no runs recorded");
        return Ok(());
    }
    for run in &runs {
        println!("{}", format_run(run));
    }
    Ok(())
}

pub(crate) fn format_run(run: &EtlRunRow) -> String {
    let tables = if run.tables_completed.is_empty() {
        "-".to_string()
    } else {
        run.tables_completed.join(",")
    };
    let mut line = format!(
        "{:>6}  {:<9}  {}..{}  {:<9}  records={}  tables={}  started={}",
        run.id,
        run.status,
        run.window_start,
        run.window_end,
        run.load_atomicity,
        run.records_extracted,
        tables,
        run.started_at.format("%Y-%m-%d %H:%M:%S"),
    );
    if let Some(error) = &run.error_message {
        line.push_str("  error=");
        line.push_str(error);
    }
    line
}
