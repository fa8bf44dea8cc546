mod common;

use common::{date, MemoryStore};
use trendetl_core::{LoadAtomicity, ObservationWindow, Value};
use trendetl_pipeline::{
    run_pipeline, LoadPhase, Pipeline, PipelineConfig, PipelineError, RunState, Stage,
    EMOTIONS_BY_TIME_CATEGORY, TRENDING_BY_TIME,
};

fn january() -> ObservationWindow {
    ObservationWindow::new(date("2018-01-01"), date("2018-01-31")).unwrap()
}

fn config(atomicity: LoadAtomicity) -> PipelineConfig {
    PipelineConfig {
        load_atomicity: atomicity,
        ..PipelineConfig::default()
    }
}

fn count_row(category: &str, day: &str, count: i64) -> Vec<Value> {
    vec![
        Value::from("US"),
        Value::from(category),
        Value::Date(date(day)),
        Value::Int(count),
    ]
}

fn engagement_row(category: &str, day: &str, likes: i64, dislikes: i64) -> Vec<Value> {
    vec![
        Value::from("US"),
        Value::from(category),
        Value::Date(date(day)),
        Value::Int(likes),
        Value::Int(dislikes),
    ]
}

/// One video trending twice in January, plus a stale row in each destination.
fn seeded_store() -> MemoryStore {
    let mut store = MemoryStore::with_schema();
    store.add_source(1, "v1", "Comedy", "2018-01-01", Some(10), Some(1));
    store.add_source(2, "v1", "Comedy", "2018-01-03", Some(15), Some(3));
    store.add_row(TRENDING_BY_TIME, count_row("Music", "2018-01-05", 99));
    store.add_row(EMOTIONS_BY_TIME_CATEGORY, engagement_row("Music", "2018-01-05", 9, 9));
    store
}

#[tokio::test]
async fn run_replaces_window_with_last_state_aggregates() {
    let mut store = seeded_store();

    let summary = run_pipeline(&mut store, PipelineConfig::default(), january())
        .await
        .unwrap();

    assert_eq!(summary.records_extracted, 2);
    assert_eq!(summary.last_state_records, 1);
    assert_eq!(summary.count_rows, 2);
    assert_eq!(summary.engagement_rows, 1);
    assert_eq!(
        store.rows(TRENDING_BY_TIME),
        vec![
            count_row("Comedy", "2018-01-01", 1),
            count_row("Comedy", "2018-01-03", 1),
        ]
    );
    assert_eq!(
        store.rows(EMOTIONS_BY_TIME_CATEGORY),
        vec![engagement_row("Comedy", "2018-01-03", 15, 3)]
    );

    let tables: Vec<(&str, u64, u64)> = summary
        .tables
        .iter()
        .map(|t| (t.table.as_str(), t.deleted, t.inserted))
        .collect();
    assert_eq!(
        tables,
        vec![(TRENDING_BY_TIME, 1, 2), (EMOTIONS_BY_TIME_CATEGORY, 1, 1)]
    );
}

#[tokio::test]
async fn count_includes_every_video_on_a_day() {
    let mut store = MemoryStore::with_schema();
    store.add_source(1, "v1", "Comedy", "2018-01-02", Some(1), Some(0));
    store.add_source(2, "v2", "Comedy", "2018-01-02", Some(2), Some(0));
    store.add_source(3, "v3", "Music", "2018-01-02", None, None);

    run_pipeline(&mut store, PipelineConfig::default(), january())
        .await
        .unwrap();

    assert_eq!(
        store.rows(TRENDING_BY_TIME),
        vec![
            count_row("Comedy", "2018-01-02", 2),
            count_row("Music", "2018-01-02", 1),
        ]
    );
    assert_eq!(
        store.rows(EMOTIONS_BY_TIME_CATEGORY),
        vec![
            engagement_row("Comedy", "2018-01-02", 3, 0),
            engagement_row("Music", "2018-01-02", 0, 0),
        ]
    );
}

#[tokio::test]
async fn rerunning_the_same_window_is_idempotent() {
    let mut store = seeded_store();

    let first = run_pipeline(&mut store, PipelineConfig::default(), january())
        .await
        .unwrap();
    let after_first = store.tables.clone();

    let second = run_pipeline(&mut store, PipelineConfig::default(), january())
        .await
        .unwrap();

    assert_eq!(store.tables, after_first);
    for (a, b) in first.tables.iter().zip(&second.tables) {
        assert_eq!(b.deleted, a.inserted);
        assert_eq!(b.inserted, a.inserted);
    }
}

#[tokio::test]
async fn rows_outside_the_window_are_untouched() {
    let mut store = seeded_store();
    store.add_source(3, "v9", "News", "2018-02-01", Some(50), Some(5));
    store.add_row(TRENDING_BY_TIME, count_row("News", "2017-12-31", 7));
    store.add_row(TRENDING_BY_TIME, count_row("News", "2018-02-01", 8));
    store.add_row(EMOTIONS_BY_TIME_CATEGORY, engagement_row("News", "2018-02-01", 4, 2));

    run_pipeline(&mut store, PipelineConfig::default(), january())
        .await
        .unwrap();

    let counts = store.rows(TRENDING_BY_TIME);
    assert!(counts.contains(&count_row("News", "2017-12-31", 7)));
    assert!(counts.contains(&count_row("News", "2018-02-01", 8)));
    assert!(!counts.contains(&count_row("Music", "2018-01-05", 99)));
    assert!(store
        .rows(EMOTIONS_BY_TIME_CATEGORY)
        .contains(&engagement_row("News", "2018-02-01", 4, 2)));
}

#[tokio::test]
async fn empty_extraction_empties_the_window() {
    let mut store = MemoryStore::with_schema();
    store.add_source(1, "v1", "Comedy", "2018-03-01", Some(1), Some(1));
    store.add_row(TRENDING_BY_TIME, count_row("Music", "2018-01-05", 99));
    store.add_row(EMOTIONS_BY_TIME_CATEGORY, engagement_row("Music", "2018-01-05", 9, 9));

    let summary = run_pipeline(&mut store, PipelineConfig::default(), january())
        .await
        .unwrap();

    assert_eq!(summary.records_extracted, 0);
    assert!(store.rows(TRENDING_BY_TIME).is_empty());
    assert!(store.rows(EMOTIONS_BY_TIME_CATEGORY).is_empty());
    assert!(summary.tables.iter().all(|t| t.deleted == 1 && t.inserted == 0));
}

#[tokio::test]
async fn statement_mode_append_failure_leaves_window_empty() {
    let mut store = seeded_store();
    store.fail_insert_for = Some(EMOTIONS_BY_TIME_CATEGORY.to_string());

    let err = run_pipeline(&mut store, config(LoadAtomicity::Statement), january())
        .await
        .unwrap_err();

    let PipelineError::Load(load) = &err else {
        panic!("expected load error, got {err:?}");
    };
    assert_eq!(load.table, EMOTIONS_BY_TIME_CATEGORY);
    assert_eq!(load.phase, LoadPhase::Insert);
    assert!(!load.rolled_back);
    assert_eq!(err.completed_tables(), [TRENDING_BY_TIME.to_string()]);
    assert_eq!(err.stage(), Stage::Loading);

    assert_eq!(store.rows(TRENDING_BY_TIME).len(), 2);
    assert!(store.rows(EMOTIONS_BY_TIME_CATEGORY).is_empty());
    assert!(!store.ops.iter().any(|op| op == "begin"));
}

#[tokio::test]
async fn table_mode_append_failure_keeps_previous_window() {
    let mut store = seeded_store();
    store.fail_insert_for = Some(EMOTIONS_BY_TIME_CATEGORY.to_string());

    let err = run_pipeline(&mut store, config(LoadAtomicity::Table), january())
        .await
        .unwrap_err();

    let PipelineError::Load(load) = &err else {
        panic!("expected load error, got {err:?}");
    };
    assert!(load.rolled_back);
    assert_eq!(load.completed, vec![TRENDING_BY_TIME.to_string()]);

    assert_eq!(store.rows(TRENDING_BY_TIME).len(), 2);
    assert_eq!(
        store.rows(EMOTIONS_BY_TIME_CATEGORY),
        vec![engagement_row("Music", "2018-01-05", 9, 9)]
    );
    assert!(!store.in_transaction());
}

#[tokio::test]
async fn run_mode_failure_rolls_back_every_table() {
    let mut store = seeded_store();
    let before = store.tables.clone();
    store.fail_insert_for = Some(EMOTIONS_BY_TIME_CATEGORY.to_string());

    let err = run_pipeline(&mut store, config(LoadAtomicity::Run), january())
        .await
        .unwrap_err();

    let PipelineError::Load(load) = &err else {
        panic!("expected load error, got {err:?}");
    };
    assert!(load.rolled_back);
    assert!(load.completed.is_empty());
    assert_eq!(store.tables, before);
    assert_eq!(
        store.ops.iter().filter(|op| op.as_str() == "begin").count(),
        1
    );
}

#[tokio::test]
async fn run_mode_success_commits_once() {
    let mut store = seeded_store();

    let summary = run_pipeline(&mut store, config(LoadAtomicity::Run), january())
        .await
        .unwrap();

    assert_eq!(summary.atomicity, LoadAtomicity::Run);
    assert_eq!(summary.tables.len(), 2);
    assert_eq!(
        store.ops,
        vec![
            "query trending_vids",
            "begin",
            "delete trending_by_time",
            "insert trending_by_time",
            "delete emotions_by_time_category",
            "insert emotions_by_time_category",
            "commit",
        ]
    );
    assert_eq!(
        store.rows(TRENDING_BY_TIME),
        vec![
            count_row("Comedy", "2018-01-01", 1),
            count_row("Comedy", "2018-01-03", 1),
        ]
    );
    assert_eq!(
        store.rows(EMOTIONS_BY_TIME_CATEGORY),
        vec![engagement_row("Comedy", "2018-01-03", 15, 3)]
    );
    assert!(!store.in_transaction());
}

#[tokio::test]
async fn table_mode_commit_failure_keeps_earlier_tables() {
    let mut store = seeded_store();
    store.fail_commit_number = Some(2);

    let err = run_pipeline(&mut store, config(LoadAtomicity::Table), january())
        .await
        .unwrap_err();

    let PipelineError::Load(load) = &err else {
        panic!("expected load error, got {err:?}");
    };
    assert_eq!(load.table, EMOTIONS_BY_TIME_CATEGORY);
    assert_eq!(load.phase, LoadPhase::Commit);
    assert_eq!(load.completed, vec![TRENDING_BY_TIME.to_string()]);
    assert!(!load.rolled_back);

    assert_eq!(
        store.rows(TRENDING_BY_TIME),
        vec![
            count_row("Comedy", "2018-01-01", 1),
            count_row("Comedy", "2018-01-03", 1),
        ]
    );
    assert_eq!(
        store.rows(EMOTIONS_BY_TIME_CATEGORY),
        vec![engagement_row("Music", "2018-01-05", 9, 9)]
    );
    assert!(!store.ops.iter().any(|op| op == "rollback"));
}

#[tokio::test]
async fn run_mode_commit_failure_leaves_every_table_as_before() {
    let mut store = seeded_store();
    let before = store.tables.clone();
    store.fail_commit_number = Some(1);

    let err = run_pipeline(&mut store, config(LoadAtomicity::Run), january())
        .await
        .unwrap_err();

    let PipelineError::Load(load) = &err else {
        panic!("expected load error, got {err:?}");
    };
    assert_eq!(load.table, EMOTIONS_BY_TIME_CATEGORY);
    assert_eq!(load.phase, LoadPhase::Commit);
    assert!(load.completed.is_empty());
    assert!(!load.rolled_back);
    assert_eq!(store.tables, before);
    assert!(!store.in_transaction());
}

#[tokio::test]
async fn load_failure_records_the_table_being_loaded() {
    let mut store = seeded_store();
    store.fail_insert_for = Some(TRENDING_BY_TIME.to_string());
    let mut pipeline = Pipeline::new(&mut store, PipelineConfig::default());

    let err = pipeline.run(january()).await.unwrap_err();

    assert_eq!(err.stage(), Stage::Loading);
    assert_eq!(
        pipeline.transitions(),
        [
            RunState::Idle,
            RunState::Extracting,
            RunState::Reducing,
            RunState::Aggregating,
            RunState::Loading(TRENDING_BY_TIME.to_string()),
            RunState::Failed(Stage::Loading),
        ]
    );
}

#[tokio::test]
async fn delete_failure_is_attributed_to_the_table() {
    let mut store = seeded_store();
    store.fail_delete_for = Some(TRENDING_BY_TIME.to_string());

    let err = run_pipeline(&mut store, PipelineConfig::default(), january())
        .await
        .unwrap_err();

    let PipelineError::Load(load) = &err else {
        panic!("expected load error, got {err:?}");
    };
    assert_eq!(load.table, TRENDING_BY_TIME);
    assert_eq!(load.phase, LoadPhase::Delete);
    assert!(load.completed.is_empty());
    assert!(!store.ops.iter().any(|op| op == "delete emotions_by_time_category"));
}

#[tokio::test]
async fn missing_destination_table_fails_the_load() {
    let mut store = seeded_store();
    store.tables.remove(TRENDING_BY_TIME);

    let err = run_pipeline(&mut store, config(LoadAtomicity::Statement), january())
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Loading);
    assert!(err.to_string().contains("does not exist"), "{err}");
}

#[tokio::test]
async fn extraction_failure_stops_before_loading() {
    let mut store = seeded_store();
    store.fail_query = true;
    let before = store.tables.clone();

    let mut pipeline = Pipeline::new(&mut store, PipelineConfig::default());
    let err = pipeline.run(january()).await.unwrap_err();

    assert_eq!(err.stage(), Stage::Extracting);
    assert_eq!(pipeline.state(), &RunState::Failed(Stage::Extracting));
    assert_eq!(
        pipeline.transitions(),
        [
            RunState::Idle,
            RunState::Extracting,
            RunState::Failed(Stage::Extracting)
        ]
    );
    drop(pipeline);

    assert_eq!(store.tables, before);
    assert_eq!(store.ops, vec!["query trending_vids".to_string()]);
}

#[tokio::test]
async fn successful_run_walks_every_state() {
    let mut store = seeded_store();
    let mut pipeline = Pipeline::new(&mut store, PipelineConfig::default());

    pipeline.run(january()).await.unwrap();

    assert_eq!(
        pipeline.transitions(),
        [
            RunState::Idle,
            RunState::Extracting,
            RunState::Reducing,
            RunState::Aggregating,
            RunState::Loading(TRENDING_BY_TIME.to_string()),
            RunState::Loading(EMOTIONS_BY_TIME_CATEGORY.to_string()),
            RunState::Done,
        ]
    );
    assert!(pipeline.state().is_terminal());
}

#[tokio::test]
async fn dry_run_leaves_destinations_alone() {
    let mut store = seeded_store();
    let before = store.tables.clone();
    let config = PipelineConfig {
        dry_run: true,
        ..PipelineConfig::default()
    };

    let summary = run_pipeline(&mut store, config, january()).await.unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.count_rows, 2);
    assert!(summary.tables.is_empty());
    assert_eq!(store.tables, before);
    assert_eq!(store.ops, vec!["query trending_vids".to_string()]);
}

#[tokio::test]
async fn summary_serializes_to_json() {
    let mut store = seeded_store();

    let summary = run_pipeline(&mut store, PipelineConfig::default(), january())
        .await
        .unwrap();
    let json = serde_json::to_value(&summary).unwrap();

    assert_eq!(json["atomicity"], "table");
    assert_eq!(json["records_extracted"], 2);
    assert_eq!(json["tables"][0]["table"], TRENDING_BY_TIME);
}
