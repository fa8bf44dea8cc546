//! In-memory [`TabularStore`] used by the pipeline integration tests.
//!
//! Understands exactly the statements the pipeline issues: the windowed
//! `SELECT ... FROM t WHERE trending_date BETWEEN $1 AND $2` and the
//! matching `DELETE`. Transactions snapshot every table on `begin`.

#![allow(dead_code)]

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use trendetl_core::{
    Column, ColumnType, SqlStatement, StoreError, Table, TabularStore, Value,
};
use trendetl_pipeline::{count_table, engagement_table, EMOTIONS_BY_TIME_CATEGORY, TRENDING_BY_TIME};

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    pub tables: BTreeMap<String, Table>,
    snapshot: Option<BTreeMap<String, Table>>,
    pub fail_query: bool,
    pub fail_delete_for: Option<String>,
    pub fail_insert_for: Option<String>,
    /// 1-based `commit` call that fails; the open transaction is discarded.
    pub fail_commit_number: Option<usize>,
    commits: usize,
    pub ops: Vec<String>,
}

impl MemoryStore {
    /// Store with an empty source table and both destination tables.
    pub fn with_schema() -> Self {
        let mut store = Self::default();
        store
            .tables
            .insert("trending_vids".to_string(), Table::new(source_columns()).unwrap());
        store
            .tables
            .insert(TRENDING_BY_TIME.to_string(), count_table(&[]).unwrap());
        store.tables.insert(
            EMOTIONS_BY_TIME_CATEGORY.to_string(),
            engagement_table(&[]).unwrap(),
        );
        store
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Append a source observation.
    pub fn add_source(
        &mut self,
        record_id: i64,
        video_id: &str,
        category: &str,
        trending_date: &str,
        likes: Option<i64>,
        dislikes: Option<i64>,
    ) {
        let table = self.tables.get_mut("trending_vids").unwrap();
        table
            .push_row(vec![
                Value::Int(record_id),
                Value::from(video_id),
                Value::from("US"),
                Value::Date(date(trending_date)),
                Value::from("Channel"),
                Value::from(category),
                Value::Null,
                Value::Int(100),
                Value::from(likes),
                Value::from(dislikes),
                Value::Int(0),
            ])
            .unwrap();
    }

    /// Append a row directly to a destination table.
    pub fn add_row(&mut self, table: &str, row: Vec<Value>) {
        self.tables.get_mut(table).unwrap().push_row(row).unwrap();
    }

    pub fn rows(&self, table: &str) -> Vec<Vec<Value>> {
        self.tables
            .get(table)
            .map(|t| t.rows().to_vec())
            .unwrap_or_default()
    }

    fn table_after(sql: &str, keyword: &str) -> Option<String> {
        let rest = &sql[sql.find(keyword)? + keyword.len()..];
        rest.split_whitespace().next().map(str::to_string)
    }

    fn window(statement: &SqlStatement) -> (NaiveDate, NaiveDate) {
        match statement.params.as_slice() {
            [Value::Date(start), Value::Date(end)] => (*start, *end),
            other => panic!("unexpected params: {other:?}"),
        }
    }
}

fn source_columns() -> Vec<Column> {
    vec![
        Column::new("record_id", ColumnType::BigInt),
        Column::new("video_id", ColumnType::Text),
        Column::new("region", ColumnType::Text),
        Column::new("trending_date", ColumnType::Date),
        Column::new("channel_title", ColumnType::Text),
        Column::new("category_title", ColumnType::Text),
        Column::new("publish_time", ColumnType::Timestamp),
        Column::new("views", ColumnType::BigInt),
        Column::new("likes", ColumnType::BigInt),
        Column::new("dislikes", ColumnType::BigInt),
        Column::new("comment_count", ColumnType::BigInt),
    ]
}

fn in_window(table: &Table, row: &[Value], start: NaiveDate, end: NaiveDate) -> bool {
    let idx = table.column_index("trending_date").unwrap();
    matches!(row[idx], Value::Date(d) if d >= start && d <= end)
}

fn rejected(message: String) -> StoreError {
    StoreError::Rejected {
        message,
        source: None,
    }
}

#[async_trait]
impl TabularStore for MemoryStore {
    async fn query(&mut self, statement: &SqlStatement) -> Result<Table, StoreError> {
        let name = Self::table_after(&statement.sql, " FROM ").unwrap();
        self.ops.push(format!("query {name}"));
        if self.fail_query {
            return Err(StoreError::Unavailable {
                message: "connection reset".to_string(),
                source: None,
            });
        }
        let (start, end) = Self::window(statement);
        let table = self
            .tables
            .get(&name)
            .ok_or_else(|| rejected(format!("relation \"{name}\" does not exist")))?;

        let mut out = Table::new(table.columns().to_vec()).unwrap();
        for row in table.rows() {
            if in_window(table, row, start, end) {
                out.push_row(row.clone()).unwrap();
            }
        }
        Ok(out)
    }

    async fn execute(&mut self, statement: &SqlStatement) -> Result<u64, StoreError> {
        let name = Self::table_after(&statement.sql, "DELETE FROM ").unwrap();
        self.ops.push(format!("delete {name}"));
        if self.fail_delete_for.as_deref() == Some(name.as_str()) {
            return Err(rejected(format!("delete from {name} refused")));
        }
        let (start, end) = Self::window(statement);
        let table = self
            .tables
            .get_mut(&name)
            .ok_or_else(|| rejected(format!("relation \"{name}\" does not exist")))?;

        let mut kept = Table::new(table.columns().to_vec()).unwrap();
        let mut deleted = 0;
        for row in table.rows() {
            if in_window(table, row, start, end) {
                deleted += 1;
            } else {
                kept.push_row(row.clone()).unwrap();
            }
        }
        *table = kept;
        Ok(deleted)
    }

    async fn bulk_insert(&mut self, table_name: &str, rows: &Table) -> Result<u64, StoreError> {
        self.ops.push(format!("insert {table_name}"));
        if self.fail_insert_for.as_deref() == Some(table_name) {
            return Err(rejected(format!("insert into {table_name} refused")));
        }
        let table = self
            .tables
            .entry(table_name.to_string())
            .or_insert_with(|| Table::new(rows.columns().to_vec()).unwrap());
        if table.columns() != rows.columns() {
            return Err(rejected(format!("column mismatch for {table_name}")));
        }
        for row in rows.rows() {
            table.push_row(row.clone()).unwrap();
        }
        Ok(rows.len() as u64)
    }

    async fn begin(&mut self) -> Result<(), StoreError> {
        self.ops.push("begin".to_string());
        if self.snapshot.is_some() {
            return Err(StoreError::Transaction("already open".to_string()));
        }
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.ops.push("commit".to_string());
        let saved = self
            .snapshot
            .take()
            .ok_or_else(|| StoreError::Transaction("no open transaction".to_string()))?;
        self.commits += 1;
        if self.fail_commit_number == Some(self.commits) {
            self.tables = saved;
            return Err(rejected("could not serialize access".to_string()));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.ops.push("rollback".to_string());
        let saved = self
            .snapshot
            .take()
            .ok_or_else(|| StoreError::Transaction("no open transaction".to_string()))?;
        self.tables = saved;
        Ok(())
    }
}
