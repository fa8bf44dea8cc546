//! Destination table contracts and conversion of aggregates into rows.

use trendetl_core::{
    Aggregates, Column, ColumnType, CountAggregate, EngagementAggregate, ObservationWindow,
    SqlStatement, Table, TableError, Value,
};

pub const TRENDING_BY_TIME: &str = "trending_by_time";
pub const EMOTIONS_BY_TIME_CATEGORY: &str = "emotions_by_time_category";

/// A computed table ready to replace its window in the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationTable {
    pub name: &'static str,
    pub rows: Table,
}

fn key_columns() -> Vec<Column> {
    vec![
        Column::new("region", ColumnType::Text),
        Column::new("category_title", ColumnType::Text),
        Column::new("trending_date", ColumnType::Date),
    ]
}

/// # Errors
///
/// Returns [`TableError`] if the row shape does not match the column list.
pub fn count_table(counts: &[CountAggregate]) -> Result<Table, TableError> {
    let mut columns = key_columns();
    columns.push(Column::new("videos_count", ColumnType::BigInt));
    let mut table = Table::new(columns)?;
    for c in counts {
        table.push_row(vec![
            Value::from(c.region.as_str()),
            Value::from(c.category_title.as_str()),
            Value::Date(c.trending_date),
            Value::Int(c.videos_count),
        ])?;
    }
    Ok(table)
}

/// # Errors
///
/// Returns [`TableError`] if the row shape does not match the column list.
pub fn engagement_table(engagement: &[EngagementAggregate]) -> Result<Table, TableError> {
    let mut columns = key_columns();
    columns.push(Column::new("likes", ColumnType::BigInt));
    columns.push(Column::new("dislikes", ColumnType::BigInt));
    let mut table = Table::new(columns)?;
    for e in engagement {
        table.push_row(vec![
            Value::from(e.region.as_str()),
            Value::from(e.category_title.as_str()),
            Value::Date(e.trending_date),
            Value::Int(e.likes),
            Value::Int(e.dislikes),
        ])?;
    }
    Ok(table)
}

/// Both destination tables, in load order.
///
/// # Errors
///
/// Returns [`TableError`] if either table cannot be built.
pub fn destination_tables(aggregates: &Aggregates) -> Result<Vec<DestinationTable>, TableError> {
    Ok(vec![
        DestinationTable {
            name: TRENDING_BY_TIME,
            rows: count_table(&aggregates.counts)?,
        },
        DestinationTable {
            name: EMOTIONS_BY_TIME_CATEGORY,
            rows: engagement_table(&aggregates.engagement)?,
        },
    ])
}

/// Removes every row of `table` inside the window. `table` must already be a
/// validated identifier.
#[must_use]
pub fn delete_window_statement(table: &str, window: ObservationWindow) -> SqlStatement {
    SqlStatement::new(format!(
        "DELETE FROM {table} WHERE trending_date BETWEEN $1 AND $2"
    ))
    .bind(window.start())
    .bind(window.end())
}
