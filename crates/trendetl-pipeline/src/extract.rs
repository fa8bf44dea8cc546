//! Window extraction from the source table.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use trendetl_core::{
    ObservationWindow, RawRecord, SqlStatement, StoreError, Table, TabularStore, Value,
};

use crate::error::ExtractionError;

const SOURCE_COLUMNS: [&str; 11] = [
    "record_id",
    "video_id",
    "region",
    "trending_date",
    "channel_title",
    "category_title",
    "publish_time",
    "views",
    "likes",
    "dislikes",
    "comment_count",
];

/// The single bounded query issued against the source table.
///
/// # Errors
///
/// Returns [`StoreError::InvalidIdentifier`] if `source_table` is not a plain
/// SQL identifier.
pub fn extraction_statement(
    source_table: &str,
    window: ObservationWindow,
) -> Result<SqlStatement, StoreError> {
    if !trendetl_core::is_valid_identifier(source_table) {
        return Err(StoreError::InvalidIdentifier(source_table.to_string()));
    }
    let sql = format!(
        "SELECT {} FROM {source_table} \
         WHERE trending_date BETWEEN $1 AND $2 \
         ORDER BY record_id",
        SOURCE_COLUMNS.join(", ")
    );
    Ok(SqlStatement::new(sql).bind(window.start()).bind(window.end()))
}

/// Fetch every source row whose `trending_date` falls inside `window`.
///
/// # Errors
///
/// Returns [`ExtractionError`] if the store rejects or cannot run the query,
/// or if the result does not have the source table's shape.
pub async fn extract<S>(
    store: &mut S,
    source_table: &str,
    window: ObservationWindow,
) -> Result<Vec<RawRecord>, ExtractionError>
where
    S: TabularStore + ?Sized,
{
    let statement = extraction_statement(source_table, window)?;
    let table = store.query(&statement).await?;
    let records = records_from_table(&table, window)?;

    tracing::info!(
        source = source_table,
        start = %window.start(),
        end = %window.end(),
        rows = table.len(),
        records = records.len(),
        "extracted source records"
    );
    Ok(records)
}

/// Convert a query result into typed records, ordered by `record_id`.
///
/// Rows with a null grouping key (region, video_id, category_title,
/// trending_date) or a `trending_date` outside `window` are skipped.
///
/// # Errors
///
/// Returns [`ExtractionError`] on a missing column, a value of the wrong
/// kind, or a repeated `record_id`.
pub fn records_from_table(
    table: &Table,
    window: ObservationWindow,
) -> Result<Vec<RawRecord>, ExtractionError> {
    if table.is_empty() {
        return Ok(Vec::new());
    }

    let mut idx = [0usize; SOURCE_COLUMNS.len()];
    for (slot, name) in idx.iter_mut().zip(SOURCE_COLUMNS) {
        *slot = table
            .column_index(name)
            .ok_or_else(|| ExtractionError::MissingColumn(name.to_string()))?;
    }
    let [record_id, video_id, region, trending_date, channel_title, category_title, publish_time, views, likes, dislikes, comment_count] =
        idx;

    let mut seen = HashSet::with_capacity(table.len());
    let mut records = Vec::with_capacity(table.len());
    let mut null_keys = 0usize;
    let mut outside = 0usize;

    for (row_no, row) in table.rows().iter().enumerate() {
        let cell = Cell { row: row_no, values: row };

        let id = cell.int(record_id, "record_id")?.ok_or_else(|| {
            cell.invalid("record_id", "is null".to_string())
        })?;
        if !seen.insert(id) {
            return Err(ExtractionError::DuplicateRecordId(id));
        }

        let keys = (
            cell.text(video_id, "video_id")?,
            cell.text(region, "region")?,
            cell.text(category_title, "category_title")?,
            cell.date(trending_date, "trending_date")?,
        );
        let (Some(video), Some(reg), Some(category), Some(day)) = keys else {
            null_keys += 1;
            continue;
        };

        if !window.contains(day) {
            outside += 1;
            continue;
        }

        records.push(RawRecord {
            record_id: id,
            video_id: video,
            region: reg,
            trending_date: day,
            channel_title: cell.text(channel_title, "channel_title")?,
            category_title: category,
            publish_time: cell.timestamp(publish_time, "publish_time")?,
            views: cell.int(views, "views")?,
            likes: cell.int(likes, "likes")?,
            dislikes: cell.int(dislikes, "dislikes")?,
            comment_count: cell.int(comment_count, "comment_count")?,
        });
    }

    if null_keys > 0 {
        tracing::warn!(rows = null_keys, "skipped source rows with a null grouping key");
    }
    if outside > 0 {
        tracing::warn!(rows = outside, "skipped source rows outside the window");
    }

    records.sort_by_key(|r| r.record_id);
    Ok(records)
}

struct Cell<'a> {
    row: usize,
    values: &'a [Value],
}

impl Cell<'_> {
    fn invalid(&self, column: &str, reason: String) -> ExtractionError {
        ExtractionError::InvalidValue {
            row: self.row,
            column: column.to_string(),
            reason,
        }
    }

    fn unexpected(&self, column: &str, value: &Value, expected: &str) -> ExtractionError {
        self.invalid(
            column,
            format!("expected {expected}, found {}", value.kind()),
        )
    }

    fn int(&self, index: usize, column: &str) -> Result<Option<i64>, ExtractionError> {
        match &self.values[index] {
            Value::Null => Ok(None),
            Value::Int(v) => Ok(Some(*v)),
            #[allow(clippy::cast_possible_truncation)]
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 => Ok(Some(*v as i64)),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|e| self.invalid(column, format!("'{s}' is not an integer: {e}"))),
            other => Err(self.unexpected(column, other, "an integer")),
        }
    }

    fn text(&self, index: usize, column: &str) -> Result<Option<String>, ExtractionError> {
        match &self.values[index] {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            other => Err(self.unexpected(column, other, "text")),
        }
    }

    fn date(&self, index: usize, column: &str) -> Result<Option<NaiveDate>, ExtractionError> {
        match &self.values[index] {
            Value::Null => Ok(None),
            Value::Date(d) => Ok(Some(*d)),
            Value::Timestamp(ts) => Ok(Some(ts.date())),
            Value::TimestampTz(ts) => Ok(Some(ts.date_naive())),
            Value::Text(s) => {
                let trimmed = s.trim();
                let day = trimmed.get(..10).unwrap_or(trimmed);
                NaiveDate::parse_from_str(day, "%Y-%m-%d")
                    .map(Some)
                    .map_err(|e| self.invalid(column, format!("'{s}' is not a date: {e}")))
            }
            other => Err(self.unexpected(column, other, "a date")),
        }
    }

    fn timestamp(
        &self,
        index: usize,
        column: &str,
    ) -> Result<Option<NaiveDateTime>, ExtractionError> {
        match &self.values[index] {
            Value::Null => Ok(None),
            Value::Timestamp(ts) => Ok(Some(*ts)),
            Value::TimestampTz(ts) => Ok(Some(ts.naive_utc())),
            Value::Date(d) => Ok(d.and_hms_opt(0, 0, 0)),
            Value::Text(s) => parse_timestamp(s)
                .map(Some)
                .ok_or_else(|| self.invalid(column, format!("'{s}' is not a timestamp"))),
            other => Err(self.unexpected(column, other, "a timestamp")),
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
