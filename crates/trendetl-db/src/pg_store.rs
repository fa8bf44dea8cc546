//! Postgres implementation of [`TabularStore`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column as _, PgPool, Postgres, QueryBuilder, Row, Transaction, TypeInfo, ValueRef};
use trendetl_core::{
    is_valid_identifier, Column, ColumnType, SqlStatement, StoreError, Table, TabularStore, Value,
};

/// Postgres accepts at most this many bind parameters per statement.
const MAX_BIND_PARAMS: usize = 65_535;

/// A [`TabularStore`] over a Postgres pool.
///
/// While a transaction is open every statement runs on the transaction's
/// connection; otherwise statements go straight to the pool.
pub struct PgStore {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
    insert_batch_size: usize,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool, insert_batch_size: usize) -> Self {
        Self {
            pool,
            tx: None,
            insert_batch_size: insert_batch_size.max(1),
        }
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn run_execute(
        &mut self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<u64, sqlx::Error> {
        let result = match self.tx.as_mut() {
            Some(tx) => query.execute(&mut **tx).await?,
            None => query.execute(&self.pool).await?,
        };
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TabularStore for PgStore {
    async fn query(&mut self, statement: &SqlStatement) -> Result<Table, StoreError> {
        let query = bind_all(sqlx::query(&statement.sql), statement)?;
        let rows = match self.tx.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await,
            None => query.fetch_all(&self.pool).await,
        }
        .map_err(|e| map_sqlx_error("query failed", e))?;

        rows_to_table(&rows)
    }

    async fn execute(&mut self, statement: &SqlStatement) -> Result<u64, StoreError> {
        let query = bind_all(sqlx::query(&statement.sql), statement)?;
        self.run_execute(query)
            .await
            .map_err(|e| map_sqlx_error("statement failed", e))
    }

    async fn bulk_insert(&mut self, table_name: &str, rows: &Table) -> Result<u64, StoreError> {
        check_identifier(table_name)?;
        for column in rows.columns() {
            check_identifier(&column.name)?;
        }

        let create = create_table_sql(table_name, rows.columns());
        self.run_execute(sqlx::query(&create))
            .await
            .map_err(|e| map_sqlx_error("create table failed", e))?;

        if rows.is_empty() {
            return Ok(0);
        }

        let column_list = rows
            .columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let chunk_size = rows_per_insert(self.insert_batch_size, rows.columns().len());
        let mut inserted = 0u64;

        for chunk in rows.rows().chunks(chunk_size) {
            let mut builder: QueryBuilder<'_, Postgres> =
                QueryBuilder::new(format!("INSERT INTO {table_name} ({column_list}) "));
            builder.push_values(chunk, |mut b, row| {
                for (value, column) in row.iter().zip(rows.columns()) {
                    match value {
                        Value::Null => match column.column_type {
                            ColumnType::BigInt => b.push_bind(None::<i64>),
                            ColumnType::Double => b.push_bind(None::<f64>),
                            ColumnType::Text => b.push_bind(None::<String>),
                            ColumnType::Date => b.push_bind(None::<NaiveDate>),
                            ColumnType::Timestamp => b.push_bind(None::<NaiveDateTime>),
                            ColumnType::TimestampTz => b.push_bind(None::<DateTime<Utc>>),
                        },
                        Value::Int(v) => b.push_bind(*v),
                        Value::Float(v) => b.push_bind(*v),
                        Value::Text(v) => b.push_bind(v.clone()),
                        Value::Date(v) => b.push_bind(*v),
                        Value::Timestamp(v) => b.push_bind(*v),
                        Value::TimestampTz(v) => b.push_bind(*v),
                    };
                }
            });

            inserted += self
                .run_execute(builder.build())
                .await
                .map_err(|e| map_sqlx_error("insert failed", e))?;
        }

        tracing::debug!(table = table_name, rows = inserted, "bulk insert complete");
        Ok(inserted)
    }

    async fn begin(&mut self) -> Result<(), StoreError> {
        if self.tx.is_some() {
            return Err(StoreError::Transaction(
                "a transaction is already open".to_string(),
            ));
        }
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin failed", e))?;
        self.tx = Some(tx);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::Transaction("commit without an open transaction".to_string()))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit failed", e))
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or_else(|| {
            StoreError::Transaction("rollback without an open transaction".to_string())
        })?;
        tx.rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback failed", e))
    }
}

/// Rows per `INSERT` for a table of `column_count` columns.
fn rows_per_insert(batch_size: usize, column_count: usize) -> usize {
    let by_params = MAX_BIND_PARAMS / column_count.max(1);
    batch_size.min(by_params).max(1)
}

fn check_identifier(name: &str) -> Result<(), StoreError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

fn create_table_sql(table_name: &str, columns: &[Column]) -> String {
    let defs = columns
        .iter()
        .map(|c| format!("{} {}", c.name, c.column_type.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE IF NOT EXISTS {table_name} ({defs})")
}

/// Every NULL parameter must carry a type from [`SqlStatement::bind_null`].
fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    statement: &'q SqlStatement,
) -> Result<Query<'q, Postgres, PgArguments>, StoreError> {
    for (index, param) in statement.params.iter().enumerate() {
        query = match param {
            Value::Null => {
                let column_type =
                    statement
                        .null_type(index)
                        .ok_or_else(|| StoreError::Rejected {
                            message: format!(
                                "parameter ${} is NULL without a declared type",
                                index + 1
                            ),
                            source: None,
                        })?;
                bind_null(query, column_type)
            }
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::Date(v) => query.bind(*v),
            Value::Timestamp(v) => query.bind(*v),
            Value::TimestampTz(v) => query.bind(*v),
        };
    }
    Ok(query)
}

fn bind_null(
    query: Query<'_, Postgres, PgArguments>,
    column_type: ColumnType,
) -> Query<'_, Postgres, PgArguments> {
    match column_type {
        ColumnType::BigInt => query.bind(None::<i64>),
        ColumnType::Double => query.bind(None::<f64>),
        ColumnType::Text => query.bind(None::<String>),
        ColumnType::Date => query.bind(None::<NaiveDate>),
        ColumnType::Timestamp => query.bind(None::<NaiveDateTime>),
        ColumnType::TimestampTz => query.bind(None::<DateTime<Utc>>),
    }
}

/// Connection-level failures surface as `Unavailable`; anything the server
/// answered is `Rejected`.
#[must_use]
pub fn map_sqlx_error(context: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::unavailable(context, err),
        _ => StoreError::rejected(context, err),
    }
}

fn column_type_for(pg_type: &str) -> Option<ColumnType> {
    match pg_type {
        "INT2" | "INT4" | "INT8" | "BOOL" => Some(ColumnType::BigInt),
        "FLOAT4" | "FLOAT8" => Some(ColumnType::Double),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => Some(ColumnType::Text),
        "DATE" => Some(ColumnType::Date),
        "TIMESTAMP" => Some(ColumnType::Timestamp),
        "TIMESTAMPTZ" => Some(ColumnType::TimestampTz),
        _ => None,
    }
}

fn rows_to_table(rows: &[PgRow]) -> Result<Table, StoreError> {
    let Some(first) = rows.first() else {
        return Ok(Table::default());
    };

    let mut columns = Vec::with_capacity(first.columns().len());
    for col in first.columns() {
        let pg_type = col.type_info().name();
        let column_type = column_type_for(pg_type).ok_or_else(|| StoreError::Decode {
            column: col.name().to_string(),
            reason: format!("unsupported Postgres type {pg_type}"),
        })?;
        columns.push(Column::new(col.name(), column_type));
    }

    let mut table = Table::new(columns).map_err(|e| StoreError::Decode {
        column: String::new(),
        reason: e.to_string(),
    })?;

    for row in rows {
        let mut values = Vec::with_capacity(row.columns().len());
        for col in row.columns() {
            values.push(decode_value(row, col.ordinal(), col.type_info().name(), col.name())?);
        }
        table.push_row(values).map_err(|e| StoreError::Decode {
            column: String::new(),
            reason: e.to_string(),
        })?;
    }

    Ok(table)
}

fn decode_value(row: &PgRow, index: usize, pg_type: &str, name: &str) -> Result<Value, StoreError> {
    let decode_err = |e: sqlx::Error| StoreError::Decode {
        column: name.to_string(),
        reason: e.to_string(),
    };

    let raw = row.try_get_raw(index).map_err(decode_err)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let value = match pg_type {
        "INT2" => Value::Int(i64::from(row.try_get::<i16, _>(index).map_err(decode_err)?)),
        "INT4" => Value::Int(i64::from(row.try_get::<i32, _>(index).map_err(decode_err)?)),
        "INT8" => Value::Int(row.try_get::<i64, _>(index).map_err(decode_err)?),
        "BOOL" => Value::Int(i64::from(row.try_get::<bool, _>(index).map_err(decode_err)?)),
        "FLOAT4" => Value::Float(f64::from(row.try_get::<f32, _>(index).map_err(decode_err)?)),
        "FLOAT8" => Value::Float(row.try_get::<f64, _>(index).map_err(decode_err)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            Value::Text(row.try_get::<String, _>(index).map_err(decode_err)?)
        }
        "DATE" => Value::Date(row.try_get::<NaiveDate, _>(index).map_err(decode_err)?),
        "TIMESTAMP" => Value::Timestamp(row.try_get::<NaiveDateTime, _>(index).map_err(decode_err)?),
        "TIMESTAMPTZ" => {
            Value::TimestampTz(row.try_get::<DateTime<Utc>, _>(index).map_err(decode_err)?)
        }
        other => {
            return Err(StoreError::Decode {
                column: name.to_string(),
                reason: format!("unsupported Postgres type {other}"),
            })
        }
    };
    Ok(value)
}
