use std::time::Duration;

use async_trait::async_trait;
use evlog::meta;
use futures::TryStreamExt;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

use crate::db::error::StorageError;
use crate::db::schema::POSTGRES_SCHEMA;
use crate::db::value::{Row, Value};
use crate::db::Storage;
use crate::runtime::get_logger;

/// PostgreSQL reached through a bounded connection pool.
///
/// Concurrent callers run in parallel; uniqueness is arbitrated by the
/// server's constraints.
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connects and creates the schema if it is missing.
    ///
    /// An unreachable server is reported as [`StorageError::Unavailable`].
    pub async fn connect(url: &str, max_connections: u32, connect_timeout: Duration) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_timeout(connect_timeout)
            .connect(url)
            .await
            .map_err(|e| StorageError::Unavailable(format!("cannot connect to PostgreSQL: {}", e)))?;

        for ddl in POSTGRES_SCHEMA {
            sqlx::query(ddl).execute(&pool).await?;
        }

        get_logger().info("Connected to PostgreSQL.", meta! {
            "MaxConnections" => max_connections,
        });

        Ok(Self { pool })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn execute(&self, statement: &str, params: &[Value]) -> Result<u64, StorageError> {
        let statement = rewrite_placeholders(statement);

        let r = bind_all(sqlx::query(&statement), params)
            .execute(&self.pool)
            .await?;

        Ok(r.rows_affected())
    }

    async fn query_one(&self, statement: &str, params: &[Value]) -> Result<Option<Row>, StorageError> {
        let statement = rewrite_placeholders(statement);

        let row = bind_all(sqlx::query(&statement), params)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => Ok(None),
            Some(v) => Ok(Some(decode_row(&v)?)),
        }
    }

    async fn query_all(&self, statement: &str, params: &[Value]) -> Result<Vec<Row>, StorageError> {
        let statement = rewrite_placeholders(statement);

        let mut rows = bind_all(sqlx::query(&statement), params).fetch(&self.pool);

        let mut result = Vec::new();
        while let Some(row) = rows.try_next().await? {
            result.push(decode_row(&row)?);
        }

        Ok(result)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

/// Rewrites each `?` marker into PostgreSQL's ordinal form (`$1`, `$2`, ...)
/// in order of appearance. Markers inside single-quoted literals are left
/// alone.
pub fn rewrite_placeholders(statement: &str) -> String {
    let mut result = String::with_capacity(statement.len() + 8);
    let mut n = 0;
    let mut in_literal = false;

    for c in statement.chars() {
        match c {
            '\'' => {
                in_literal = !in_literal;
                result.push(c);
            }
            '?' if !in_literal => {
                n += 1;
                result.push('$');
                result.push_str(&n.to_string());
            }
            _ => result.push(c),
        }
    }

    result
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [Value],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Integer(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> Result<Row, StorageError> {
    let mut result = Row::new();

    for column in row.columns() {
        let i = column.ordinal();
        let raw = row.try_get_raw(i)?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INT8" => Value::Integer(row.try_get::<i64, _>(i)?),
                "INT4" => Value::Integer(row.try_get::<i32, _>(i)? as i64),
                "INT2" => Value::Integer(row.try_get::<i16, _>(i)? as i64),
                "BOOL" => Value::Integer(row.try_get::<bool, _>(i)? as i64),
                "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => Value::Text(row.try_get::<String, _>(i)?),
                other => {
                    return Err(StorageError::Decode(format!(
                        "unsupported type {} in column '{}'",
                        other,
                        column.name()
                    )))
                }
            }
        };

        result.push(column.name(), value);
    }

    Ok(result)
}
