use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use evlog::meta;
use futures::TryStreamExt;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Row as _, TypeInfo, ValueRef};
use tokio::sync::Mutex;

use crate::db::error::StorageError;
use crate::db::schema::{SQLITE_SCHEMA, TABLE_COLUMNS};
use crate::db::value::{Row, Value};
use crate::db::Storage;
use crate::runtime::get_logger;

/// SQLite database held in memory and re-serialized to an image file after
/// every mutation.
///
/// The single connection sits behind a mutex, so statements from concurrent
/// callers run one at a time and a mutation is flushed before the next
/// statement starts.
///
/// If a flush fails and the last image cannot be reloaded either, the memory
/// copy no longer matches the disk and every later call fails with
/// [`StorageError::Unavailable`].
pub struct EmbeddedStorage {
    conn: Mutex<SqliteConnection>,
    image: Option<PathBuf>,
    poisoned: AtomicBool,
}

impl EmbeddedStorage {
    /// Opens the image at `path`, creating it (and its directory) if missing.
    ///
    /// Fails with [`StorageError::Unavailable`] if the directory or the image
    /// cannot be written.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                StorageError::Unavailable(format!("cannot create data directory {}: {}", dir.display(), e))
            })?;
        }

        let mut conn = connect_memory().await?;

        if tokio::fs::metadata(&path).await.is_ok() {
            load_image(&mut conn, &path).await.map_err(|e| {
                StorageError::Unavailable(format!("cannot read database image {}: {}", path.display(), e))
            })?;
        }

        flush_image(&mut conn, &path).await.map_err(|e| {
            StorageError::Unavailable(format!("cannot write database image {}: {}", path.display(), e))
        })?;

        get_logger().info("Opened embedded database.", meta! {
            "Path" => path.display(),
        });

        Ok(Self {
            conn: Mutex::new(conn),
            image: Some(path),
            poisoned: AtomicBool::new(false),
        })
    }

    /// A database that lives only as long as this value. Nothing is flushed.
    pub async fn in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            conn: Mutex::new(connect_memory().await?),
            image: None,
            poisoned: AtomicBool::new(false),
        })
    }

    fn check_usable(&self) -> Result<(), StorageError> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "database image could not be restored after a failed write".to_owned(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for EmbeddedStorage {
    async fn execute(&self, statement: &str, params: &[Value]) -> Result<u64, StorageError> {
        let mut conn = self.conn.lock().await;
        self.check_usable()?;

        let affected = bind_all(sqlx::query(statement), params)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        let path = match &self.image {
            None => return Ok(affected),
            Some(v) => v,
        };

        if let Err(e) = flush_image(&mut conn, path).await {
            get_logger().error("Failed to flush database image; rolling back to last image.", meta! {
                "Path" => path.display(),
                "Error" => &e,
            });

            if let Err(reload_err) = load_image(&mut conn, path).await {
                get_logger().error("Failed to reload database image; refusing further use.", meta! {
                    "Path" => path.display(),
                    "Error" => &reload_err,
                });
                self.poisoned.store(true, Ordering::SeqCst);
            }

            return Err(e);
        }

        Ok(affected)
    }

    async fn query_one(&self, statement: &str, params: &[Value]) -> Result<Option<Row>, StorageError> {
        let mut conn = self.conn.lock().await;
        self.check_usable()?;

        let row = bind_all(sqlx::query(statement), params)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            None => Ok(None),
            Some(v) => Ok(Some(decode_row(&v)?)),
        }
    }

    async fn query_all(&self, statement: &str, params: &[Value]) -> Result<Vec<Row>, StorageError> {
        let mut conn = self.conn.lock().await;
        self.check_usable()?;

        let mut rows = bind_all(sqlx::query(statement), params).fetch(&mut *conn);

        let mut result = Vec::new();
        while let Some(row) = rows.try_next().await? {
            result.push(decode_row(&row)?);
        }

        Ok(result)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

async fn connect_memory() -> Result<SqliteConnection, StorageError> {
    // A plain ":memory:" filename rather than the in-memory open flag, so that
    // VACUUM INTO writes a real file.
    let mut conn = SqliteConnectOptions::new()
        .filename(":memory:")
        .connect()
        .await
        .map_err(|e| StorageError::Unavailable(format!("cannot open in-memory database: {}", e)))?;

    for ddl in SQLITE_SCHEMA {
        sqlx::query(ddl).execute(&mut conn).await?;
    }

    Ok(conn)
}

fn path_str(path: &Path) -> Result<&str, StorageError> {
    path.to_str().ok_or_else(|| {
        StorageError::Unavailable(format!("database path is not valid UTF-8: {}", path.display()))
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Replaces the in-memory contents with the contents of the image at `path`.
async fn load_image(conn: &mut SqliteConnection, path: &Path) -> Result<(), StorageError> {
    sqlx::query("ATTACH DATABASE ? AS image")
        .bind(path_str(path)?)
        .execute(&mut *conn)
        .await?;

    let copied = copy_from_image(conn).await;

    sqlx::query("DETACH DATABASE image").execute(&mut *conn).await?;

    copied
}

async fn copy_from_image(conn: &mut SqliteConnection) -> Result<(), StorageError> {
    let mut tx = conn.begin().await?;

    for (table, _) in TABLE_COLUMNS.iter().rev() {
        sqlx::query(&format!("DELETE FROM main.{};", table)).execute(&mut tx).await?;
    }
    sqlx::query("DELETE FROM main.sqlite_sequence;").execute(&mut tx).await?;

    for (table, columns) in TABLE_COLUMNS {
        sqlx::query(&format!(
            "INSERT INTO main.{table} ({columns}) SELECT {columns} FROM image.{table};",
            table = table,
            columns = columns,
        ))
        .execute(&mut tx)
        .await?;
    }

    tx.commit().await?;

    Ok(())
}

/// Writes a full copy of the database next to `path`, syncs it, then renames
/// it over `path`. The image at `path` is never partially written.
async fn flush_image(conn: &mut SqliteConnection, path: &Path) -> Result<(), StorageError> {
    let tmp = temp_sibling(path);

    match tokio::fs::remove_file(&tmp).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    sqlx::query("VACUUM INTO ?")
        .bind(path_str(&tmp)?)
        .execute(&mut *conn)
        .await?;

    tokio::fs::File::open(&tmp).await?.sync_all().await?;
    tokio::fs::rename(&tmp, path).await?;

    Ok(())
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Integer(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> Result<Row, StorageError> {
    let mut result = Row::new();

    for column in row.columns() {
        let i = column.ordinal();
        let raw = row.try_get_raw(i)?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => Value::Integer(row.try_get::<i64, _>(i)?),
                "TEXT" | "DATETIME" | "DATE" | "TIME" => Value::Text(row.try_get::<String, _>(i)?),
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
