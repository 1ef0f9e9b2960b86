use std::io;

/// Errors raised by a storage backend.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    /// The backend could not be reached or its medium is not writable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A UNIQUE constraint rejected the statement.
    #[error("unique constraint violated")]
    UniqueViolation,

    /// A foreign key constraint rejected the statement.
    #[error("foreign key constraint violated")]
    ForeignKeyViolation,

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A column held something the caller did not expect.
    #[error("decode error: {0}")]
    Decode(String),
}

// SQLite extended result codes.
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";
const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";

// PostgreSQL SQLSTATE codes.
const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if let Some(code) = db_err.code() {
                match code.as_ref() {
                    SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY | PG_UNIQUE_VIOLATION => {
                        return StorageError::UniqueViolation;
                    }
                    SQLITE_CONSTRAINT_FOREIGNKEY | PG_FOREIGN_KEY_VIOLATION => {
                        return StorageError::ForeignKeyViolation;
                    }
                    _ => {}
                }
            }

            // Some SQLite builds only report the primary result code.
            let message = db_err.message();
            if message.starts_with("UNIQUE constraint failed") {
                return StorageError::UniqueViolation;
            }
            if message.starts_with("FOREIGN KEY constraint failed") {
                return StorageError::ForeignKeyViolation;
            }
        }

        StorageError::Database(e)
    }
}
