//! Persistence for surveys and responses.
//!
//! Everything above this module talks to a [`Storage`], which runs statements
//! written with the single `?` placeholder and returns backend-neutral
//! [`Row`]s. Two engines implement it:
//!
//! | Engine | Type | Selected when |
//! |---|---|---|
//! | Embedded SQLite image file | [`EmbeddedStorage`] | no database URL is configured |
//! | PostgreSQL over a pool | [`PostgresStorage`] | a database URL is configured |
//!
//! The choice is made once, by [`DBClient::connect`].

use async_trait::async_trait;

pub mod dbclient;
pub mod embedded;
pub mod error;
pub mod model;
pub mod postgres;
pub mod schema;
pub mod value;

pub use dbclient::DBClient;
pub use embedded::EmbeddedStorage;
pub use error::StorageError;
pub use postgres::PostgresStorage;
pub use value::{Row, Value};

/// Parameterized statement execution shared by every backend.
///
/// Statements use `?` for each positional parameter; `params` are bound in
/// order. A successful `execute` is durable by the time it returns.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Runs a statement and returns the number of affected rows.
    async fn execute(&self, statement: &str, params: &[Value]) -> Result<u64, StorageError>;

    /// Runs a query and returns its first row, if any.
    async fn query_one(&self, statement: &str, params: &[Value]) -> Result<Option<Row>, StorageError>;

    /// Runs a query and returns all of its rows.
    async fn query_all(&self, statement: &str, params: &[Value]) -> Result<Vec<Row>, StorageError>;

    /// Short engine name, for logs.
    fn backend(&self) -> &'static str;
}
