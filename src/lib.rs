//! Thin async middleware over a PostgreSQL client.
//!
//! A [`QueryEngine`] owns a connection pool and offers single-row, multi-row,
//! streaming and statement-only queries, parameterized insert / update /
//! upsert / delete, multi-statement transactions with automatic commit or
//! rollback, and a one-shot `LISTEN` helper.
//!
//! ```rust,no_run
//! use pg_middleware::prelude::*;
//!
//! # async fn demo() -> Result<(), PgMiddlewareError> {
//! let engine = QueryEngine::connect(EngineConfig::new("postgres://app@localhost/app")).await?;
//! let id = engine
//!     .insert("users", &[("name", RowValues::from("alice"))], Some("id"))
//!     .await?;
//! let users = engine.fetch_all("SELECT id, name FROM users", &[]).await?;
//! # let _ = (id, users);
//! # Ok(()) }
//! ```

pub mod prelude;

pub mod config;
pub mod engine;
pub mod error;
pub mod listener;
pub mod pool;
pub mod postgres;
pub mod query_builder;
pub mod results;
pub mod transaction;
pub mod types;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use config::EngineConfig;
pub use engine::QueryEngine;
pub use error::{DriverError, PgMiddlewareError};
pub use pool::{ConnectionHandle, Driver, DriverConnection, ReleaseFn, RowStream};
pub use query_builder::{
    QueryAndParams, build_delete, build_insert, build_update, build_upsert, quote_identifier,
};
pub use results::{CustomDbRow, ResultSet};
pub use transaction::{TxFuture, TxOp, TxState};
pub use types::{Notification, RowValues};
