//! Connection acquisition seam between the engine and a database driver.
//!
//! The engine never talks to a pool or socket directly: it asks a [`Driver`]
//! for a [`ConnectionHandle`] and runs statements through
//! [`DriverConnection`]. [`crate::postgres::PgDriver`] is the production
//! implementation.

pub mod connection;
pub(crate) mod pinned;

use async_trait::async_trait;

pub use connection::{ConnectionHandle, DriverConnection, ReleaseFn, RowStream};

use crate::error::DriverError;

/// Source of database connections.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Check a connection out of the shared pool.
    async fn acquire(&self) -> Result<ConnectionHandle, DriverError>;

    /// Open a dedicated, non-pooled connection; releasing it closes the session.
    async fn connect(&self, data_source_name: &str) -> Result<ConnectionHandle, DriverError>;
}
