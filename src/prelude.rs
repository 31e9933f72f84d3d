//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::config::EngineConfig;
pub use crate::engine::QueryEngine;
pub use crate::error::{DriverError, PgMiddlewareError};
pub use crate::pool::{ConnectionHandle, Driver, DriverConnection};
pub use crate::query_builder::QueryAndParams;
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::transaction::{TxOp, TxState};
pub use crate::types::{Notification, RowValues};

pub use crate::postgres::PgDriver;
