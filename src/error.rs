use std::fmt;

use thiserror::Error;

use crate::types::RowValues;

/// Error raised by the database driver collaborator.
///
/// Wraps whatever the driver produced (a `tokio_postgres::Error`, a pool
/// timeout, or a plain message from a custom driver) so the engine's error
/// taxonomy stays independent of the driver in use.
pub struct DriverError(Box<dyn std::error::Error + Send + Sync + 'static>);

impl DriverError {
    pub fn new<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self(err.into())
    }

    /// Driver error carrying only a message.
    #[must_use]
    pub fn message(msg: impl Into<String>) -> Self {
        Self(msg.into().into())
    }

    /// Borrow the wrapped error as a concrete type, e.g. `tokio_postgres::Error`.
    #[must_use]
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    /// Server-side error details, when the driver error came from the database.
    #[must_use]
    pub fn as_db_error(&self) -> Option<&tokio_postgres::error::DbError> {
        self.downcast_ref::<tokio_postgres::Error>()
            .and_then(tokio_postgres::Error::as_db_error)
    }

    /// SQLSTATE code reported by the server, e.g. `23505` for a unique violation.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.as_db_error().map(|db| db.code().code())
    }
}

impl fmt::Debug for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

// tokio_postgres::Error displays only "db error"; the useful text lives in
// its source chain.
impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(db) = self.as_db_error() {
            write!(f, "{} (SQLSTATE {})", db.message(), db.code().code())?;
            if let Some(detail) = db.detail() {
                write!(f, ": {detail}")?;
            }
            return Ok(());
        }
        fmt::Display::fmt(&self.0, f)?;
        let mut source = self.0.source();
        while let Some(cause) = source {
            write!(f, ": {cause}")?;
            source = cause.source();
        }
        Ok(())
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<tokio_postgres::Error> for DriverError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::new(err)
    }
}

impl From<bb8::RunError<tokio_postgres::Error>> for DriverError {
    fn from(err: bb8::RunError<tokio_postgres::Error>) -> Self {
        match err {
            bb8::RunError::User(err) => Self::new(err),
            bb8::RunError::TimedOut => Self::message("timed out waiting for a pooled connection"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PgMiddlewareError {
    #[error("Connection error: {context}{}", cause_suffix(.source))]
    Connection {
        context: String,
        #[source]
        source: Option<DriverError>,
    },

    #[error("Query error: {source} (sql: {sql}; params: {params:?})")]
    Query {
        sql: String,
        params: Vec<RowValues>,
        #[source]
        source: DriverError,
    },

    #[error("Builder error: {0}")]
    Builder(String),

    #[error("Rollback failed ({rollback}) after: {cause}")]
    Rollback {
        #[source]
        cause: Box<PgMiddlewareError>,
        rollback: Box<PgMiddlewareError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

fn cause_suffix(source: &Option<DriverError>) -> String {
    source
        .as_ref()
        .map(|cause| format!(": {cause}"))
        .unwrap_or_default()
}

impl PgMiddlewareError {
    pub(crate) fn connection(context: impl Into<String>, source: DriverError) -> Self {
        Self::Connection {
            context: context.into(),
            source: Some(source),
        }
    }

    pub(crate) fn query(sql: &str, params: &[RowValues], source: DriverError) -> Self {
        Self::Query {
            sql: sql.to_string(),
            params: params.to_vec(),
            source,
        }
    }

    /// SQL text attached to a `Query` error.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Query { sql, .. } => Some(sql),
            Self::Rollback { cause, .. } => cause.sql(),
            _ => None,
        }
    }

    /// The error that started a failed transaction, looking through `Rollback`.
    #[must_use]
    pub fn root_cause(&self) -> &PgMiddlewareError {
        match self {
            Self::Rollback { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}
